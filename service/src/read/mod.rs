//! Read entities definitions.

pub mod cell;
pub mod rental;
