//! Domain definitions.

pub mod cell;
pub mod client;
pub mod payment;
pub mod rental;

pub use self::{
    cell::Cell, client::Client, payment::Payment, rental::Rental,
};
