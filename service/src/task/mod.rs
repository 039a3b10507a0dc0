//! Background [`Task`]s definitions.

mod background;
pub mod sweep_rental_statuses;

pub use common::Handler as Task;

pub use self::{
    background::{Background, Failure},
    sweep_rental_statuses::SweepRentalStatuses,
};
