//! [`Command`] definition.

pub mod assign_cells;
pub mod close_rental;
pub mod delete_payment;
pub mod delete_rental;
pub mod extend_rental;
pub mod recalculate_duration;
pub mod recalculate_status;
pub mod record_payment;

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    assign_cells::AssignCells, close_rental::CloseRental,
    delete_payment::DeletePayment, delete_rental::DeleteRental,
    extend_rental::ExtendRental, recalculate_duration::RecalculateDuration,
    recalculate_status::RecalculateStatus, record_payment::RecordPayment,
};
