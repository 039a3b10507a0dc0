//! [`Rental`] read model definitions.

use crate::domain::{cell, rental};
#[cfg(doc)]
use crate::domain::{Cell, Rental};

/// Selector of the non-closed [`Rental`]s occupying any of the [`Cell`]s.
#[derive(Clone, Debug)]
pub struct Occupying {
    /// IDs of the [`Cell`]s to check.
    pub cell_ids: Vec<cell::Id>,

    /// ID of the [`Rental`] to exclude from the result, if any.
    pub except: Option<rental::Id>,
}
