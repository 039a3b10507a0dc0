//! [`Query`] collection related to the multiple [`Rental`]s.

use common::operations::By;

use crate::domain::rental;
#[cfg(doc)]
use crate::{domain::Rental, Query};

use super::DatabaseQuery;

/// Queries IDs of all the existing [`Rental`]s.
pub type Ids = DatabaseQuery<By<Vec<rental::Id>, ()>>;
