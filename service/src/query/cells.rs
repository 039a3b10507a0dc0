//! [`Query`] collection related to the multiple [`Cell`]s.

use std::collections::HashMap;

use common::operations::By;

#[cfg(doc)]
use crate::Query;
use crate::{
    domain::{cell, Cell},
    read,
};

use super::DatabaseQuery;

/// Queries multiple [`Cell`]s by their [`cell::Id`]s.
pub type ByIds = DatabaseQuery<By<HashMap<cell::Id, Cell>, Vec<cell::Id>>>;

/// Queries a list of free [`Cell`]s.
///
/// A [`Cell`] is free unless a non-closed [`Rental`] occupies it.
///
/// [`Rental`]: crate::domain::Rental
pub type Free =
    DatabaseQuery<By<read::cell::list::Page, read::cell::list::Selector>>;
