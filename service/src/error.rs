//! Categorization of [`Command`] and [`Query`] errors.

use derive_more::Display;
use tracerr::Traced;

use crate::infra::database;
#[cfg(doc)]
use crate::{Command, Query};

/// Kind of a failure surfaced to a caller.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Kind {
    /// Referenced entity does not exist.
    #[display("not found")]
    NotFound,

    /// Cell is held by another client, or a uniqueness constraint is
    /// violated.
    #[display("conflict")]
    Conflict,

    /// Provided input is malformed.
    #[display("validation failure")]
    Validation,

    /// Operation is not allowed in the current state.
    #[display("business rule violation")]
    BusinessRule,

    /// Unexpected failure, like a storage outage.
    #[display("internal failure")]
    Internal,
}

/// Error which can be categorized into a [`Kind`].
pub trait Categorize {
    /// Returns the [`Kind`] of this error.
    fn kind(&self) -> Kind;
}

impl<E: Categorize> Categorize for Traced<E> {
    fn kind(&self) -> Kind {
        self.as_ref().kind()
    }
}

impl Categorize for database::Error {
    fn kind(&self) -> Kind {
        if self.is_constraint_violation() {
            Kind::Conflict
        } else {
            Kind::Internal
        }
    }
}
