//! [`Rental`] definitions.

pub mod ledger;
pub mod status;

use std::collections::BTreeSet;

use common::{unit, DateTime, DateTimeOf};
use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tracing as log;
use uuid::Uuid;

use crate::domain::{cell, client, payment::Period, Payment};
#[cfg(doc)]
use crate::domain::{Cell, Client};

pub use self::{
    ledger::Overflow,
    status::{Derived, Snapshot, Status},
};

/// Occupation of [`Cell`]s by a [`Client`] over a time span.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rental {
    /// ID of this [`Rental`].
    pub id: Id,

    /// ID of the [`Client`] renting the [`Cell`]s.
    pub client_id: client::Id,

    /// IDs of the rented [`Cell`]s.
    pub cell_ids: BTreeSet<cell::Id>,

    /// [`DateTime`] when this [`Rental`] starts.
    pub start_date: StartDateTime,

    /// [`DateTime`] when this [`Rental`] ends, inclusively.
    pub end_date: EndDateTime,

    /// Current [`Status`] of this [`Rental`].
    pub status: Status,

    /// [`DateTime`] when this [`Rental`] was closed.
    ///
    /// Set if and only if the [`Status`] is [`Status::Closed`].
    pub closed_at: Option<ClosingDateTime>,

    /// [`DateTime`] when this [`Rental`] was extended last time.
    pub last_extended_at: Option<ExtensionDateTime>,

    /// Number of times this [`Rental`] was extended.
    pub extension_count: ExtensionCount,

    /// [`DateTime`] when this [`Rental`] was created.
    pub created_at: CreationDateTime,
}

impl Rental {
    /// Indicates whether this [`Rental`] is closed.
    ///
    /// Closed [`Rental`]s don't occupy their [`Cell`]s.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status == Status::Closed
    }

    /// Returns the [`Snapshot`] of this [`Rental`] its [`Status`] is derived
    /// from.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            start_date: self.start_date,
            end_date: self.end_date,
            closed_at: self.closed_at,
            status: self.status,
            extension_count: self.extension_count,
            last_extended_at: self.last_extended_at,
        }
    }

    /// Re-derives the [`Status`] of this [`Rental`] at the provided moment,
    /// optionally `forced` to the specific one.
    ///
    /// Returns whether this [`Rental`] has changed and should be stored.
    pub fn recalculate_status(
        &mut self,
        now: DateTime,
        forced: Option<Status>,
    ) -> bool {
        let Derived { status, closed_at } =
            Status::derive(&self.snapshot(), now, forced);
        if self.status == status && self.closed_at == closed_at {
            return false;
        }
        self.status = status;
        self.closed_at = closed_at;
        true
    }

    /// Replays the provided [`Payment`]s of this [`Rental`] to recompute its
    /// end date, and then re-derives its [`Status`] at the provided moment.
    ///
    /// The end date is kept as is if there are no succeeded [`Payment`]s, or
    /// if this [`Rental`] is closed: closing overrides the ledger, and only
    /// [`Rental::extend()`] reopens it.
    ///
    /// Returns whether this [`Rental`] has changed and should be stored.
    ///
    /// # Errors
    ///
    /// With an [`Overflow`] if the end date is not representable.
    pub fn replay_ledger<'p>(
        &mut self,
        payments: impl IntoIterator<Item = &'p Payment>,
        now: DateTime,
    ) -> Result<bool, Overflow> {
        if self.is_closed() {
            return Ok(self.recalculate_status(now, None));
        }

        let mut changed = false;
        if let Some(end_date) = ledger::end_date(self.start_date, payments)? {
            changed = self.end_date != end_date;
            self.end_date = end_date;
        }
        Ok(self.recalculate_status(now, None) || changed)
    }

    /// Closes this [`Rental`] at the provided moment, releasing its [`Cell`]s.
    pub fn close(&mut self, now: DateTime) {
        self.end_date = now.coerce();
        _ = self.recalculate_status(now, Some(Status::Closed));
    }

    /// Extends this [`Rental`] by the provided [`Period`] at the provided
    /// moment.
    ///
    /// A running [`Rental`] is extended from its current end date, while a
    /// closed or expired one is reactivated and extended from `now`.
    ///
    /// # Errors
    ///
    /// With an [`Overflow`] if the new end date is not representable.
    pub fn extend(
        &mut self,
        period: Period,
        now: DateTime,
    ) -> Result<(), Overflow> {
        let is_running = self.status.is_active_family();
        let anchor = if is_running && self.end_date > now.coerce() {
            self.end_date
        } else {
            now.coerce()
        };
        let end_date = period.advance(anchor).ok_or(Overflow)?;

        if !is_running {
            log::debug!(
                "reactivating `Rental(id: {})` in `{}` status",
                self.id,
                self.status,
            );
            _ = self.recalculate_status(now, Some(Status::Active));
        }

        self.end_date = end_date;
        self.extension_count = self.extension_count.incremented();
        self.last_extended_at = Some(now.coerce());
        _ = self.recalculate_status(now, Some(Status::Extended));

        Ok(())
    }
}

/// ID of a [`Rental`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    FromStr,
    Hash,
    Into,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random [`Id`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Number of times a [`Rental`] was extended.
///
/// Never decreases.
#[derive(
    Clone, Copy, Debug, Default, Display, Eq, Hash, Into, Ord, PartialEq,
    PartialOrd,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct ExtensionCount(i32);

impl ExtensionCount {
    /// Returns this [`ExtensionCount`] increased by one.
    #[must_use]
    pub fn incremented(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Indicates whether a [`Rental`] was extended at least once.
    #[must_use]
    pub fn is_extended(self) -> bool {
        self.0 > 0
    }
}

impl TryFrom<i32> for ExtensionCount {
    type Error = &'static str;

    fn try_from(count: i32) -> Result<Self, Self::Error> {
        if count < 0 {
            return Err("negative `ExtensionCount`");
        }
        Ok(Self(count))
    }
}

/// Marker for the start [`DateTime`] of a [`Rental`].
#[derive(Clone, Copy, Debug)]
pub struct Start;

/// Marker for the end [`DateTime`] of a [`Rental`].
#[derive(Clone, Copy, Debug)]
pub struct End;

/// Marker for the closing [`DateTime`] of a [`Rental`].
#[derive(Clone, Copy, Debug)]
pub struct Closing;

/// Marker for the last extension [`DateTime`] of a [`Rental`].
#[derive(Clone, Copy, Debug)]
pub struct Extension;

/// [`DateTime`] when a [`Rental`] starts.
pub type StartDateTime = DateTimeOf<(Rental, Start)>;

/// [`DateTime`] when a [`Rental`] ends.
pub type EndDateTime = DateTimeOf<(Rental, End)>;

/// [`DateTime`] when a [`Rental`] was closed.
pub type ClosingDateTime = DateTimeOf<(Rental, Closing)>;

/// [`DateTime`] when a [`Rental`] was extended last time.
pub type ExtensionDateTime = DateTimeOf<(Rental, Extension)>;

/// [`DateTime`] when a [`Rental`] was created.
pub type CreationDateTime = DateTimeOf<(Rental, unit::Creation)>;
