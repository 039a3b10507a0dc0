//! [`Payment`] definitions.

pub mod period;

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf, Money};
use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::rental;
#[cfg(doc)]
use crate::domain::Rental;

pub use self::period::{Period, Unit};

/// Money received for renting cells.
#[derive(Clone, Debug)]
pub struct Payment {
    /// ID of this [`Payment`].
    pub id: Id,

    /// ID of the [`Rental`] this [`Payment`] is attached to, if any.
    pub rental_id: Option<rental::Id>,

    /// Paid amount.
    pub amount: Money,

    /// Free-text [`Description`] of this [`Payment`].
    pub description: Description,

    /// Structured [`Period`] granted by this [`Payment`], if known.
    pub period: Option<Period>,

    /// Legacy number of days granted by this [`Payment`], if any.
    pub rental_duration: Option<RentalDuration>,

    /// [`Status`] of this [`Payment`].
    pub status: Status,

    /// [`DateTime`] when this [`Payment`] was created.
    pub created_at: CreationDateTime,
}

impl Payment {
    /// Indicates whether this [`Payment`] succeeded and so grants service.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.status == Status::Succeeded
    }

    /// Resolves the [`Period`] of service granted by this [`Payment`].
    ///
    /// The structured [`Period`] wins, then the legacy [`RentalDuration`],
    /// then whatever [`Period::parse()`] recovers from the [`Description`],
    /// and [`Period::DEFAULT`] otherwise.
    #[must_use]
    pub fn resolve_period(&self) -> Period {
        self.period
            .or_else(|| self.rental_duration.and_then(RentalDuration::period))
            .or_else(|| Period::parse(self.description.as_ref()))
            .unwrap_or(Period::DEFAULT)
    }
}

/// ID of a [`Payment`].
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
    PartialEq,
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

/// Description of a [`Payment`].
///
/// May be empty, as upstream systems don't always provide one.
#[derive(AsRef, Clone, Debug, Default, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Description(String);

impl Description {
    /// Creates a new [`Description`] if the given `description` is valid.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Option<Self> {
        let description = description.into();
        Self::check(&description).then_some(Self(description))
    }

    /// Checks whether the given `description` is a valid [`Description`].
    fn check(description: impl AsRef<str>) -> bool {
        let description = description.as_ref();
        description.trim() == description && description.len() <= 1024
    }
}

impl FromStr for Description {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Description`")
    }
}

/// Legacy explicit number of days granted by a [`Payment`].
#[derive(Clone, Copy, Debug, Display, Eq, From, Hash, Into, PartialEq)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct RentalDuration(i32);

impl RentalDuration {
    /// Converts this [`RentalDuration`] into a [`Period`] of days.
    ///
    /// [`None`] is returned if this [`RentalDuration`] is not positive.
    #[must_use]
    pub fn period(self) -> Option<Period> {
        u32::try_from(self.0).ok().and_then(Period::days)
    }
}

define_kind! {
    #[doc = "Status of a [`Payment`]."]
    enum Status {
        #[doc = "[`Payment`] is awaiting confirmation."]
        Pending = 1,

        #[doc = "[`Payment`] succeeded."]
        Succeeded = 2,

        #[doc = "[`Payment`] failed."]
        Failed = 3,
    }
}

/// [`DateTime`] when a [`Payment`] was created.
pub type CreationDateTime = DateTimeOf<(Payment, unit::Creation)>;
