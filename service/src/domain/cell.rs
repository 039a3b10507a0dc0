//! [`Cell`] definitions.

use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::Rental;

/// Individually rentable storage unit inside a container.
///
/// Cells, their sizes, containers and locations are reference data managed
/// elsewhere, so they are only read here.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cell {
    /// ID of this [`Cell`].
    pub id: Id,

    /// [`Name`] of this [`Cell`].
    pub name: Name,

    /// Operator's [`Comment`] on this [`Cell`], if any.
    pub comment: Option<Comment>,

    /// ID of the size of this [`Cell`].
    pub size_id: SizeId,

    /// ID of the container this [`Cell`] is located in.
    pub container_id: ContainerId,
}

/// ID of a [`Cell`].
///
/// Ordered, so a set of [`Cell`]s is always walked (and locked) in the same
/// order.
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

/// Name of a [`Cell`], like `A-12`.
#[derive(AsRef, Clone, Debug, Display, Eq, Hash, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Name(String);

impl Name {
    /// Creates a new [`Name`] if the given `name` is valid.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        Self::check(&name).then_some(Self(name))
    }

    /// Checks whether the given `name` is a valid [`Name`].
    fn check(name: impl AsRef<str>) -> bool {
        let name = name.as_ref();
        name.trim() == name && !name.is_empty() && name.len() <= 128
    }
}

impl FromStr for Name {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Name`")
    }
}

/// Comment on a [`Cell`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Comment(String);

impl Comment {
    /// Creates a new [`Comment`] if the given `comment` is valid.
    #[must_use]
    pub fn new(comment: impl Into<String>) -> Option<Self> {
        let comment = comment.into();
        (!comment.trim().is_empty() && comment.len() <= 1024)
            .then_some(Self(comment))
    }
}

macro_rules! define_reference_id {
    ($(#[doc = $doc:literal] $name:ident),* $(,)?) => {$(
        #[doc = $doc]
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
        #[cfg_attr(
            feature = "postgres",
            derive(ToSql, FromSql),
            postgres(transparent),
        )]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }
    )*};
}

define_reference_id! {
    #[doc = "ID of a [`Cell`] size."]
    SizeId,

    #[doc = "ID of a container holding [`Cell`]s."]
    ContainerId,

    #[doc = "ID of a location holding containers of [`Cell`]s."]
    LocationId,
}

#[cfg(test)]
mod spec {
    use super::{Comment, Name};

    #[test]
    fn validates_name() {
        assert!(Name::new("A-12").is_some());
        assert!(Name::new("").is_none());
        assert!(Name::new(" A-12").is_none());
        assert!(Name::new("A".repeat(129)).is_none());
    }

    #[test]
    fn validates_comment() {
        assert!(Comment::new("near the gate").is_some());
        assert!(Comment::new("   ").is_none());
    }
}
