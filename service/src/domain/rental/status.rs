//! [`Status`] derivation of a [`Rental`].

use std::time::Duration;

use common::{define_kind, DateTime};

use super::{
    ClosingDateTime, EndDateTime, ExtensionCount, ExtensionDateTime,
    StartDateTime,
};
#[cfg(doc)]
use crate::domain::Rental;

/// Days left before the end date, at most, for a [`Rental`] to be
/// [`Status::Expired`].
const EXPIRED_WITHIN_DAYS: i64 = 1;

/// Days left before the end date, at most, for a [`Rental`] to be
/// [`Status::ExpiringSoon`].
const EXPIRING_SOON_WITHIN_DAYS: i64 = 3;

/// Days left before the end date, at most, for a [`Rental`] to be
/// [`Status::PaymentSoon`].
const PAYMENT_SOON_WITHIN_DAYS: i64 = 7;

/// How long a [`Rental`] stays [`Status::Extended`] after its last extension.
const EXTENDED_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

define_kind! {
    #[doc = "Human-facing status of a [`Rental`]."]
    enum Status {
        #[doc = "[`Rental`] hasn't started yet."]
        Reservation = 1,

        #[doc = "[`Rental`] is running."]
        Active = 2,

        #[doc = "[`Rental`] was extended recently."]
        Extended = 3,

        #[doc = "[`Rental`] ends within a week."]
        PaymentSoon = 4,

        #[doc = "[`Rental`] ends within three days."]
        ExpiringSoon = 5,

        #[doc = "[`Rental`] ended (or ends within a day) without being paid."]
        Expired = 6,

        #[doc = "[`Rental`] was closed explicitly."]
        Closed = 7,
    }
}

impl Status {
    /// Indicates whether this [`Status`] belongs to a running [`Rental`].
    #[must_use]
    pub fn is_active_family(self) -> bool {
        match self {
            Self::Reservation
            | Self::Active
            | Self::Extended
            | Self::PaymentSoon
            | Self::ExpiringSoon => true,
            Self::Expired | Self::Closed => false,
        }
    }

    /// Derives a [`Status`] of a [`Rental`] out of its [`Snapshot`] at the
    /// provided moment.
    ///
    /// The `forced` [`Status`] always wins.
    #[must_use]
    pub fn derive(
        snapshot: &Snapshot,
        now: DateTime,
        forced: Option<Self>,
    ) -> Derived {
        if let Some(status) = forced {
            return Derived {
                status,
                closed_at: (status == Self::Closed).then(|| now.coerce()),
            };
        }

        let Snapshot {
            start_date,
            end_date,
            closed_at,
            status,
            extension_count,
            last_extended_at,
        } = *snapshot;

        if !status.is_active_family() {
            return match closed_at {
                None if end_date < now.coerce() => Derived {
                    status: Self::Expired,
                    closed_at: None,
                },
                // A closed rental stays closed until a payment moves its end
                // date past the current moment.
                Some(at) if end_date <= now.coerce() => Derived {
                    status: Self::Closed,
                    closed_at: Some(at),
                },
                None | Some(_) => Derived {
                    status: Self::Extended,
                    closed_at: None,
                },
            };
        }

        let days_left = end_date.days_since(&now);
        let status = if start_date > now.coerce() {
            Self::Reservation
        } else if days_left <= EXPIRED_WITHIN_DAYS {
            Self::Expired
        } else if days_left <= EXPIRING_SOON_WITHIN_DAYS {
            Self::ExpiringSoon
        } else if days_left <= PAYMENT_SOON_WITHIN_DAYS {
            Self::PaymentSoon
        } else if extension_count.is_extended()
            && last_extended_at
                .is_some_and(|at| at >= (now - EXTENDED_WINDOW).coerce())
        {
            Self::Extended
        } else {
            Self::Active
        };
        Derived {
            status,
            closed_at: None,
        }
    }
}

/// Temporal state of a [`Rental`] its [`Status`] is derived from.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot {
    /// [`DateTime`] when the [`Rental`] starts.
    pub start_date: StartDateTime,

    /// [`DateTime`] when the [`Rental`] ends.
    pub end_date: EndDateTime,

    /// [`DateTime`] when the [`Rental`] was closed, if it was.
    pub closed_at: Option<ClosingDateTime>,

    /// Currently stored [`Status`] of the [`Rental`].
    pub status: Status,

    /// Number of times the [`Rental`] was extended.
    pub extension_count: ExtensionCount,

    /// [`DateTime`] when the [`Rental`] was extended last time, if it was.
    pub last_extended_at: Option<ExtensionDateTime>,
}

/// Result of [`Status::derive()`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Derived {
    /// Derived [`Status`].
    pub status: Status,

    /// [`DateTime`] the [`Rental`] must be marked as closed at.
    ///
    /// Always [`Some`] for [`Status::Closed`] and [`None`] otherwise.
    pub closed_at: Option<ClosingDateTime>,
}

#[cfg(test)]
mod spec {
    use common::DateTime;

    use super::{Derived, ExtensionCount, Snapshot, Status};

    fn at(s: &str) -> DateTime {
        DateTime::from_rfc3339(s).unwrap()
    }

    fn active(start: &str, end: &str) -> Snapshot {
        Snapshot {
            start_date: at(start).coerce(),
            end_date: at(end).coerce(),
            closed_at: None,
            status: Status::Active,
            extension_count: ExtensionCount::default(),
            last_extended_at: None,
        }
    }

    fn derive(snapshot: &Snapshot, now: &str) -> Status {
        Status::derive(snapshot, at(now), None).status
    }

    #[test]
    fn expiring_soon_two_days_before_end() {
        let s = active("2024-01-01T00:00:00Z", "2024-01-31T00:00:00Z");

        assert_eq!(derive(&s, "2024-01-29T00:00:00Z"), Status::ExpiringSoon);
    }

    #[test]
    fn follows_days_left_thresholds() {
        let s = active("2024-01-01T00:00:00Z", "2024-01-31T23:59:59.999Z");

        assert_eq!(derive(&s, "2024-01-10T00:00:00Z"), Status::Active);
        assert_eq!(derive(&s, "2024-01-24T00:00:00Z"), Status::Active);
        assert_eq!(derive(&s, "2024-01-25T00:00:00Z"), Status::PaymentSoon);
        assert_eq!(derive(&s, "2024-01-28T00:00:00Z"), Status::PaymentSoon);
        assert_eq!(derive(&s, "2024-01-29T00:00:00Z"), Status::ExpiringSoon);
        assert_eq!(derive(&s, "2024-01-31T00:00:00Z"), Status::Expired);
        assert_eq!(derive(&s, "2024-02-05T00:00:00Z"), Status::Expired);
    }

    #[test]
    fn reservation_before_start() {
        let s = active("2024-02-01T00:00:00Z", "2024-03-31T00:00:00Z");

        assert_eq!(derive(&s, "2024-01-15T00:00:00Z"), Status::Reservation);
    }

    #[test]
    fn extended_within_a_week_after_extension() {
        let mut s = active("2024-01-01T00:00:00Z", "2024-03-31T00:00:00Z");
        s.extension_count = ExtensionCount::default().incremented();
        s.last_extended_at = Some(at("2024-01-10T12:00:00Z").coerce());

        assert_eq!(derive(&s, "2024-01-12T00:00:00Z"), Status::Extended);
        assert_eq!(derive(&s, "2024-01-17T12:00:00Z"), Status::Extended);
        assert_eq!(derive(&s, "2024-01-17T12:00:01Z"), Status::Active);
    }

    #[test]
    fn expires_stale_rental() {
        let mut s = active("2024-01-01T00:00:00Z", "2024-01-31T00:00:00Z");
        s.status = Status::Expired;

        assert_eq!(derive(&s, "2024-02-10T00:00:00Z"), Status::Expired);
    }

    #[test]
    fn reopens_paid_up_rental_as_extended() {
        let mut s = active("2024-01-01T00:00:00Z", "2024-03-31T00:00:00Z");
        s.status = Status::Expired;

        assert_eq!(derive(&s, "2024-02-10T00:00:00Z"), Status::Extended);

        s.status = Status::Closed;
        s.closed_at = Some(at("2024-02-01T00:00:00Z").coerce());

        assert_eq!(
            Status::derive(&s, at("2024-02-10T00:00:00Z"), None),
            Derived {
                status: Status::Extended,
                closed_at: None,
            },
        );
    }

    #[test]
    fn keeps_closed_rental_closed() {
        let closed_at = at("2024-02-01T00:00:00Z");
        let mut s = active("2024-01-01T00:00:00Z", "2024-02-01T00:00:00Z");
        s.status = Status::Closed;
        s.closed_at = Some(closed_at.coerce());

        for now in ["2024-02-01T00:00:00Z", "2024-05-01T00:00:00Z"] {
            assert_eq!(
                Status::derive(&s, at(now), None),
                Derived {
                    status: Status::Closed,
                    closed_at: Some(closed_at.coerce()),
                },
            );
        }
    }

    #[test]
    fn forced_status_wins() {
        let s = active("2024-01-01T00:00:00Z", "2024-03-31T00:00:00Z");
        let now = at("2024-01-10T00:00:00Z");

        assert_eq!(
            Status::derive(&s, now, Some(Status::Closed)),
            Derived {
                status: Status::Closed,
                closed_at: Some(now.coerce()),
            },
        );

        let mut closed = s;
        closed.status = Status::Closed;
        closed.closed_at = Some(now.coerce());
        assert_eq!(
            Status::derive(&closed, now, Some(Status::Active)),
            Derived {
                status: Status::Active,
                closed_at: None,
            },
        );
    }

    #[test]
    fn derivation_is_idempotent() {
        let now = at("2024-01-29T00:00:00Z");
        for status in Status::ALL.iter().copied() {
            let mut s =
                active("2024-01-01T00:00:00Z", "2024-01-31T00:00:00Z");
            s.status = status;
            s.closed_at =
                (status == Status::Closed).then(|| now.coerce());

            let first = Status::derive(&s, now, None);
            let second = Status::derive(&s, now, None);
            assert_eq!(first, second, "status: {status}");
        }
    }

    #[test]
    fn closed_at_set_only_when_closed() {
        let now = at("2024-01-29T00:00:00Z");
        for status in Status::ALL.iter().copied() {
            for forced in [None, Some(Status::Closed), Some(Status::Active)] {
                let mut s =
                    active("2024-01-01T00:00:00Z", "2024-01-31T00:00:00Z");
                s.status = status;
                s.closed_at =
                    (status == Status::Closed).then(|| now.coerce());

                let derived = Status::derive(&s, now, forced);
                assert_eq!(
                    derived.status == Status::Closed,
                    derived.closed_at.is_some(),
                    "status: {status}, forced: {forced:?}",
                );
            }
        }
    }
}
