//! Reconstruction of a [`Rental`] end date out of its [`Payment`]s.

use common::DateTime;
use derive_more::{Display, Error};

use crate::domain::Payment;
#[cfg(doc)]
use crate::domain::{payment::Period, Rental};

use super::{EndDateTime, StartDateTime};

/// Computes the inclusive [`EndDateTime`] of a [`Rental`] starting at the
/// provided `start` and paid by the provided [`Payment`]s.
///
/// Only succeeded [`Payment`]s are accounted, in the order of their creation.
/// Each of them advances a running date by its resolved [`Period`], and the
/// result is the last instant of the day before the running date.
///
/// [`None`] is returned if there are no succeeded [`Payment`]s, so the
/// current end date must be kept as is.
///
/// # Errors
///
/// With an [`Overflow`] if the resulting date is not representable.
pub fn end_date<'p>(
    start: StartDateTime,
    payments: impl IntoIterator<Item = &'p Payment>,
) -> Result<Option<EndDateTime>, Overflow> {
    let mut ledger = payments
        .into_iter()
        .filter(|p| p.is_succeeded())
        .collect::<Vec<_>>();
    // Stable, so payments created at the same instant keep their order.
    ledger.sort_by_key(|p| p.created_at);

    let mut running: Option<DateTime> = None;
    for payment in ledger {
        let from = running.unwrap_or_else(|| start.coerce());
        running =
            Some(payment.resolve_period().advance(from).ok_or(Overflow)?);
    }

    running
        .map(|paid_until| {
            paid_until
                .checked_sub_day()
                .map(|d| d.end_of_day().coerce())
                .ok_or(Overflow)
        })
        .transpose()
}

/// Error of a [`Rental`] date being advanced beyond the representable range.
#[derive(Clone, Copy, Debug, Display, Error)]
#[display("`Rental` date overflow")]
pub struct Overflow;

#[cfg(test)]
mod spec {
    use std::iter;

    use common::DateTime;

    use crate::domain::{
        payment::{self, Period, RentalDuration},
        Payment,
    };

    use super::end_date;

    fn at(s: &str) -> DateTime {
        DateTime::from_rfc3339(s).unwrap()
    }

    fn payment(
        created_at: &str,
        description: &str,
        rental_duration: Option<i32>,
    ) -> Payment {
        Payment {
            id: payment::Id::new(),
            rental_id: None,
            amount: "3000".parse().unwrap(),
            description: payment::Description::new(description).unwrap(),
            period: None,
            rental_duration: rental_duration.map(RentalDuration::from),
            status: payment::Status::Succeeded,
            created_at: at(created_at).coerce(),
        }
    }

    #[test]
    fn one_month_from_description() {
        let payments = [payment("2024-01-01T00:00:00Z", "1 мес", None)];

        assert_eq!(
            end_date(at("2024-01-01T00:00:00Z").coerce(), &payments).unwrap(),
            Some(at("2024-01-31T23:59:59.999Z").coerce()),
        );
    }

    #[test]
    fn folds_payments_in_creation_order() {
        let payments = [
            payment("2024-01-15T00:00:00Z", "", Some(30)),
            payment("2024-01-01T00:00:00Z", "1 мес", None),
        ];

        assert_eq!(
            end_date(at("2024-01-01T00:00:00Z").coerce(), &payments).unwrap(),
            Some(at("2024-03-01T23:59:59.999Z").coerce()),
        );
    }

    #[test]
    fn month_is_calendar_aware() {
        let payments = [
            payment("2024-01-31T00:00:00Z", "", None),
            payment("2024-02-01T00:00:00Z", "1 year", None),
        ];

        // Jan 31 + 1 month = Feb 29 (leap), + 1 year = Feb 28.
        assert_eq!(
            end_date(at("2024-01-31T10:00:00Z").coerce(), &payments).unwrap(),
            Some(at("2025-02-27T23:59:59.999Z").coerce()),
        );
    }

    #[test]
    fn skips_unsuccessful_payments() {
        let mut failed = payment("2024-01-02T00:00:00Z", "12 мес", None);
        failed.status = payment::Status::Failed;
        let mut pending = payment("2024-01-03T00:00:00Z", "12 мес", None);
        pending.status = payment::Status::Pending;
        let payments = [
            payment("2024-01-01T00:00:00Z", "1 мес", None),
            failed,
            pending,
        ];

        assert_eq!(
            end_date(at("2024-01-01T00:00:00Z").coerce(), &payments).unwrap(),
            Some(at("2024-01-31T23:59:59.999Z").coerce()),
        );
    }

    #[test]
    fn prefers_structured_period() {
        let mut p = payment("2024-01-01T00:00:00Z", "1 мес", Some(10));
        p.period = Period::days(3);

        assert_eq!(
            end_date(at("2024-01-01T00:00:00Z").coerce(), [&p]).unwrap(),
            Some(at("2024-01-03T23:59:59.999Z").coerce()),
        );
    }

    #[test]
    fn leaves_end_date_without_payments() {
        assert_eq!(
            end_date(at("2024-01-01T00:00:00Z").coerce(), iter::empty())
                .unwrap(),
            None,
        );

        let mut failed = payment("2024-01-02T00:00:00Z", "1 мес", None);
        failed.status = payment::Status::Failed;
        assert_eq!(
            end_date(at("2024-01-01T00:00:00Z").coerce(), [&failed]).unwrap(),
            None,
        );
    }

    #[test]
    fn is_deterministic() {
        let payments = [
            payment("2024-01-01T00:00:00Z", "2 мес", None),
            payment("2024-02-01T00:00:00Z", "", Some(15)),
            payment("2024-03-01T00:00:00Z", "1 год", None),
        ];
        let start = at("2024-01-01T00:00:00Z").coerce();

        assert_eq!(
            end_date(start, &payments).unwrap(),
            end_date(start, &payments).unwrap(),
        );
    }
}
