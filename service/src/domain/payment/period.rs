//! [`Period`] of service granted by a [`Payment`].

use std::sync::LazyLock;

use common::{define_kind, DateTimeOf};
use regex::Regex;

#[cfg(doc)]
use crate::domain::Payment;

/// Amount of calendar time granted by a [`Payment`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Period {
    /// Number of [`Unit`]s in this [`Period`].
    value: u32,

    /// [`Unit`] of this [`Period`].
    unit: Unit,
}

impl Period {
    /// [`Period`] assumed when nothing else is known about a [`Payment`].
    pub const DEFAULT: Self = Self {
        value: 1,
        unit: Unit::Month,
    };

    /// Creates a new [`Period`] if the provided `value` is positive.
    #[must_use]
    pub fn new(value: u32, unit: Unit) -> Option<Self> {
        (value > 0).then_some(Self { value, unit })
    }

    /// Creates a new [`Period`] of the provided number of days.
    #[must_use]
    pub fn days(value: u32) -> Option<Self> {
        Self::new(value, Unit::Day)
    }

    /// Creates a new [`Period`] of the provided number of months.
    #[must_use]
    pub fn months(value: u32) -> Option<Self> {
        Self::new(value, Unit::Month)
    }

    /// Returns the number of [`Unit`]s in this [`Period`].
    #[must_use]
    pub fn value(self) -> u32 {
        self.value
    }

    /// Returns the [`Unit`] of this [`Period`].
    #[must_use]
    pub fn unit(self) -> Unit {
        self.unit
    }

    /// Recovers a [`Period`] from a free-text [`Payment`] description, like
    /// `"3 мес"` or `"1 year"`.
    ///
    /// [`None`] is returned if the description mentions no period.
    #[must_use]
    pub fn parse(description: &str) -> Option<Self> {
        static REGEX: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?i)(\d+)\s*(дн|ден|day|мес|month|год|лет|year)")
                .expect("valid regex")
        });

        let captures = REGEX.captures(description)?;
        let value = captures.get(1)?.as_str().parse().ok()?;
        let unit = match captures.get(2)?.as_str().to_lowercase().as_str() {
            "дн" | "ден" | "day" => Unit::Day,
            "мес" | "month" => Unit::Month,
            "год" | "лет" | "year" => Unit::Year,
            _ => return None,
        };
        Self::new(value, unit)
    }

    /// Advances the provided date and time by this [`Period`] using calendar
    /// arithmetic.
    ///
    /// [`None`] is returned on overflow.
    #[must_use]
    pub fn advance<Of: ?Sized>(
        self,
        from: DateTimeOf<Of>,
    ) -> Option<DateTimeOf<Of>> {
        match self.unit {
            Unit::Day => from.checked_add_days(self.value),
            Unit::Month => from.checked_add_months(self.value),
            Unit::Year => from.checked_add_years(self.value),
        }
    }
}

define_kind! {
    #[doc = "Unit of a [`Period`]."]
    enum Unit {
        #[doc = "Calendar day."]
        Day = 1,

        #[doc = "Calendar month."]
        Month = 2,

        #[doc = "Calendar year."]
        Year = 3,
    }
}

#[cfg(test)]
mod spec {
    use common::DateTime;

    use super::{Period, Unit};

    #[test]
    fn parses_cyrillic_descriptions() {
        assert_eq!(Period::parse("1 мес"), Period::months(1));
        assert_eq!(Period::parse("Аренда 3 месяца"), Period::months(3));
        assert_eq!(Period::parse("14 дней"), Period::days(14));
        assert_eq!(Period::parse("1 день"), Period::days(1));
        assert_eq!(Period::parse("2 дня"), Period::days(2));
        assert_eq!(Period::parse("1 год"), Period::new(1, Unit::Year));
        assert_eq!(Period::parse("5 ЛЕТ"), Period::new(5, Unit::Year));
        assert_eq!(Period::parse("6МЕС"), Period::months(6));
    }

    #[test]
    fn parses_latin_descriptions() {
        assert_eq!(Period::parse("2 Months"), Period::months(2));
        assert_eq!(Period::parse("10 days"), Period::days(10));
        assert_eq!(Period::parse("1 YEAR"), Period::new(1, Unit::Year));
    }

    #[test]
    fn rejects_descriptions_without_period() {
        assert_eq!(Period::parse("Extension of cells A1, A2"), None);
        assert_eq!(Period::parse("мес"), None);
        assert_eq!(Period::parse("0 мес"), None);
        assert_eq!(Period::parse(""), None);
    }

    #[test]
    fn advances_by_calendar() {
        let start = DateTime::from_rfc3339("2024-01-31T00:00:00Z").unwrap();

        assert_eq!(
            Period::months(1).unwrap().advance(start),
            DateTime::from_rfc3339("2024-02-29T00:00:00Z").ok(),
        );
        assert_eq!(
            Period::days(30).unwrap().advance(start),
            DateTime::from_rfc3339("2024-03-01T00:00:00Z").ok(),
        );
        assert_eq!(
            Period::new(1, Unit::Year).unwrap().advance(start),
            DateTime::from_rfc3339("2025-01-31T00:00:00Z").ok(),
        );
    }
}
