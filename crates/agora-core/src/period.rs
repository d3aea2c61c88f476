//! Calendar-month billing periods.
//!
//! Usage aggregation is scoped to the calendar month (UTC) containing a
//! timestamp. Periods are half-open intervals `[start, end)` so consecutive
//! months never overlap.

use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime, Time};

/// A half-open calendar-month window `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// First instant of the month (inclusive)
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    /// First instant of the following month (exclusive)
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl BillingPeriod {
    /// The calendar month (UTC) containing the given timestamp.
    pub fn month_of(ts: OffsetDateTime) -> Self {
        let ts = ts.to_offset(time::UtcOffset::UTC);
        let year = ts.year();
        let month = ts.month();

        let start = month_start(year, month);
        let (next_year, next_month) = match month {
            Month::December => (year + 1, Month::January),
            m => (year, m.next()),
        };
        let end = month_start(next_year, next_month);

        Self { start, end }
    }

    /// The calendar month containing the current instant.
    pub fn current_month() -> Self {
        Self::month_of(OffsetDateTime::now_utc())
    }

    /// Whether the timestamp falls inside this period.
    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        ts >= self.start && ts < self.end
    }
}

fn month_start(year: i32, month: Month) -> OffsetDateTime {
    // Day 1 exists in every month; the fallback is unreachable.
    Date::from_calendar_date(year, month, 1)
        .map(|d| d.with_time(Time::MIDNIGHT).assume_utc())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}",
            self.start.year(),
            u8::from(self.start.month())
        )
    }
}
