//! Date helpers shared by the performance and provider layers.

use chrono::{DateTime, Duration, Datelike, NaiveDate, Utc};

/// Offset (hours) from UTC used to assign business dates to timestamps.
///
/// Providers report system times in UTC; flows booked near midnight UTC
/// belong to the prior US business day.
pub const DEFAULT_BUSINESS_OFFSET_HOURS: i64 = -5;

/// Truncates a UTC timestamp to its business date.
///
/// Applies the configured offset and drops the time component, so a
/// 00:30 UTC deposit lands on the prior local day instead of leaking into
/// the next month.
#[must_use]
pub fn business_date(ts: DateTime<Utc>, offset_hours: i64) -> NaiveDate {
    (ts + Duration::hours(offset_hours)).date_naive()
}

/// Truncates using [`DEFAULT_BUSINESS_OFFSET_HOURS`].
#[must_use]
pub fn business_date_default(ts: DateTime<Utc>) -> NaiveDate {
    business_date(ts, DEFAULT_BUSINESS_OFFSET_HOURS)
}

/// First day of the month containing `date`.
#[must_use]
pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// Number of whole months spanned by `[start, end]`, minimum 1.
#[must_use]
pub fn months_spanned(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 1;
    }
    let months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    (months + 1).max(1) as u32
}
