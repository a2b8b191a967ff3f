//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use chrono::{Months, NaiveDate, NaiveDateTime};

/// Storage/wire format for local (offset-less) datetimes
pub const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Storage/wire format for calendar dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a local datetime the way it is stored and compared
pub fn format_local(value: &NaiveDateTime) -> String {
    value.format(LOCAL_DATETIME_FORMAT).to_string()
}

/// Last day of the rolling window starting at `today`
///
/// Falls back to `NaiveDate::MAX` when the addition overflows.
pub fn horizon_end(today: NaiveDate, months: u32) -> NaiveDate {
    today
        .checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Iterate every date from `start` to `end`, both inclusive
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(start), |d| d.succ_opt()).take_while(move |d| *d <= end)
}
