//! Local civil-date arithmetic.
//!
//! All dates are `NaiveDate` values taken from the device's local calendar.
//! Shifting works in whole calendar days, so month/year rollovers and DST
//! transitions never move a date by an hour.

use chrono::{Datelike, Days, Local, NaiveDate};

/// The current date in the local time zone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `base` shifted by `delta_days` calendar days (negative = past).
///
/// Saturates at the chrono date range limits.
pub fn date_offset(base: NaiveDate, delta_days: i64) -> NaiveDate {
    let shifted = if delta_days >= 0 {
        base.checked_add_days(Days::new(delta_days.unsigned_abs()))
    } else {
        base.checked_sub_days(Days::new(delta_days.unsigned_abs()))
    };
    shifted.unwrap_or(if delta_days >= 0 {
        NaiveDate::MAX
    } else {
        NaiveDate::MIN
    })
}

/// The Monday..Sunday week containing `date`. A Sunday is the end of its week.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let from_monday = i64::from(date.weekday().num_days_from_monday());
    let monday = date_offset(date, -from_monday);
    (monday, date_offset(monday, 6))
}

/// The seven dates of the week containing `date`, Monday first.
pub fn week_days(date: NaiveDate) -> [NaiveDate; 7] {
    let (monday, _) = week_bounds(date);
    std::array::from_fn(|i| date_offset(monday, i as i64))
}

/// English day name for a Monday-based slot index (0 = Monday).
pub fn weekday_name(index: usize) -> Option<&'static str> {
    const NAMES: [&str; 7] = [
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
        "Sunday",
    ];
    NAMES.get(index).copied()
}

/// Parse a `YYYY-MM-DD` civil date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}
