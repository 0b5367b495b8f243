use crate::error::{ForecastError, Result};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Utc};

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .unwrap_or(NaiveDate::MAX)
}

pub fn is_month_end(date: NaiveDate) -> bool {
    date == last_day_of_month(date.year(), date.month())
}

pub fn is_month_start(date: NaiveDate) -> bool {
    date.day() == 1
}

pub fn add_days(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_add_days(Days::new(days)).ok_or_else(|| {
        ForecastError::DateError(format!("Adding {} days to {} overflows", days, date))
    })
}

/// Every calendar day in `[start, end]`, ascending. Empty when `end < start`.
pub fn daily_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// English weekday name, e.g. "Monday".
pub fn weekday_label(date: NaiveDate) -> String {
    date.format("%A").to_string()
}

/// Parses a transaction date given as `YYYY-MM-DD`, an RFC 3339 timestamp, or
/// a naive `YYYY-MM-DDTHH:MM:SS[.f]` timestamp. Only the calendar date is kept;
/// timestamps carrying an offset are converted to UTC first.
pub fn parse_transaction_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc).date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts.date());
        }
    }

    Err(ForecastError::DateError(format!(
        "Invalid date '{}'. Expected YYYY-MM-DD or an ISO-8601 timestamp",
        raw
    )))
}
