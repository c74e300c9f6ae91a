//! Helper functions and utilities
//!
//! Parsing and formatting helpers shared by the models and services.

use chrono::{NaiveDate, NaiveTime, Weekday};

/// Date format used for pool dates and explicit event dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time-of-day format used for event slots
pub const TIME_FORMAT: &str = "%H:%M";

/// Parse a `YYYY-MM-DD` date, returning `None` on malformed input
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Parse an `HH:MM` time of day, returning `None` on malformed input
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT).ok()
}

/// Zero-padded `HH:MM` form of a time of day; malformed input is only trimmed
pub fn canonical_time(value: &str) -> String {
    match parse_time_of_day(value) {
        Some(time) => time.format(TIME_FORMAT).to_string(),
        None => value.trim().to_string(),
    }
}

/// Parse an English weekday name ("Monday", "mon", case-insensitive)
pub fn parse_weekday(value: &str) -> Option<Weekday> {
    value.trim().parse::<Weekday>().ok()
}

/// Canonical English name of a weekday
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Normalize a participant login: trimmed and lowercased
pub fn normalize_login(login: &str) -> String {
    login.trim().to_lowercase()
}

/// Length in hours of a same-day slot, `None` if either bound is malformed
pub fn slot_hours(start_time: &str, end_time: &str) -> Option<f64> {
    let start = parse_time_of_day(start_time)?;
    let end = parse_time_of_day(end_time)?;
    Some((end - start).num_minutes() as f64 / 60.0)
}

/// Truncate text to a maximum number of characters with ellipsis
pub fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_length.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
