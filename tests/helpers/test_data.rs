//! Test data builders

use chrono::NaiveDateTime;
use ShiftPool::models::{CreateEventRequest, NewPushSubscription};
use ShiftPool::utils::helpers::parse_date;

/// Monday of week 1 in every fixture
pub const POOL_START: &str = "2026-10-05";

pub const PARTICIPANTS: [&str; 4] = ["alice", "bob", "carol", "dave"];

pub fn at(date: &str, hour: u32, minute: u32) -> NaiveDateTime {
    parse_date(date)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .expect("valid fixture timestamp")
}

/// Two-hour shift with the given placement and capacity
pub fn shift(week: i32, weekday: &str, start: &str, end: &str, max_slots: i32) -> CreateEventRequest {
    CreateEventRequest {
        title: format!("{} shift week {}", weekday, week),
        description: Some("Front desk duty".to_string()),
        weekday: weekday.to_string(),
        start_time: start.to_string(),
        end_time: end.to_string(),
        max_slots,
        compensation: 100,
        week,
        event_date: None,
    }
}

pub fn monday_shift(max_slots: i32) -> CreateEventRequest {
    shift(1, "Monday", "16:00", "18:00", max_slots)
}

pub fn subscription(tag: &str) -> NewPushSubscription {
    NewPushSubscription {
        endpoint: format!("https://push.example.org/{}", tag),
        p256dh: format!("p256dh-{}", tag),
        auth: format!("auth-{}", tag),
    }
}
