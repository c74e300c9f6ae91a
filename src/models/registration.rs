//! Registration model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

/// One participant's enrollment in one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub id: i64,
    pub event_id: i64,
    pub participant: String,
    pub registered_at: DateTime<Utc>,
    /// Defaults to true at creation; admins flip it to mark no-shows
    pub attended: bool,
}

/// Derived projections over the registrations of one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EventCounts {
    /// `count(*)`: slot occupancy used by the capacity check
    pub enrolled: i64,
    /// `count(attended = true)`: what public views show as registered
    pub attended: i64,
}

/// Rules applied by the store when inserting a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollPolicy {
    pub enforce_capacity: bool,
    /// Max registrations per participant within the event's week
    pub weekly_cap: Option<u32>,
}

impl EnrollPolicy {
    /// Self-service enrollment: capacity enforced, optional weekly cap
    pub fn self_service(max_events_per_user: u32) -> Self {
        Self {
            enforce_capacity: true,
            weekly_cap: (max_events_per_user > 0).then_some(max_events_per_user),
        }
    }

    /// Admin override: only the uniqueness invariant applies
    pub fn admin_override() -> Self {
        Self {
            enforce_capacity: false,
            weekly_cap: None,
        }
    }
}

/// Result of the store's atomic check-and-insert
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterResult {
    Inserted(Registration),
    AlreadyRegistered,
    EventFull { max_slots: i32 },
    WeeklyCapReached { limit: u32 },
    EventMissing,
}

/// A registration joined with the event fields needed for compensation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ParticipantRegistration {
    pub participant: String,
    pub attended: bool,
    pub registered_at: DateTime<Utc>,
    pub event_id: i64,
    pub title: String,
    pub weekday: String,
    pub start_time: String,
    pub end_time: String,
    pub compensation: i32,
    pub week: i32,
    pub event_date: Option<NaiveDate>,
}

/// Per-participant compensation totals (attended rows only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub participant: String,
    pub attended_events: u32,
    pub total_hours: f64,
    pub total_compensation: i64,
    pub registrations: Vec<ParticipantRegistration>,
}

/// Whitelisted participant login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WhitelistEntry {
    pub id: i64,
    pub login: String,
    pub added_at: DateTime<Utc>,
}
