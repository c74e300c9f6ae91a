//! Event model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use sqlx::FromRow;
use crate::utils::errors::{ShiftPoolError, Result};
use crate::utils::helpers::{canonical_time, parse_time_of_day, parse_weekday, weekday_name};

/// Number of logical weeks in a pool
pub const MAX_WEEK: i32 = 4;

/// A time-boxed shift within one of the pool weeks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub weekday: String,
    pub start_time: String,
    pub end_time: String,
    pub max_slots: i32,
    pub compensation: i32,
    pub week: i32,
    pub event_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn day(&self) -> Option<Weekday> {
        parse_weekday(&self.weekday)
    }

    /// Start instant on the given concrete date
    pub fn start_on(&self, date: NaiveDate) -> Option<NaiveDateTime> {
        parse_time_of_day(&self.start_time).map(|time| date.and_time(time))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub weekday: String,
    pub start_time: String,
    pub end_time: String,
    pub max_slots: i32,
    pub compensation: i32,
    pub week: i32,
    pub event_date: Option<NaiveDate>,
}

impl CreateEventRequest {
    /// Check field formats and the slot invariants before any mutation
    pub fn validate(&self) -> Result<()> {
        validate_event_fields(
            &self.title,
            &self.weekday,
            &self.start_time,
            &self.end_time,
            self.max_slots,
            self.compensation,
            self.week,
        )
    }

    /// Same request with the weekday and slot times in canonical form
    pub fn normalized(mut self) -> Self {
        if let Some(day) = parse_weekday(&self.weekday) {
            self.weekday = weekday_name(day).to_string();
        }
        self.title = self.title.trim().to_string();
        self.start_time = canonical_time(&self.start_time);
        self.end_time = canonical_time(&self.end_time);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub weekday: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub max_slots: Option<i32>,
    pub compensation: Option<i32>,
    pub week: Option<i32>,
    pub event_date: Option<NaiveDate>,
}

impl UpdateEventRequest {
    /// Merge the request into an existing event and validate the result
    pub fn apply_to(&self, event: &Event) -> Result<Event> {
        let mut updated = event.clone();
        if let Some(title) = &self.title {
            updated.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            updated.description = Some(description.clone());
        }
        if let Some(weekday) = &self.weekday {
            updated.weekday = weekday.clone();
        }
        if let Some(start_time) = &self.start_time {
            updated.start_time = start_time.trim().to_string();
        }
        if let Some(end_time) = &self.end_time {
            updated.end_time = end_time.trim().to_string();
        }
        if let Some(max_slots) = self.max_slots {
            updated.max_slots = max_slots;
        }
        if let Some(compensation) = self.compensation {
            updated.compensation = compensation;
        }
        if let Some(week) = self.week {
            updated.week = week;
        }
        if self.event_date.is_some() {
            updated.event_date = self.event_date;
        }

        validate_event_fields(
            &updated.title,
            &updated.weekday,
            &updated.start_time,
            &updated.end_time,
            updated.max_slots,
            updated.compensation,
            updated.week,
        )?;
        if let Some(day) = parse_weekday(&updated.weekday) {
            updated.weekday = weekday_name(day).to_string();
        }
        // Stored times compare as text
        updated.start_time = canonical_time(&updated.start_time);
        updated.end_time = canonical_time(&updated.end_time);
        Ok(updated)
    }
}

fn validate_event_fields(
    title: &str,
    weekday: &str,
    start_time: &str,
    end_time: &str,
    max_slots: i32,
    compensation: i32,
    week: i32,
) -> Result<()> {
    if title.trim().is_empty() {
        return Err(ShiftPoolError::InvalidInput("Event title is required".to_string()));
    }
    if parse_weekday(weekday).is_none() {
        return Err(ShiftPoolError::InvalidInput(format!("Unknown weekday: {}", weekday)));
    }
    let start = parse_time_of_day(start_time).ok_or_else(|| {
        ShiftPoolError::InvalidInput(format!("Start time must be HH:MM, got '{}'", start_time))
    })?;
    let end = parse_time_of_day(end_time).ok_or_else(|| {
        ShiftPoolError::InvalidInput(format!("End time must be HH:MM, got '{}'", end_time))
    })?;
    if start >= end {
        return Err(ShiftPoolError::InvalidInput(format!(
            "Start time {} must be before end time {}",
            start_time, end_time
        )));
    }
    if !(1..=MAX_WEEK).contains(&week) {
        return Err(ShiftPoolError::InvalidInput(format!("Week must be between 1 and {}, got {}", MAX_WEEK, week)));
    }
    if max_slots < 0 {
        return Err(ShiftPoolError::InvalidInput("Max slots cannot be negative".to_string()));
    }
    if compensation < 0 {
        return Err(ShiftPoolError::InvalidInput("Compensation cannot be negative".to_string()));
    }
    Ok(())
}

/// Point-in-time view of an event, as published to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub weekday: String,
    pub start_time: String,
    pub end_time: String,
    pub max_slots: i32,
    pub compensation: i32,
    pub week: i32,
    pub concrete_date: Option<NaiveDate>,
    pub is_passed: bool,
    /// Slot occupancy: every registration row
    pub enrolled: i64,
    /// Registrations still marked as attended
    pub visible_registered: i64,
    pub participants: Vec<String>,
    pub available_slots: i64,
}

/// Broadcast action attached to an event snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Update,
    Delete,
}
