//! Temporal resolution
//!
//! Derives concrete calendar dates from the pool start anchor plus a week
//! index, and decides whether a slot has ended. Everything here is pure
//! except the [`Clock`] implementations.

use std::sync::Mutex;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use crate::models::Event;
use crate::utils::helpers::{parse_date, parse_time_of_day};

const WEEK_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// How the ledger treats events whose concrete date cannot be resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalPolicy {
    /// Unknown date never blocks an action
    #[default]
    FailOpen,
    /// Unknown date rejects self-service actions
    FailClosed,
}

/// Ordered weekday to date mapping for one pool week
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekDates {
    days: Vec<(Weekday, NaiveDate)>,
}

impl WeekDates {
    pub fn get(&self, day: Weekday) -> Option<NaiveDate> {
        self.days
            .iter()
            .find(|(weekday, _)| *weekday == day)
            .map(|(_, date)| *date)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Weekday, NaiveDate)> {
        self.days.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.days.first().map(|(_, date)| *date)
    }
}

/// Resolve the Monday..Sunday dates of a pool week.
///
/// Week 1 begins at `pool_start`; week N begins `7 * (N - 1)` days later.
/// The week index is clamped to at least 1. A missing or unparsable anchor
/// yields an empty mapping.
pub fn resolve_week_dates(pool_start: Option<&str>, week: i32) -> WeekDates {
    let Some(start) = pool_start.and_then(parse_date) else {
        return WeekDates::default();
    };

    let offset = 7 * (i64::from(week.max(1)) - 1);
    let days = WEEK_DAYS
        .iter()
        .enumerate()
        .map_while(|(index, day)| {
            start
                .checked_add_signed(Duration::days(offset + index as i64))
                .map(|date| (*day, date))
        })
        .collect::<Vec<_>>();

    // A partially representable week is as useless as none
    if days.len() != WEEK_DAYS.len() {
        return WeekDates::default();
    }
    WeekDates { days }
}

/// Whether a slot ending at `end_time` on `date` has ended at `now`.
///
/// Fails open: an absent date or malformed time is never passed. The end
/// instant itself still counts as not passed.
pub fn has_passed(date: Option<NaiveDate>, end_time: &str, now: NaiveDateTime) -> bool {
    let (Some(date), Some(end)) = (date, parse_time_of_day(end_time)) else {
        return false;
    };
    now > date.and_time(end)
}

/// Concrete date of an event: explicit date first, else the week-derived one
pub fn concrete_date(event: &Event, pool_start: Option<&str>) -> Option<NaiveDate> {
    if event.event_date.is_some() {
        return event.event_date;
    }
    let day = event.day()?;
    resolve_week_dates(pool_start, event.week).get(day)
}

/// Source of "now" in the single implicit local zone
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
