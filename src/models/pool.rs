//! Pool settings model
//!
//! Process-wide, admin-controlled values stored as string key/value rows.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::models::event::MAX_WEEK;

pub const ACTIVE_WEEK: &str = "active_week";
pub const DISPLAY_WEEK: &str = "display_week";
pub const POOL_START: &str = "pool_start";
pub const POOL_END: &str = "pool_end";
pub const MAX_EVENTS_PER_USER: &str = "max_events_per_user";

/// Rows inserted on first initialization when absent
pub const DEFAULTS: [(&str, &str); 3] = [
    (ACTIVE_WEEK, "1"),
    (DISPLAY_WEEK, "1"),
    (MAX_EVENTS_PER_USER, "0"),
];

/// Typed snapshot of the settings table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    pub active_week: i32,
    pub display_week: i32,
    /// Raw `YYYY-MM-DD`; validity is decided by the temporal resolver
    pub pool_start: Option<String>,
    pub pool_end: Option<String>,
    /// 0 = unlimited
    pub max_events_per_user: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            active_week: 1,
            display_week: 1,
            pool_start: None,
            pool_end: None,
            max_events_per_user: 0,
        }
    }
}

impl PoolSettings {
    /// Build from raw rows; malformed numbers fall back to defaults
    pub fn from_rows(rows: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            active_week: parse_week(rows, ACTIVE_WEEK, defaults.active_week),
            display_week: parse_week(rows, DISPLAY_WEEK, defaults.display_week),
            pool_start: non_empty(rows, POOL_START),
            pool_end: non_empty(rows, POOL_END),
            max_events_per_user: match rows.get(MAX_EVENTS_PER_USER) {
                None => defaults.max_events_per_user,
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    warn!(key = MAX_EVENTS_PER_USER, value = %raw, "Malformed setting, using default");
                    defaults.max_events_per_user
                }),
            },
        }
    }
}

fn parse_week(rows: &HashMap<String, String>, key: &str, default: i32) -> i32 {
    match rows.get(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<i32>() {
            Ok(week) if (1..=MAX_WEEK).contains(&week) => week,
            _ => {
                warn!(key = key, value = %raw, "Malformed week setting, using default");
                default
            }
        },
    }
}

fn non_empty(rows: &HashMap<String, String>, key: &str) -> Option<String> {
    rows.get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
