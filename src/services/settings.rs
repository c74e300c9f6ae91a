//! Pool settings service
//!
//! Typed, validated access to the process-wide pool settings. Every change
//! goes through the store so concurrent writers never lose an update.

use std::sync::Arc;
use chrono::{Duration, NaiveDate};
use serde_json::json;
use tracing::info;
use crate::database::SettingsStore;
use crate::models::event::MAX_WEEK;
use crate::models::pool::{self, PoolSettings};
use crate::services::broadcast::{Broadcaster, TOPIC_WEEK_ACTIVATED};
use crate::utils::errors::{ShiftPoolError, Result};
use crate::utils::helpers::{parse_date, DATE_FORMAT};
use crate::utils::logging::log_admin_action;

/// Days from pool start to the last day of week 4
const POOL_SPAN_DAYS: i64 = 7 * MAX_WEEK as i64 - 1;

#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingsStore>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { store, broadcaster }
    }

    /// Insert default rows that are still missing
    pub async fn initialize(&self) -> Result<()> {
        for (key, value) in pool::DEFAULTS {
            if self.store.insert_if_absent(key, value).await? {
                info!(key = key, value = value, "Initialized pool setting");
            }
        }
        Ok(())
    }

    pub async fn load(&self) -> Result<PoolSettings> {
        let rows = self.store.get_all().await?;
        Ok(PoolSettings::from_rows(&rows))
    }

    /// Open a week for self-service actions
    pub async fn set_active_week(&self, week: i32) -> Result<()> {
        validate_week(week)?;
        self.store.set(pool::ACTIVE_WEEK, &week.to_string()).await?;
        log_admin_action("set_active_week", Some(&week.to_string()), None);
        self.broadcaster.publish(TOPIC_WEEK_ACTIVATED, json!({ "week": week })).await;
        Ok(())
    }

    /// Admin override of the public display week
    pub async fn set_display_week(&self, week: i32) -> Result<()> {
        validate_week(week)?;
        self.store.set(pool::DISPLAY_WEEK, &week.to_string()).await?;
        log_admin_action("set_display_week", Some(&week.to_string()), None);
        Ok(())
    }

    /// One ratchet step: succeeds only if the display week is still `from`
    pub async fn compare_and_set_display_week(&self, from: i32, to: i32) -> Result<bool> {
        validate_week(to)?;
        let expected = from.to_string();
        let new = to.to_string();
        if self.store.compare_and_set(pool::DISPLAY_WEEK, &expected, &new).await? {
            return Ok(true);
        }
        // The row may be missing on an uninitialized store
        if self.store.get(pool::DISPLAY_WEEK).await?.is_none() && from == 1 {
            return self.store.insert_if_absent(pool::DISPLAY_WEEK, &new).await;
        }
        Ok(false)
    }

    /// Store pool anchor dates; the end defaults to the last day of week 4
    pub async fn set_pool_dates(&self, start: &str, end: Option<&str>) -> Result<(NaiveDate, NaiveDate)> {
        let start_date = parse_date(start)
            .ok_or_else(|| ShiftPoolError::InvalidInput(format!("Pool start must be YYYY-MM-DD, got '{}'", start)))?;
        let end_date = match end.map(str::trim).filter(|value| !value.is_empty()) {
            Some(raw) => parse_date(raw)
                .ok_or_else(|| ShiftPoolError::InvalidInput(format!("Pool end must be YYYY-MM-DD, got '{}'", raw)))?,
            None => start_date
                .checked_add_signed(Duration::days(POOL_SPAN_DAYS))
                .ok_or_else(|| ShiftPoolError::InvalidInput("Pool start is out of range".to_string()))?,
        };
        if end_date < start_date {
            return Err(ShiftPoolError::InvalidInput(format!(
                "Pool end {} is before pool start {}",
                end_date, start_date
            )));
        }

        let start_value = start_date.format(DATE_FORMAT).to_string();
        let end_value = end_date.format(DATE_FORMAT).to_string();
        self.store.set(pool::POOL_START, &start_value).await?;
        self.store.set(pool::POOL_END, &end_value).await?;
        log_admin_action("set_pool_dates", Some(&start_value), Some(&format!("end {}", end_value)));
        Ok((start_date, end_date))
    }

    /// 0 means unlimited
    pub async fn set_max_events_per_user(&self, max_events: i64) -> Result<()> {
        if max_events < 0 {
            return Err(ShiftPoolError::InvalidInput("Max events per user cannot be negative".to_string()));
        }
        let max_events = u32::try_from(max_events)
            .map_err(|_| ShiftPoolError::InvalidInput(format!("Max events per user too large: {}", max_events)))?;
        self.store.set(pool::MAX_EVENTS_PER_USER, &max_events.to_string()).await?;
        log_admin_action("set_max_events_per_user", Some(&max_events.to_string()), None);
        Ok(())
    }
}

fn validate_week(week: i32) -> Result<()> {
    if (1..=MAX_WEEK).contains(&week) {
        Ok(())
    } else {
        Err(ShiftPoolError::InvalidInput(format!("Week must be between 1 and {}, got {}", MAX_WEEK, week)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::services::broadcast::ChannelBroadcaster;

    fn service() -> (SettingsService, ChannelBroadcaster) {
        let broadcaster = ChannelBroadcaster::default();
        let service = SettingsService::new(Arc::new(MemoryStore::new()), Arc::new(broadcaster.clone()));
        (service, broadcaster)
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (service, _) = service();
        service.initialize().await.unwrap();
        service.set_active_week(3).await.unwrap();
        service.initialize().await.unwrap();

        let settings = service.load().await.unwrap();
        assert_eq!(settings.active_week, 3);
        assert_eq!(settings.display_week, 1);
        assert_eq!(settings.max_events_per_user, 0);
    }

    #[tokio::test]
    async fn test_set_active_week_broadcasts() {
        let (service, broadcaster) = service();
        let mut viewer = broadcaster.subscribe();
        service.set_active_week(2).await.unwrap();

        let message = viewer.recv().await.unwrap();
        assert_eq!(message.topic, TOPIC_WEEK_ACTIVATED);
        assert_eq!(message.payload["week"], 2);
        assert!(service.set_active_week(5).await.is_err());
    }

    #[tokio::test]
    async fn test_pool_end_defaults_to_four_weeks() {
        let (service, _) = service();
        let (start, end) = service.set_pool_dates("2026-10-05", None).await.unwrap();
        assert_eq!(end - start, Duration::days(27));

        let settings = service.load().await.unwrap();
        assert_eq!(settings.pool_start.as_deref(), Some("2026-10-05"));
        assert_eq!(settings.pool_end.as_deref(), Some("2026-11-01"));
    }

    #[tokio::test]
    async fn test_pool_dates_rejected() {
        let (service, _) = service();
        assert!(service.set_pool_dates("05/10/2026", None).await.is_err());
        assert!(service.set_pool_dates("2026-10-05", Some("2026-10-01")).await.is_err());
        assert!(service.load().await.unwrap().pool_start.is_none());
    }

    #[tokio::test]
    async fn test_compare_and_set_display_week() {
        let (service, _) = service();
        service.initialize().await.unwrap();
        assert!(service.compare_and_set_display_week(1, 2).await.unwrap());
        assert!(!service.compare_and_set_display_week(1, 2).await.unwrap());
        assert_eq!(service.load().await.unwrap().display_week, 2);
    }

    #[tokio::test]
    async fn test_max_events_per_user_bounds() {
        let (service, _) = service();
        assert!(service.set_max_events_per_user(-1).await.is_err());
        service.set_max_events_per_user(2).await.unwrap();
        assert_eq!(service.load().await.unwrap().max_events_per_user, 2);
    }
}
