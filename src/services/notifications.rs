//! Notification scheduler
//!
//! Computes reminder fire times per registration, persists them, dispatches
//! due rows to every push subscription of the user and retires stale rows.
//! Rows move `Pending -> Sent`; a failed attempt leaves the row pending with
//! an error message so the next poll retries it.

use std::sync::Arc;
use chrono::{Duration, NaiveDateTime};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::database::NotificationStore;
use crate::models::*;
use crate::services::push::{DeliveryOutcome, PushSender};
use crate::services::temporal::Clock;
use crate::utils::errors::{ShiftPoolError, Result};
use crate::utils::helpers::truncate_text;
use crate::utils::logging::log_notification;

pub const NO_SUBSCRIPTIONS: &str = "No active push subscriptions";

/// Longest error message kept on a notification row
const MAX_ERROR_LENGTH: usize = 500;

/// Counters for one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub removed_subscriptions: usize,
}

#[derive(Clone)]
pub struct NotificationScheduler {
    store: Arc<dyn NotificationStore>,
    sender: Arc<dyn PushSender>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        sender: Arc<dyn PushSender>,
        clock: Arc<dyn Clock>,
        retention_days: i64,
    ) -> Self {
        Self {
            store,
            sender,
            clock,
            retention: Duration::days(retention_days),
        }
    }

    /// Persist one row per wanted lead time whose fire instant is still ahead
    pub async fn schedule_for_registration(
        &self,
        user_id: &str,
        event_id: i64,
        registration_id: i64,
        event_start: NaiveDateTime,
    ) -> Result<Vec<ScheduledNotification>> {
        let preferences = self.preferences(user_id).await?;
        let now = self.clock.now();
        let mut scheduled = Vec::new();

        for kind in preferences.wanted_kinds() {
            let fire_at = event_start - kind.lead_time();
            if fire_at <= now {
                debug!(registration_id = registration_id, kind = %kind, "Lead time already past, skipping");
                continue;
            }
            let row = self
                .store
                .insert_notification(&NewScheduledNotification {
                    user_id: user_id.to_string(),
                    event_id,
                    registration_id,
                    kind,
                    fire_at,
                    created_at: now,
                })
                .await?;
            scheduled.push(row);
        }

        if !scheduled.is_empty() {
            info!(
                user_id = %user_id,
                event_id = event_id,
                registration_id = registration_id,
                count = scheduled.len(),
                "Scheduled notifications"
            );
        }
        Ok(scheduled)
    }

    /// Drop the unsent rows of a registration; sent rows stay as history
    pub async fn cancel_for_registration(&self, registration_id: i64) -> Result<u64> {
        let deleted = self.store.delete_unsent_for_registration(registration_id).await?;
        if deleted > 0 {
            info!(registration_id = registration_id, deleted = deleted, "Cancelled notifications");
        }
        Ok(deleted)
    }

    /// Deliver every due row; one row failing never aborts the pass
    pub async fn poll_and_dispatch(&self) -> Result<DispatchReport> {
        let now = self.clock.now();
        let due = self.store.due_notifications(now).await?;
        let mut report = DispatchReport::default();

        for notification in &due {
            report.processed += 1;
            match self.dispatch_one(notification, now).await {
                Ok((delivered, removed)) => {
                    report.removed_subscriptions += removed;
                    if delivered {
                        report.sent += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(notification_id = notification.id, error = %e, "Notification dispatch failed");
                    if let Err(record_err) = self.store.record_error(notification.id, &e.to_string()).await {
                        warn!(notification_id = notification.id, error = %record_err, "Could not record dispatch error");
                    }
                }
            }
        }

        if report.processed > 0 {
            info!(
                processed = report.processed,
                sent = report.sent,
                failed = report.failed,
                removed_subscriptions = report.removed_subscriptions,
                "Processed pending notifications"
            );
        }
        Ok(report)
    }

    /// Returns (delivered to at least one subscription, subscriptions removed)
    async fn dispatch_one(&self, notification: &DueNotification, now: NaiveDateTime) -> Result<(bool, usize)> {
        let kind = NotificationKind::parse(&notification.notification_type).ok_or_else(|| {
            ShiftPoolError::InvalidInput(format!("Unknown notification type: {}", notification.notification_type))
        })?;

        let subscriptions = self.store.list_subscriptions(&notification.user_id).await?;
        if subscriptions.is_empty() {
            self.store.record_error(notification.id, NO_SUBSCRIPTIONS).await?;
            log_notification(notification.id, &notification.user_id, "no_subscriptions", None);
            return Ok((false, 0));
        }

        let payload = serde_json::to_string(&PushPayload::reminder(
            kind,
            &notification.title,
            &notification.weekday,
            &notification.start_time,
        ))?;

        let outcomes = join_all(
            subscriptions
                .iter()
                .map(|subscription| self.sender.deliver(subscription, &payload)),
        )
        .await;

        let mut delivered = false;
        let mut removed = 0;
        let mut errors = Vec::new();
        for (subscription, outcome) in subscriptions.iter().zip(outcomes) {
            match outcome {
                DeliveryOutcome::Delivered => delivered = true,
                DeliveryOutcome::PermanentFailure(reason) => {
                    if self.store.delete_subscription(subscription.id).await? {
                        removed += 1;
                    }
                    info!(subscription_id = subscription.id, reason = %reason, "Removed expired push subscription");
                    errors.push(reason);
                }
                DeliveryOutcome::TransientFailure(reason) => {
                    debug!(subscription_id = subscription.id, reason = %reason, "Transient push failure");
                    errors.push(reason);
                }
            }
        }

        if delivered {
            self.store.mark_sent(notification.id, now).await?;
            log_notification(notification.id, &notification.user_id, "sent", Some(kind.as_str()));
        } else {
            let message = truncate_text(&format!("Delivery failed: {}", errors.join("; ")), MAX_ERROR_LENGTH);
            self.store.record_error(notification.id, &message).await?;
            log_notification(notification.id, &notification.user_id, "failed", Some(&message));
        }
        Ok((delivered, removed))
    }

    /// Delete sent rows older than the retention window
    pub async fn purge_stale(&self) -> Result<u64> {
        let cutoff = self.clock.now() - self.retention;
        let deleted = self.store.purge_sent_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted = deleted, "Cleaned up old notifications");
        }
        Ok(deleted)
    }

    /// Client-side opt-in: upsert by endpoint
    pub async fn subscribe(&self, user_id: &str, subscription: &NewPushSubscription) -> Result<PushSubscription> {
        if subscription.endpoint.trim().is_empty()
            || subscription.p256dh.trim().is_empty()
            || subscription.auth.trim().is_empty()
        {
            return Err(ShiftPoolError::InvalidInput("Push subscription requires endpoint and keys".to_string()));
        }
        let stored = self.store.upsert_subscription(user_id, subscription).await?;
        info!(user_id = %user_id, subscription_id = stored.id, "Push subscription saved");
        Ok(stored)
    }

    pub async fn unsubscribe(&self, endpoint: &str) -> Result<bool> {
        self.store.delete_subscription_by_endpoint(endpoint).await
    }

    /// Stored preferences, all enabled when never set
    pub async fn preferences(&self, user_id: &str) -> Result<NotificationPreferences> {
        Ok(self.store.get_preferences(user_id).await?.unwrap_or_default())
    }

    pub async fn set_preferences(&self, user_id: &str, preferences: &NotificationPreferences) -> Result<()> {
        self.store.set_preferences(user_id, preferences).await
    }
}
