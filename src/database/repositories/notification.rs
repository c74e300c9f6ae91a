//! Notification repository implementation

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;
use crate::database::store::NotificationStore;
use crate::models::*;
use crate::utils::errors::Result;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, event_id, registration_id, notification_type, fire_at, created_at, sent, sent_at, error_message";

#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn get_preferences(&self, user_id: &str) -> Result<Option<NotificationPreferences>> {
        let preferences = sqlx::query_as::<_, NotificationPreferences>(
            "SELECT notifications_enabled, notify_24h_before, notify_1h_before FROM notification_preferences WHERE user_id = $1"
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(preferences)
    }

    async fn set_preferences(&self, user_id: &str, preferences: &NotificationPreferences) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_preferences (user_id, notifications_enabled, notify_24h_before, notify_1h_before)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET notifications_enabled = EXCLUDED.notifications_enabled,
                notify_24h_before = EXCLUDED.notify_24h_before,
                notify_1h_before = EXCLUDED.notify_1h_before
            "#
        )
        .bind(user_id)
        .bind(preferences.enabled)
        .bind(preferences.notify_24h)
        .bind(preferences.notify_1h)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_subscription(&self, user_id: &str, subscription: &NewPushSubscription) -> Result<PushSubscription> {
        let stored = sqlx::query_as::<_, PushSubscription>(
            r#"
            INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (endpoint) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                p256dh = EXCLUDED.p256dh,
                auth = EXCLUDED.auth
            RETURNING id, user_id, endpoint, p256dh, auth, created_at
            "#
        )
        .bind(user_id)
        .bind(&subscription.endpoint)
        .bind(&subscription.p256dh)
        .bind(&subscription.auth)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn delete_subscription_by_endpoint(&self, endpoint: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = $1")
            .bind(endpoint)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_subscription(&self, subscription_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE id = $1")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<PushSubscription>> {
        let subscriptions = sqlx::query_as::<_, PushSubscription>(
            "SELECT id, user_id, endpoint, p256dh, auth, created_at FROM push_subscriptions WHERE user_id = $1 ORDER BY id ASC"
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    async fn insert_notification(&self, notification: &NewScheduledNotification) -> Result<ScheduledNotification> {
        let stored = sqlx::query_as::<_, ScheduledNotification>(&format!(
            r#"
            INSERT INTO scheduled_notifications (user_id, event_id, registration_id, notification_type, fire_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        ))
        .bind(&notification.user_id)
        .bind(notification.event_id)
        .bind(notification.registration_id)
        .bind(notification.kind.as_str())
        .bind(notification.fire_at)
        .bind(notification.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn list_for_registration(&self, registration_id: i64) -> Result<Vec<ScheduledNotification>> {
        let rows = sqlx::query_as::<_, ScheduledNotification>(&format!(
            "SELECT {} FROM scheduled_notifications WHERE registration_id = $1 ORDER BY fire_at ASC, id ASC",
            NOTIFICATION_COLUMNS
        ))
        .bind(registration_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn delete_unsent_for_registration(&self, registration_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scheduled_notifications WHERE registration_id = $1 AND sent = FALSE")
            .bind(registration_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn due_notifications(&self, now: NaiveDateTime) -> Result<Vec<DueNotification>> {
        let due = sqlx::query_as::<_, DueNotification>(
            r#"
            SELECT n.id, n.user_id, n.event_id, n.registration_id, n.notification_type, n.fire_at,
                   e.title, e.weekday, e.start_time
            FROM scheduled_notifications n
            JOIN events e ON n.event_id = e.id
            WHERE n.sent = FALSE AND n.fire_at <= $1
            ORDER BY n.fire_at ASC, n.id ASC
            "#
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(due)
    }

    async fn mark_sent(&self, notification_id: i64, sent_at: NaiveDateTime) -> Result<()> {
        sqlx::query("UPDATE scheduled_notifications SET sent = TRUE, sent_at = $2, error_message = NULL WHERE id = $1")
            .bind(notification_id)
            .bind(sent_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn record_error(&self, notification_id: i64, message: &str) -> Result<()> {
        sqlx::query("UPDATE scheduled_notifications SET error_message = $2 WHERE id = $1")
            .bind(notification_id)
            .bind(message)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn purge_sent_before(&self, cutoff: NaiveDateTime) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scheduled_notifications WHERE sent = TRUE AND sent_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
