//! Notification models: scheduled reminders, preferences and push subscriptions

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sqlx::FromRow;

/// Lead time of a reminder relative to the event start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "24h_before")]
    DayBefore,
    #[serde(rename = "1h_before")]
    HourBefore,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 2] = [NotificationKind::DayBefore, NotificationKind::HourBefore];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DayBefore => "24h_before",
            NotificationKind::HourBefore => "1h_before",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "24h_before" => Some(NotificationKind::DayBefore),
            "1h_before" => Some(NotificationKind::HourBefore),
            _ => None,
        }
    }

    pub fn lead_time(&self) -> Duration {
        match self {
            NotificationKind::DayBefore => Duration::hours(24),
            NotificationKind::HourBefore => Duration::hours(1),
        }
    }

    /// Phrase used in the reminder body
    pub fn phrase(&self) -> &'static str {
        match self {
            NotificationKind::DayBefore => "tomorrow",
            NotificationKind::HourBefore => "in 1 hour",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted reminder for one registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ScheduledNotification {
    pub id: i64,
    pub user_id: String,
    pub event_id: i64,
    pub registration_id: i64,
    pub notification_type: String,
    pub fire_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub sent: bool,
    pub sent_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
}

impl ScheduledNotification {
    pub fn kind(&self) -> Option<NotificationKind> {
        NotificationKind::parse(&self.notification_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewScheduledNotification {
    pub user_id: String,
    pub event_id: i64,
    pub registration_id: i64,
    pub kind: NotificationKind,
    pub fire_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

/// Unsent due row joined with the event fields used for the message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DueNotification {
    pub id: i64,
    pub user_id: String,
    pub event_id: i64,
    pub registration_id: i64,
    pub notification_type: String,
    pub fire_at: NaiveDateTime,
    pub title: String,
    pub weekday: String,
    pub start_time: String,
}

/// Per-user reminder preferences; every flag defaults to enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct NotificationPreferences {
    #[sqlx(rename = "notifications_enabled")]
    pub enabled: bool,
    #[sqlx(rename = "notify_24h_before")]
    pub notify_24h: bool,
    #[sqlx(rename = "notify_1h_before")]
    pub notify_1h: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_24h: true,
            notify_1h: true,
        }
    }
}

impl NotificationPreferences {
    /// Lead times the user wants reminders for
    pub fn wanted_kinds(&self) -> Vec<NotificationKind> {
        if !self.enabled {
            return Vec::new();
        }
        NotificationKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                NotificationKind::DayBefore => self.notify_24h,
                NotificationKind::HourBefore => self.notify_1h,
            })
            .collect()
    }
}

/// Browser push endpoint owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PushSubscription {
    pub id: i64,
    pub user_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// JSON payload delivered to the service worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub require_interaction: bool,
    pub data: PushPayloadData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayloadData {
    pub url: String,
}

impl PushPayload {
    /// Reminder for an upcoming event
    pub fn reminder(kind: NotificationKind, title: &str, weekday: &str, start_time: &str) -> Self {
        Self {
            title: format!("Event reminder: {}", title),
            body: format!(
                "Your event '{}' starts {} ({} at {})",
                title,
                kind.phrase(),
                weekday,
                start_time
            ),
            icon: "/static/favicon.ico".to_string(),
            badge: "/static/badge.png".to_string(),
            tag: "event-notification".to_string(),
            require_interaction: true,
            data: PushPayloadData {
                url: "/calendar".to_string(),
            },
        }
    }
}
