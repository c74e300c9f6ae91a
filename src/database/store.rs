//! Store contracts
//!
//! Services talk to persistence only through these traits. PostgreSQL
//! repositories and the in-process [`MemoryStore`](super::memory::MemoryStore)
//! implement them with the same semantics.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use crate::database::memory::MemoryStore;
use crate::models::*;
use crate::utils::errors::Result;

/// Events, registrations and the atomic enrollment primitives
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_event(&self, request: &CreateEventRequest) -> Result<Event>;

    /// Persist every mutable field of `event`; `None` when the id is unknown
    async fn update_event(&self, event: &Event) -> Result<Option<Event>>;

    /// Delete an event and, by cascade, its registrations and notifications
    async fn delete_event(&self, event_id: i64) -> Result<bool>;

    /// Ids of the deleted events
    async fn delete_week_events(&self, week: i32) -> Result<Vec<i64>>;

    /// `weekday` is the canonical day name
    async fn delete_day_events(&self, week: i32, weekday: &str) -> Result<Vec<i64>>;

    async fn delete_all_events(&self) -> Result<Vec<i64>>;

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>>;

    async fn list_week_events(&self, week: i32) -> Result<Vec<Event>>;

    async fn count_week_events(&self, week: i32) -> Result<i64>;

    /// Registrations of one event, oldest first
    async fn list_registrations(&self, event_id: i64) -> Result<Vec<Registration>>;

    async fn find_registration(&self, event_id: i64, participant: &str) -> Result<Option<Registration>>;

    async fn count_registrations(&self, event_id: i64) -> Result<EventCounts>;

    /// Weekly cap, duplicate, capacity check and insert as one atomic unit
    async fn register(&self, event_id: i64, participant: &str, policy: &EnrollPolicy) -> Result<RegisterResult>;

    /// Remove at most one matching registration, atomically per event
    async fn remove_registration(&self, event_id: i64, participant: &str) -> Result<Option<Registration>>;

    /// Number of rows updated (0 when not registered)
    async fn set_attendance(&self, event_id: i64, participant: &str, attended: bool) -> Result<u64>;

    /// Every registration joined with its event, ordered by participant
    async fn list_participant_registrations(&self) -> Result<Vec<ParticipantRegistration>>;
}

/// Week templates and their event blueprints
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn save_template(&self, request: &SaveTemplateRequest) -> Result<WeekTemplate>;

    /// Newest first
    async fn list_templates(&self) -> Result<Vec<WeekTemplate>>;

    async fn list_template_events(&self, template_id: i64) -> Result<Vec<TemplateEvent>>;

    /// Blueprints go with the template
    async fn delete_template(&self, template_id: i64) -> Result<bool>;

    /// Week check, optional wipe and event creation as one atomic unit
    async fn apply_template(&self, template_id: i64, overwrite: bool) -> Result<ApplyTemplateResult>;
}

/// Authorization whitelist for self-service enrollment
#[async_trait]
pub trait Whitelist: Send + Sync {
    async fn is_authorized(&self, login: &str) -> Result<bool>;

    /// `false` when the login was already present
    async fn add(&self, login: &str) -> Result<bool>;

    async fn remove(&self, login: &str) -> Result<bool>;

    async fn list(&self) -> Result<Vec<WhitelistEntry>>;
}

/// String key/value settings rows
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn get_all(&self) -> Result<HashMap<String, String>>;

    async fn insert_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write `new` only if the current value equals `expected`
    async fn compare_and_set(&self, key: &str, expected: &str, new: &str) -> Result<bool>;
}

/// Preferences, push subscriptions and scheduled notifications
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn get_preferences(&self, user_id: &str) -> Result<Option<NotificationPreferences>>;

    async fn set_preferences(&self, user_id: &str, preferences: &NotificationPreferences) -> Result<()>;

    /// Insert, or re-key and re-own an existing endpoint
    async fn upsert_subscription(&self, user_id: &str, subscription: &NewPushSubscription) -> Result<PushSubscription>;

    async fn delete_subscription_by_endpoint(&self, endpoint: &str) -> Result<bool>;

    async fn delete_subscription(&self, subscription_id: i64) -> Result<bool>;

    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<PushSubscription>>;

    async fn insert_notification(&self, notification: &NewScheduledNotification) -> Result<ScheduledNotification>;

    async fn list_for_registration(&self, registration_id: i64) -> Result<Vec<ScheduledNotification>>;

    /// Delete unsent rows only; sent rows stay as history
    async fn delete_unsent_for_registration(&self, registration_id: i64) -> Result<u64>;

    /// Unsent rows with `fire_at <= now`, oldest first
    async fn due_notifications(&self, now: NaiveDateTime) -> Result<Vec<DueNotification>>;

    async fn mark_sent(&self, notification_id: i64, sent_at: NaiveDateTime) -> Result<()>;

    async fn record_error(&self, notification_id: i64, message: &str) -> Result<()>;

    /// Delete sent rows sent before `cutoff`
    async fn purge_sent_before(&self, cutoff: NaiveDateTime) -> Result<u64>;
}

/// Handles to every store, shared by the services
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub whitelist: Arc<dyn Whitelist>,
    pub settings: Arc<dyn SettingsStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub templates: Arc<dyn TemplateStore>,
}

impl Stores {
    /// All stores backed by one fresh in-process store
    pub fn memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    /// Every handle pointing at the given in-process store
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            events: store.clone(),
            whitelist: store.clone(),
            settings: store.clone(),
            notifications: store.clone(),
            templates: store,
        }
    }
}
