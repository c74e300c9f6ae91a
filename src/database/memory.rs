//! In-process store
//!
//! Implements every store contract over one mutex-guarded state so each
//! operation is atomic, matching the transactional PostgreSQL repositories.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use crate::database::store::{EventStore, NotificationStore, SettingsStore, TemplateStore, Whitelist};
use crate::models::*;
use crate::utils::errors::Result;
use crate::utils::helpers::normalize_login;

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    events: Vec<Event>,
    registrations: Vec<Registration>,
    whitelist: Vec<WhitelistEntry>,
    settings: HashMap<String, String>,
    preferences: HashMap<String, NotificationPreferences>,
    subscriptions: Vec<PushSubscription>,
    notifications: Vec<ScheduledNotification>,
    templates: Vec<WeekTemplate>,
    template_events: Vec<TemplateEvent>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn event(&self, event_id: i64) -> Option<&Event> {
        self.events.iter().find(|event| event.id == event_id)
    }

    fn counts(&self, event_id: i64) -> EventCounts {
        self.registrations
            .iter()
            .filter(|registration| registration.event_id == event_id)
            .fold(EventCounts::default(), |mut counts, registration| {
                counts.enrolled += 1;
                if registration.attended {
                    counts.attended += 1;
                }
                counts
            })
    }

    fn insert_event(&mut self, request: &CreateEventRequest) -> Event {
        let event = Event {
            id: self.allocate_id(),
            title: request.title.clone(),
            description: request.description.clone(),
            weekday: request.weekday.clone(),
            start_time: request.start_time.clone(),
            end_time: request.end_time.clone(),
            max_slots: request.max_slots,
            compensation: request.compensation,
            week: request.week,
            event_date: request.event_date,
            created_at: Utc::now(),
        };
        self.events.push(event.clone());
        event
    }

    /// Remove every event matching `filter` with its dependents
    fn remove_events_where(&mut self, filter: impl Fn(&Event) -> bool) -> Vec<i64> {
        let ids: Vec<i64> = self.events.iter().filter(|event| filter(event)).map(|event| event.id).collect();
        for id in &ids {
            self.remove_event(*id);
        }
        ids
    }

    fn remove_event(&mut self, event_id: i64) -> bool {
        let before = self.events.len();
        self.events.retain(|event| event.id != event_id);
        if self.events.len() == before {
            return false;
        }
        self.registrations.retain(|registration| registration.event_id != event_id);
        self.notifications.retain(|notification| notification.event_id != event_id);
        true
    }
}

/// Store keeping all state in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create_event(&self, request: &CreateEventRequest) -> Result<Event> {
        Ok(self.lock().insert_event(request))
    }

    async fn update_event(&self, event: &Event) -> Result<Option<Event>> {
        let mut state = self.lock();
        let Some(stored) = state.events.iter_mut().find(|stored| stored.id == event.id) else {
            return Ok(None);
        };
        let created_at = stored.created_at;
        *stored = Event { created_at, ..event.clone() };
        Ok(Some(stored.clone()))
    }

    async fn delete_event(&self, event_id: i64) -> Result<bool> {
        Ok(self.lock().remove_event(event_id))
    }

    async fn delete_week_events(&self, week: i32) -> Result<Vec<i64>> {
        Ok(self.lock().remove_events_where(|event| event.week == week))
    }

    async fn delete_day_events(&self, week: i32, weekday: &str) -> Result<Vec<i64>> {
        Ok(self
            .lock()
            .remove_events_where(|event| event.week == week && event.weekday == weekday))
    }

    async fn delete_all_events(&self) -> Result<Vec<i64>> {
        Ok(self.lock().remove_events_where(|_| true))
    }

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>> {
        Ok(self.lock().event(event_id).cloned())
    }

    async fn list_week_events(&self, week: i32) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .lock()
            .events
            .iter()
            .filter(|event| event.week == week)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.id);
        Ok(events)
    }

    async fn count_week_events(&self, week: i32) -> Result<i64> {
        Ok(self.lock().events.iter().filter(|event| event.week == week).count() as i64)
    }

    async fn list_registrations(&self, event_id: i64) -> Result<Vec<Registration>> {
        let mut registrations: Vec<Registration> = self
            .lock()
            .registrations
            .iter()
            .filter(|registration| registration.event_id == event_id)
            .cloned()
            .collect();
        registrations.sort_by_key(|registration| (registration.registered_at, registration.id));
        Ok(registrations)
    }

    async fn find_registration(&self, event_id: i64, participant: &str) -> Result<Option<Registration>> {
        Ok(self
            .lock()
            .registrations
            .iter()
            .find(|registration| registration.event_id == event_id && registration.participant == participant)
            .cloned())
    }

    async fn count_registrations(&self, event_id: i64) -> Result<EventCounts> {
        Ok(self.lock().counts(event_id))
    }

    async fn register(&self, event_id: i64, participant: &str, policy: &EnrollPolicy) -> Result<RegisterResult> {
        let mut state = self.lock();
        let Some((max_slots, week)) = state.event(event_id).map(|event| (event.max_slots, event.week)) else {
            return Ok(RegisterResult::EventMissing);
        };

        if let Some(limit) = policy.weekly_cap {
            let in_week = state
                .registrations
                .iter()
                .filter(|registration| registration.participant == participant)
                .filter(|registration| state.event(registration.event_id).map(|event| event.week) == Some(week))
                .count();
            if in_week >= limit as usize {
                return Ok(RegisterResult::WeeklyCapReached { limit });
            }
        }

        let duplicate = state
            .registrations
            .iter()
            .any(|registration| registration.event_id == event_id && registration.participant == participant);
        if duplicate {
            return Ok(RegisterResult::AlreadyRegistered);
        }

        if policy.enforce_capacity && state.counts(event_id).enrolled >= i64::from(max_slots) {
            return Ok(RegisterResult::EventFull { max_slots });
        }

        let registration = Registration {
            id: state.allocate_id(),
            event_id,
            participant: participant.to_string(),
            registered_at: Utc::now(),
            attended: true,
        };
        state.registrations.push(registration.clone());
        Ok(RegisterResult::Inserted(registration))
    }

    async fn remove_registration(&self, event_id: i64, participant: &str) -> Result<Option<Registration>> {
        let mut state = self.lock();
        let oldest = state
            .registrations
            .iter()
            .enumerate()
            .filter(|(_, registration)| registration.event_id == event_id && registration.participant == participant)
            .min_by_key(|(_, registration)| (registration.registered_at, registration.id))
            .map(|(index, _)| index);
        Ok(oldest.map(|index| state.registrations.remove(index)))
    }

    async fn set_attendance(&self, event_id: i64, participant: &str, attended: bool) -> Result<u64> {
        let mut state = self.lock();
        let mut updated = 0;
        for registration in state
            .registrations
            .iter_mut()
            .filter(|registration| registration.event_id == event_id && registration.participant == participant)
        {
            registration.attended = attended;
            updated += 1;
        }
        Ok(updated)
    }

    async fn list_participant_registrations(&self) -> Result<Vec<ParticipantRegistration>> {
        let state = self.lock();
        let mut rows: Vec<ParticipantRegistration> = state
            .registrations
            .iter()
            .filter_map(|registration| {
                state.event(registration.event_id).map(|event| ParticipantRegistration {
                    participant: registration.participant.clone(),
                    attended: registration.attended,
                    registered_at: registration.registered_at,
                    event_id: event.id,
                    title: event.title.clone(),
                    weekday: event.weekday.clone(),
                    start_time: event.start_time.clone(),
                    end_time: event.end_time.clone(),
                    compensation: event.compensation,
                    week: event.week,
                    event_date: event.event_date,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.participant
                .cmp(&b.participant)
                .then(a.registered_at.cmp(&b.registered_at))
        });
        Ok(rows)
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn save_template(&self, request: &SaveTemplateRequest) -> Result<WeekTemplate> {
        let mut state = self.lock();
        let template = WeekTemplate {
            id: state.allocate_id(),
            name: request.name.clone(),
            description: request.description.clone(),
            target_week: request.target_week,
            created_at: Utc::now(),
            event_count: request.events.len() as i64,
        };
        for event in &request.events {
            let blueprint = TemplateEvent {
                id: state.allocate_id(),
                template_id: template.id,
                title: event.title.clone(),
                description: event.description.clone(),
                weekday: event.weekday.clone(),
                event_date: event.event_date,
                start_time: event.start_time.clone(),
                end_time: event.end_time.clone(),
                max_slots: event.max_slots,
                compensation: event.compensation,
            };
            state.template_events.push(blueprint);
        }
        state.templates.push(template.clone());
        Ok(template)
    }

    async fn list_templates(&self) -> Result<Vec<WeekTemplate>> {
        let mut templates = self.lock().templates.clone();
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(templates)
    }

    async fn list_template_events(&self, template_id: i64) -> Result<Vec<TemplateEvent>> {
        Ok(self
            .lock()
            .template_events
            .iter()
            .filter(|event| event.template_id == template_id)
            .cloned()
            .collect())
    }

    async fn delete_template(&self, template_id: i64) -> Result<bool> {
        let mut state = self.lock();
        let before = state.templates.len();
        state.templates.retain(|template| template.id != template_id);
        if state.templates.len() == before {
            return Ok(false);
        }
        state.template_events.retain(|event| event.template_id != template_id);
        Ok(true)
    }

    async fn apply_template(&self, template_id: i64, overwrite: bool) -> Result<ApplyTemplateResult> {
        let mut state = self.lock();
        let Some(template) = state.templates.iter().find(|template| template.id == template_id).cloned() else {
            return Ok(ApplyTemplateResult::TemplateMissing);
        };
        let week = template.target_week;

        let existing = state.events.iter().filter(|event| event.week == week).count() as i64;
        if existing > 0 && !overwrite {
            return Ok(ApplyTemplateResult::WeekNotEmpty { existing });
        }
        let requests: Vec<CreateEventRequest> = state
            .template_events
            .iter()
            .filter(|event| event.template_id == template_id)
            .map(|event| event.to_request(week))
            .collect();
        if requests.is_empty() {
            return Ok(ApplyTemplateResult::TemplateEmpty);
        }

        let deleted = state.remove_events_where(|event| event.week == week);
        let created = requests.iter().map(|request| state.insert_event(request)).collect();
        Ok(ApplyTemplateResult::Applied { template, deleted, created })
    }
}

#[async_trait]
impl Whitelist for MemoryStore {
    async fn is_authorized(&self, login: &str) -> Result<bool> {
        let login = normalize_login(login);
        Ok(self.lock().whitelist.iter().any(|entry| entry.login == login))
    }

    async fn add(&self, login: &str) -> Result<bool> {
        let login = normalize_login(login);
        let mut state = self.lock();
        if state.whitelist.iter().any(|entry| entry.login == login) {
            return Ok(false);
        }
        let entry = WhitelistEntry {
            id: state.allocate_id(),
            login,
            added_at: Utc::now(),
        };
        state.whitelist.push(entry);
        Ok(true)
    }

    async fn remove(&self, login: &str) -> Result<bool> {
        let login = normalize_login(login);
        let mut state = self.lock();
        let before = state.whitelist.len();
        state.whitelist.retain(|entry| entry.login != login);
        Ok(state.whitelist.len() != before)
    }

    async fn list(&self) -> Result<Vec<WhitelistEntry>> {
        let mut entries = self.lock().whitelist.clone();
        entries.sort_by(|a, b| a.login.cmp(&b.login));
        Ok(entries)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().settings.get(key).cloned())
    }

    async fn get_all(&self) -> Result<HashMap<String, String>> {
        Ok(self.lock().settings.clone())
    }

    async fn insert_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut state = self.lock();
        if state.settings.contains_key(key) {
            return Ok(false);
        }
        state.settings.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn compare_and_set(&self, key: &str, expected: &str, new: &str) -> Result<bool> {
        let mut state = self.lock();
        match state.settings.get_mut(key) {
            Some(current) if current == expected => {
                *current = new.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn get_preferences(&self, user_id: &str) -> Result<Option<NotificationPreferences>> {
        Ok(self.lock().preferences.get(user_id).copied())
    }

    async fn set_preferences(&self, user_id: &str, preferences: &NotificationPreferences) -> Result<()> {
        self.lock().preferences.insert(user_id.to_string(), *preferences);
        Ok(())
    }

    async fn upsert_subscription(&self, user_id: &str, subscription: &NewPushSubscription) -> Result<PushSubscription> {
        let mut state = self.lock();
        if let Some(existing) = state
            .subscriptions
            .iter_mut()
            .find(|existing| existing.endpoint == subscription.endpoint)
        {
            existing.user_id = user_id.to_string();
            existing.p256dh = subscription.p256dh.clone();
            existing.auth = subscription.auth.clone();
            return Ok(existing.clone());
        }
        let stored = PushSubscription {
            id: state.allocate_id(),
            user_id: user_id.to_string(),
            endpoint: subscription.endpoint.clone(),
            p256dh: subscription.p256dh.clone(),
            auth: subscription.auth.clone(),
            created_at: Utc::now(),
        };
        state.subscriptions.push(stored.clone());
        Ok(stored)
    }

    async fn delete_subscription_by_endpoint(&self, endpoint: &str) -> Result<bool> {
        let mut state = self.lock();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|subscription| subscription.endpoint != endpoint);
        Ok(state.subscriptions.len() != before)
    }

    async fn delete_subscription(&self, subscription_id: i64) -> Result<bool> {
        let mut state = self.lock();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|subscription| subscription.id != subscription_id);
        Ok(state.subscriptions.len() != before)
    }

    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<PushSubscription>> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .filter(|subscription| subscription.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, notification: &NewScheduledNotification) -> Result<ScheduledNotification> {
        let mut state = self.lock();
        let stored = ScheduledNotification {
            id: state.allocate_id(),
            user_id: notification.user_id.clone(),
            event_id: notification.event_id,
            registration_id: notification.registration_id,
            notification_type: notification.kind.as_str().to_string(),
            fire_at: notification.fire_at,
            created_at: notification.created_at,
            sent: false,
            sent_at: None,
            error_message: None,
        };
        state.notifications.push(stored.clone());
        Ok(stored)
    }

    async fn list_for_registration(&self, registration_id: i64) -> Result<Vec<ScheduledNotification>> {
        let mut rows: Vec<ScheduledNotification> = self
            .lock()
            .notifications
            .iter()
            .filter(|notification| notification.registration_id == registration_id)
            .cloned()
            .collect();
        rows.sort_by_key(|notification| (notification.fire_at, notification.id));
        Ok(rows)
    }

    async fn delete_unsent_for_registration(&self, registration_id: i64) -> Result<u64> {
        let mut state = self.lock();
        let before = state.notifications.len();
        state
            .notifications
            .retain(|notification| notification.registration_id != registration_id || notification.sent);
        Ok((before - state.notifications.len()) as u64)
    }

    async fn due_notifications(&self, now: NaiveDateTime) -> Result<Vec<DueNotification>> {
        let state = self.lock();
        let mut due: Vec<DueNotification> = state
            .notifications
            .iter()
            .filter(|notification| !notification.sent && notification.fire_at <= now)
            .filter_map(|notification| {
                state.event(notification.event_id).map(|event| DueNotification {
                    id: notification.id,
                    user_id: notification.user_id.clone(),
                    event_id: notification.event_id,
                    registration_id: notification.registration_id,
                    notification_type: notification.notification_type.clone(),
                    fire_at: notification.fire_at,
                    title: event.title.clone(),
                    weekday: event.weekday.clone(),
                    start_time: event.start_time.clone(),
                })
            })
            .collect();
        due.sort_by_key(|notification| (notification.fire_at, notification.id));
        Ok(due)
    }

    async fn mark_sent(&self, notification_id: i64, sent_at: NaiveDateTime) -> Result<()> {
        let mut state = self.lock();
        if let Some(notification) = state.notifications.iter_mut().find(|n| n.id == notification_id) {
            notification.sent = true;
            notification.sent_at = Some(sent_at);
            notification.error_message = None;
        }
        Ok(())
    }

    async fn record_error(&self, notification_id: i64, message: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(notification) = state.notifications.iter_mut().find(|n| n.id == notification_id) {
            notification.error_message = Some(message.to_string());
        }
        Ok(())
    }

    async fn purge_sent_before(&self, cutoff: NaiveDateTime) -> Result<u64> {
        let mut state = self.lock();
        let before = state.notifications.len();
        state.notifications.retain(|notification| {
            !(notification.sent && notification.sent_at.is_some_and(|sent_at| sent_at < cutoff))
        });
        Ok((before - state.notifications.len()) as u64)
    }
}
