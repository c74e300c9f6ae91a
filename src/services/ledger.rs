//! Registration ledger
//!
//! Owns enrollment and attendance state per event. Policy checks run before
//! any mutation; the capacity check and insert are delegated to the store as
//! one atomic unit. Every successful mutation fans out to the broadcaster and
//! to the notification scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, info, warn};
use crate::database::{EventStore, Stores, TemplateStore, Whitelist};
use crate::models::*;
use crate::services::broadcast::{event_deleted_payload, event_update_payload, Broadcaster, TOPIC_EVENT_UPDATE};
use crate::services::notifications::NotificationScheduler;
use crate::services::settings::SettingsService;
use crate::services::temporal::{concrete_date, has_passed, Clock, TemporalPolicy};
use crate::utils::errors::{ShiftPoolError, Result};
use crate::utils::helpers::{normalize_login, parse_time_of_day, parse_weekday, slot_hours, weekday_name};
use crate::utils::logging::{log_admin_action, log_event_action};

/// Why a participant action was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("You are not authorized to enroll in events")]
    NotWhitelisted,

    #[error("The event has already taken place")]
    EventPassed,

    #[error("The event date is not known yet")]
    DateUnknown,

    #[error("You reached the limit of {limit} events for this week")]
    WeeklyCapReached { limit: u32 },

    #[error("The event is full")]
    EventFull,

    #[error("You are already enrolled in this event")]
    AlreadyEnrolled,

    #[error("You are not enrolled in this event")]
    NotEnrolled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollOutcome {
    Enrolled(Registration),
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnenrollOutcome {
    Unenrolled(Registration),
    Rejected(RejectReason),
}

#[derive(Clone)]
pub struct RegistrationLedger {
    events: Arc<dyn EventStore>,
    whitelist: Arc<dyn Whitelist>,
    templates: Arc<dyn TemplateStore>,
    settings: SettingsService,
    notifications: NotificationScheduler,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    policy: TemporalPolicy,
}

impl RegistrationLedger {
    pub fn new(
        stores: &Stores,
        settings: SettingsService,
        notifications: NotificationScheduler,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        policy: TemporalPolicy,
    ) -> Self {
        Self {
            events: stores.events.clone(),
            whitelist: stores.whitelist.clone(),
            templates: stores.templates.clone(),
            settings,
            notifications,
            broadcaster,
            clock,
            policy,
        }
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    pub fn notifications(&self) -> &NotificationScheduler {
        &self.notifications
    }

    /// Self-service enrollment
    pub async fn enroll(&self, event_id: i64, participant: &str) -> Result<EnrollOutcome> {
        let participant = normalize_login(participant);
        if !self.whitelist.is_authorized(&participant).await? {
            return Ok(EnrollOutcome::Rejected(RejectReason::NotWhitelisted));
        }

        let event = self.require_event(event_id).await?;
        let settings = self.settings.load().await?;
        let date = concrete_date(&event, settings.pool_start.as_deref());
        if let Some(reason) = self.temporal_rejection(&event, date) {
            return Ok(EnrollOutcome::Rejected(reason));
        }

        let policy = EnrollPolicy::self_service(settings.max_events_per_user);
        let result = self.events.register(event_id, &participant, &policy).await?;
        self.finish_enroll(&event, date, result).await
    }

    /// Admin override: capacity and weekly cap are skipped, uniqueness is not
    pub async fn admin_add_participant(&self, event_id: i64, login: &str) -> Result<EnrollOutcome> {
        let login = normalize_login(login);
        if login.is_empty() {
            return Err(ShiftPoolError::InvalidInput("Participant login is required".to_string()));
        }

        let event = self.require_event(event_id).await?;
        let settings = self.settings.load().await?;
        let date = concrete_date(&event, settings.pool_start.as_deref());

        let result = self.events.register(event_id, &login, &EnrollPolicy::admin_override()).await?;
        let outcome = self.finish_enroll(&event, date, result).await?;
        if matches!(outcome, EnrollOutcome::Enrolled(_)) {
            log_admin_action("add_participant", Some(&login), Some(&format!("event {}", event_id)));
        }
        Ok(outcome)
    }

    async fn finish_enroll(&self, event: &Event, date: Option<NaiveDate>, result: RegisterResult) -> Result<EnrollOutcome> {
        let registration = match result {
            RegisterResult::Inserted(registration) => registration,
            RegisterResult::AlreadyRegistered => return Ok(EnrollOutcome::Rejected(RejectReason::AlreadyEnrolled)),
            RegisterResult::EventFull { .. } => return Ok(EnrollOutcome::Rejected(RejectReason::EventFull)),
            RegisterResult::WeeklyCapReached { limit } => {
                return Ok(EnrollOutcome::Rejected(RejectReason::WeeklyCapReached { limit }))
            }
            RegisterResult::EventMissing => return Err(ShiftPoolError::EventNotFound { event_id: event.id }),
        };

        log_event_action(event.id, "enroll", &registration.participant, None);

        // Reminders need a concrete start instant
        match date.and_then(|date| event.start_on(date)) {
            Some(start) => {
                if let Err(e) = self
                    .notifications
                    .schedule_for_registration(&registration.participant, event.id, registration.id, start)
                    .await
                {
                    warn!(event_id = event.id, registration_id = registration.id, error = %e, "Failed to schedule notifications");
                }
            }
            None => debug!(event_id = event.id, "Event start unknown, no reminders scheduled"),
        }

        self.publish_event(EventAction::Update, event.id).await;
        Ok(EnrollOutcome::Enrolled(registration))
    }

    /// Remove one registration; only admins may act on passed events
    pub async fn unenroll(&self, event_id: i64, participant: &str, requested_by_admin: bool) -> Result<UnenrollOutcome> {
        let participant = normalize_login(participant);
        let event = self.require_event(event_id).await?;

        if !requested_by_admin {
            let settings = self.settings.load().await?;
            let date = concrete_date(&event, settings.pool_start.as_deref());
            if let Some(reason) = self.temporal_rejection(&event, date) {
                return Ok(UnenrollOutcome::Rejected(reason));
            }
        }

        let Some(registration) = self.events.remove_registration(event_id, &participant).await? else {
            return Ok(UnenrollOutcome::Rejected(RejectReason::NotEnrolled));
        };

        if let Err(e) = self.notifications.cancel_for_registration(registration.id).await {
            warn!(registration_id = registration.id, error = %e, "Failed to cancel notifications");
        }

        if requested_by_admin {
            log_admin_action("remove_participant", Some(&participant), Some(&format!("event {}", event_id)));
        } else {
            log_event_action(event_id, "unenroll", &participant, None);
        }
        self.publish_event(EventAction::Update, event_id).await;
        Ok(UnenrollOutcome::Unenrolled(registration))
    }

    /// Flip the attendance flag; slot occupancy is untouched
    pub async fn set_attendance(&self, event_id: i64, participant: &str, attended: bool) -> Result<EventCounts> {
        let participant = normalize_login(participant);
        self.require_event(event_id).await?;

        if self.events.set_attendance(event_id, &participant, attended).await? == 0 {
            return Err(ShiftPoolError::RegistrationNotFound { event_id, participant });
        }

        let counts = self.events.count_registrations(event_id).await?;
        log_admin_action(
            if attended { "mark_present" } else { "mark_absent" },
            Some(&participant),
            Some(&format!("event {}", event_id)),
        );
        self.publish_event(EventAction::Update, event_id).await;
        Ok(counts)
    }

    pub async fn create_event(&self, request: CreateEventRequest) -> Result<Event> {
        request.validate()?;
        let event = self.events.create_event(&request.normalized()).await?;
        log_admin_action("create_event", Some(&event.title), Some(&format!("event {} week {}", event.id, event.week)));
        self.publish_event(EventAction::Create, event.id).await;
        Ok(event)
    }

    /// Pending reminders follow the event when its start instant moves
    pub async fn update_event(&self, event_id: i64, request: &UpdateEventRequest) -> Result<Event> {
        let current = self.require_event(event_id).await?;
        let merged = request.apply_to(&current)?;
        let settings = self.settings.load().await?;
        let updated = self
            .events
            .update_event(&merged)
            .await?
            .ok_or(ShiftPoolError::EventNotFound { event_id })?;
        log_admin_action("update_event", Some(&updated.title), Some(&format!("event {}", event_id)));

        let pool_start = settings.pool_start.as_deref();
        let previous_start = concrete_date(&current, pool_start).and_then(|date| current.start_on(date));
        let new_start = concrete_date(&updated, pool_start).and_then(|date| updated.start_on(date));
        if previous_start != new_start {
            self.reschedule_reminders(&updated, new_start).await?;
        }

        self.publish_event(EventAction::Update, event_id).await;
        Ok(updated)
    }

    async fn reschedule_reminders(&self, event: &Event, start: Option<NaiveDateTime>) -> Result<()> {
        let registrations = self.events.list_registrations(event.id).await?;
        for registration in &registrations {
            if let Err(e) = self.notifications.cancel_for_registration(registration.id).await {
                warn!(registration_id = registration.id, error = %e, "Failed to cancel notifications");
                continue;
            }
            let Some(start) = start else { continue };
            if let Err(e) = self
                .notifications
                .schedule_for_registration(&registration.participant, event.id, registration.id, start)
                .await
            {
                warn!(event_id = event.id, registration_id = registration.id, error = %e, "Failed to schedule notifications");
            }
        }
        info!(event_id = event.id, registrations = registrations.len(), "Rescheduled reminders after event move");
        Ok(())
    }

    /// Registrations and scheduled notifications go with the event
    pub async fn delete_event(&self, event_id: i64) -> Result<()> {
        if !self.events.delete_event(event_id).await? {
            return Err(ShiftPoolError::EventNotFound { event_id });
        }
        log_admin_action("delete_event", None, Some(&format!("event {}", event_id)));
        self.broadcaster
            .publish(TOPIC_EVENT_UPDATE, event_deleted_payload(event_id))
            .await;
        Ok(())
    }

    pub async fn delete_week_events(&self, week: i32) -> Result<u64> {
        check_week(week)?;
        let ids = self.events.delete_week_events(week).await?;
        log_admin_action("delete_week_events", Some(&week.to_string()), Some(&format!("{} events", ids.len())));
        self.publish_deleted(&ids).await;
        Ok(ids.len() as u64)
    }

    pub async fn delete_day_events(&self, week: i32, weekday: &str) -> Result<u64> {
        check_week(week)?;
        let day = parse_weekday(weekday)
            .ok_or_else(|| ShiftPoolError::InvalidInput(format!("Unknown weekday: {}", weekday)))?;
        let ids = self.events.delete_day_events(week, weekday_name(day)).await?;
        log_admin_action(
            "delete_day_events",
            Some(&format!("{} {}", week, weekday_name(day))),
            Some(&format!("{} events", ids.len())),
        );
        self.publish_deleted(&ids).await;
        Ok(ids.len() as u64)
    }

    pub async fn delete_all_events(&self) -> Result<u64> {
        let ids = self.events.delete_all_events().await?;
        log_admin_action("delete_all_events", None, Some(&format!("{} events", ids.len())));
        self.publish_deleted(&ids).await;
        Ok(ids.len() as u64)
    }

    pub async fn save_template(&self, request: SaveTemplateRequest) -> Result<WeekTemplate> {
        request.validate()?;
        let template = self.templates.save_template(&request.normalized()).await?;
        log_admin_action(
            "save_template",
            Some(&template.name),
            Some(&format!("template {} week {} ({} events)", template.id, template.target_week, template.event_count)),
        );
        Ok(template)
    }

    pub async fn templates(&self) -> Result<Vec<WeekTemplate>> {
        self.templates.list_templates().await
    }

    pub async fn template_events(&self, template_id: i64) -> Result<Vec<TemplateEvent>> {
        self.templates.list_template_events(template_id).await
    }

    pub async fn delete_template(&self, template_id: i64) -> Result<()> {
        if !self.templates.delete_template(template_id).await? {
            return Err(ShiftPoolError::TemplateNotFound { template_id });
        }
        log_admin_action("delete_template", None, Some(&format!("template {}", template_id)));
        Ok(())
    }

    /// Create the template's events in its target week; `overwrite` first
    /// removes the week's events with their registrations
    pub async fn apply_template(&self, template_id: i64, overwrite: bool) -> Result<ApplyTemplateResult> {
        let result = self.templates.apply_template(template_id, overwrite).await?;
        match &result {
            ApplyTemplateResult::Applied { template, deleted, created } => {
                log_admin_action(
                    "apply_template",
                    Some(&template.name),
                    Some(&format!(
                        "week {}: {} deleted, {} created, overwrite {}",
                        template.target_week,
                        deleted.len(),
                        created.len(),
                        overwrite
                    )),
                );
                self.publish_deleted(deleted).await;
                for event in created {
                    self.publish_event(EventAction::Create, event.id).await;
                }
            }
            ApplyTemplateResult::TemplateMissing => return Err(ShiftPoolError::TemplateNotFound { template_id }),
            ApplyTemplateResult::WeekNotEmpty { existing } => {
                debug!(template_id = template_id, existing = *existing, "Template not applied, week has events");
            }
            ApplyTemplateResult::TemplateEmpty => debug!(template_id = template_id, "Template has no events"),
        }
        Ok(result)
    }

    /// The participant's registration, if any
    pub async fn registration(&self, event_id: i64, participant: &str) -> Result<Option<Registration>> {
        self.events.find_registration(event_id, &normalize_login(participant)).await
    }

    pub async fn snapshot(&self, event_id: i64) -> Result<EventSnapshot> {
        let event = self.require_event(event_id).await?;
        let settings = self.settings.load().await?;
        self.build_snapshot(event, settings.pool_start.as_deref()).await
    }

    /// Snapshots of a week ordered by weekday, then start time
    pub async fn week_view(&self, week: i32) -> Result<Vec<EventSnapshot>> {
        let settings = self.settings.load().await?;
        let mut events = self.events.list_week_events(week).await?;
        events.sort_by_key(|event| {
            (
                parse_weekday(&event.weekday).map_or(7, |day| day.num_days_from_monday()),
                parse_time_of_day(&event.start_time),
                event.id,
            )
        });

        let mut snapshots = Vec::with_capacity(events.len());
        for event in events {
            snapshots.push(self.build_snapshot(event, settings.pool_start.as_deref()).await?);
        }
        Ok(snapshots)
    }

    /// Attended events, hours and compensation per participant
    pub async fn participant_summaries(&self) -> Result<Vec<ParticipantSummary>> {
        let rows = self.events.list_participant_registrations().await?;
        let mut by_participant: BTreeMap<String, ParticipantSummary> = BTreeMap::new();

        for row in rows {
            let summary = by_participant
                .entry(row.participant.clone())
                .or_insert_with(|| ParticipantSummary {
                    participant: row.participant.clone(),
                    attended_events: 0,
                    total_hours: 0.0,
                    total_compensation: 0,
                    registrations: Vec::new(),
                });
            if row.attended {
                summary.attended_events += 1;
                summary.total_hours += slot_hours(&row.start_time, &row.end_time).unwrap_or(0.0);
                summary.total_compensation += i64::from(row.compensation);
            }
            summary.registrations.push(row);
        }

        Ok(by_participant.into_values().collect())
    }

    pub async fn whitelist_add(&self, login: &str) -> Result<bool> {
        let login = normalize_login(login);
        if login.is_empty() {
            return Err(ShiftPoolError::InvalidInput("Login is required".to_string()));
        }
        let added = self.whitelist.add(&login).await?;
        if added {
            log_admin_action("whitelist_add", Some(&login), None);
        }
        Ok(added)
    }

    pub async fn whitelist_remove(&self, login: &str) -> Result<bool> {
        let login = normalize_login(login);
        let removed = self.whitelist.remove(&login).await?;
        if removed {
            log_admin_action("whitelist_remove", Some(&login), None);
        }
        Ok(removed)
    }

    pub async fn whitelist(&self) -> Result<Vec<WhitelistEntry>> {
        self.whitelist.list().await
    }

    async fn require_event(&self, event_id: i64) -> Result<Event> {
        self.events
            .find_event(event_id)
            .await?
            .ok_or(ShiftPoolError::EventNotFound { event_id })
    }

    fn temporal_rejection(&self, event: &Event, date: Option<NaiveDate>) -> Option<RejectReason> {
        if date.is_none() && self.policy == TemporalPolicy::FailClosed {
            return Some(RejectReason::DateUnknown);
        }
        has_passed(date, &event.end_time, self.clock.now()).then_some(RejectReason::EventPassed)
    }

    async fn build_snapshot(&self, event: Event, pool_start: Option<&str>) -> Result<EventSnapshot> {
        let registrations = self.events.list_registrations(event.id).await?;
        let date = concrete_date(&event, pool_start);
        let enrolled = registrations.len() as i64;
        let participants: Vec<String> = registrations
            .iter()
            .filter(|registration| registration.attended)
            .map(|registration| registration.participant.clone())
            .collect();

        Ok(EventSnapshot {
            is_passed: has_passed(date, &event.end_time, self.clock.now()),
            concrete_date: date,
            enrolled,
            visible_registered: participants.len() as i64,
            available_slots: (i64::from(event.max_slots) - enrolled).max(0),
            participants,
            id: event.id,
            title: event.title,
            description: event.description,
            weekday: event.weekday,
            start_time: event.start_time,
            end_time: event.end_time,
            max_slots: event.max_slots,
            compensation: event.compensation,
            week: event.week,
        })
    }

    async fn publish_deleted(&self, ids: &[i64]) {
        for &id in ids {
            self.broadcaster.publish(TOPIC_EVENT_UPDATE, event_deleted_payload(id)).await;
        }
    }

    /// Fire-and-forget snapshot broadcast
    async fn publish_event(&self, action: EventAction, event_id: i64) {
        match self.snapshot(event_id).await {
            Ok(snapshot) => {
                self.broadcaster
                    .publish(TOPIC_EVENT_UPDATE, event_update_payload(action, &snapshot))
                    .await;
            }
            Err(e) => info!(event_id = event_id, error = %e, "Skipping event broadcast"),
        }
    }
}

fn check_week(week: i32) -> Result<()> {
    if !(1..=MAX_WEEK).contains(&week) {
        return Err(ShiftPoolError::InvalidInput(format!("Week must be between 1 and {}, got {}", MAX_WEEK, week)));
    }
    Ok(())
}
