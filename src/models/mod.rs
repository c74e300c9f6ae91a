//! Data models module
//!
//! This module contains all data structures used throughout the application

pub mod event;
pub mod registration;
pub mod pool;
pub mod notification;
pub mod template;

// Re-export commonly used models
pub use event::{Event, EventSnapshot, EventAction, CreateEventRequest, UpdateEventRequest, MAX_WEEK};
pub use registration::{Registration, EventCounts, EnrollPolicy, RegisterResult, ParticipantRegistration, ParticipantSummary, WhitelistEntry};
pub use pool::PoolSettings;
pub use template::{WeekTemplate, TemplateEvent, SaveTemplateRequest, ApplyTemplateResult};
pub use notification::{
    NotificationKind, ScheduledNotification, NewScheduledNotification, DueNotification,
    NotificationPreferences, PushSubscription, NewPushSubscription, PushPayload,
};
