//! Week template model
//!
//! A template is a named set of event blueprints for one pool week. Applying
//! it creates real events in that week.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use crate::models::event::{CreateEventRequest, Event, MAX_WEEK};
use crate::utils::errors::{ShiftPoolError, Result};

/// Template header with the number of blueprints it holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WeekTemplate {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub target_week: i32,
    pub created_at: DateTime<Utc>,
    pub event_count: i64,
}

/// One event blueprint of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TemplateEvent {
    pub id: i64,
    pub template_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub weekday: String,
    pub event_date: Option<NaiveDate>,
    pub start_time: String,
    pub end_time: String,
    pub max_slots: i32,
    pub compensation: i32,
}

impl TemplateEvent {
    /// Event creation request for the given week
    pub fn to_request(&self, week: i32) -> CreateEventRequest {
        CreateEventRequest {
            title: self.title.clone(),
            description: self.description.clone(),
            weekday: self.weekday.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
            max_slots: self.max_slots,
            compensation: self.compensation,
            week,
            event_date: self.event_date,
        }
    }
}

/// New template; the `week` of each blueprint is replaced by `target_week`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveTemplateRequest {
    pub name: String,
    pub description: Option<String>,
    pub target_week: i32,
    pub events: Vec<CreateEventRequest>,
}

impl SaveTemplateRequest {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ShiftPoolError::InvalidInput("Template name is required".to_string()));
        }
        if !(1..=MAX_WEEK).contains(&self.target_week) {
            return Err(ShiftPoolError::InvalidInput(format!(
                "Week must be between 1 and {}, got {}",
                MAX_WEEK, self.target_week
            )));
        }
        if self.events.is_empty() {
            return Err(ShiftPoolError::InvalidInput("A template needs at least one event".to_string()));
        }
        for event in &self.events {
            CreateEventRequest { week: self.target_week, ..event.clone() }.validate()?;
        }
        Ok(())
    }

    pub fn normalized(self) -> Self {
        let target_week = self.target_week;
        Self {
            name: self.name.trim().to_string(),
            description: self.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            target_week,
            events: self
                .events
                .into_iter()
                .map(|event| CreateEventRequest { week: target_week, ..event }.normalized())
                .collect(),
        }
    }
}

/// Result of applying a template, decided atomically by the store
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyTemplateResult {
    Applied {
        template: WeekTemplate,
        /// Ids of the week's previous events, removed by an overwrite
        deleted: Vec<i64>,
        created: Vec<Event>,
    },
    /// The week already has events and no overwrite was requested
    WeekNotEmpty { existing: i64 },
    TemplateEmpty,
    TemplateMissing,
}
