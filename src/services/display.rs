//! Display week auto-advance
//!
//! The public display week ratchets forward one step at a time once every
//! event of the current display week is over. Each step is a compare-and-set
//! on the stored value, so concurrent viewers advance it at most once.

use std::sync::Arc;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use crate::database::EventStore;
use crate::models::*;
use crate::services::broadcast::{Broadcaster, TOPIC_DISPLAY_WEEK};
use crate::services::ledger::RegistrationLedger;
use crate::services::temporal::{concrete_date, has_passed, resolve_week_dates, Clock};
use crate::utils::errors::Result;
use crate::utils::helpers::weekday_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DisplayTransition {
    Unchanged { week: i32 },
    Advanced { from: i32, to: i32 },
}

impl DisplayTransition {
    pub fn week(&self) -> i32 {
        match self {
            DisplayTransition::Unchanged { week } => *week,
            DisplayTransition::Advanced { to, .. } => *to,
        }
    }
}

/// What a public viewer sees for the display week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayView {
    pub display_week: i32,
    pub active_week: i32,
    pub day_dates: Vec<DayDate>,
    pub events: Vec<EventSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayDate {
    pub weekday: String,
    pub date: NaiveDate,
}

#[derive(Clone)]
pub struct DisplayAdvancer {
    events: Arc<dyn EventStore>,
    ledger: RegistrationLedger,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
}

impl DisplayAdvancer {
    pub fn new(
        events: Arc<dyn EventStore>,
        ledger: RegistrationLedger,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            ledger,
            broadcaster,
            clock,
        }
    }

    /// Advance the display week by at most one step
    pub async fn evaluate(&self) -> Result<DisplayTransition> {
        let settings = self.ledger.settings().load().await?;
        let week = settings.display_week.clamp(1, MAX_WEEK);
        if week >= MAX_WEEK {
            return Ok(DisplayTransition::Unchanged { week });
        }

        let current = self.events.list_week_events(week).await?;
        if !current.is_empty() {
            let now = self.clock.now();
            let pool_start = settings.pool_start.as_deref();
            // Unknown dates never count as passed and hold the week in place
            let all_passed = current
                .iter()
                .all(|event| has_passed(concrete_date(event, pool_start), &event.end_time, now));
            if !all_passed {
                return Ok(DisplayTransition::Unchanged { week });
            }
            if self.events.count_week_events(week + 1).await? == 0 {
                debug!(week = week, "Next week has no events yet, display week held");
                return Ok(DisplayTransition::Unchanged { week });
            }
        }

        let next = week + 1;
        if !self.ledger.settings().compare_and_set_display_week(week, next).await? {
            // Someone else moved it first
            let settled = self.ledger.settings().load().await?.display_week;
            return Ok(DisplayTransition::Unchanged { week: settled });
        }

        info!(from = week, to = next, "Display week advanced");
        self.broadcaster
            .publish(TOPIC_DISPLAY_WEEK, json!({ "from": week, "to": next }))
            .await;
        Ok(DisplayTransition::Advanced { from: week, to: next })
    }

    /// Evaluate, then assemble the view of the resulting display week
    pub async fn render(&self) -> Result<DisplayView> {
        let transition = self.evaluate().await?;
        let settings = self.ledger.settings().load().await?;
        let display_week = transition.week();

        let day_dates = resolve_week_dates(settings.pool_start.as_deref(), display_week)
            .iter()
            .map(|(day, date)| DayDate {
                weekday: weekday_name(*day).to_string(),
                date: *date,
            })
            .collect();

        Ok(DisplayView {
            display_week,
            active_week: settings.active_week,
            day_dates,
            events: self.ledger.week_view(display_week).await?,
        })
    }
}
