//! Event repository implementation

use async_trait::async_trait;
use sqlx::PgPool;
use crate::database::store::EventStore;
use crate::models::*;
use crate::utils::errors::Result;

pub(crate) const EVENT_COLUMNS: &str =
    "id, title, description, weekday, start_time, end_time, max_slots, compensation, week, event_date, created_at";

const REGISTRATION_COLUMNS: &str = "id, event_id, participant, registered_at, attended";

#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for EventRepository {
    /// Create a new event
    async fn create_event(&self, request: &CreateEventRequest) -> Result<Event> {
        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (title, description, weekday, start_time, end_time, max_slots, compensation, week, event_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.weekday)
        .bind(&request.start_time)
        .bind(&request.end_time)
        .bind(request.max_slots)
        .bind(request.compensation)
        .bind(request.week)
        .bind(request.event_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(event)
    }

    async fn update_event(&self, event: &Event) -> Result<Option<Event>> {
        let updated = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
            SET title = $2,
                description = $3,
                weekday = $4,
                start_time = $5,
                end_time = $6,
                max_slots = $7,
                compensation = $8,
                week = $9,
                event_date = $10
            WHERE id = $1
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.weekday)
        .bind(&event.start_time)
        .bind(&event.end_time)
        .bind(event.max_slots)
        .bind(event.compensation)
        .bind(event.week)
        .bind(event.event_date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    /// Delete event; registrations and notifications cascade
    async fn delete_event(&self, event_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_week_events(&self, week: i32) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("DELETE FROM events WHERE week = $1 RETURNING id")
            .bind(week)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn delete_day_events(&self, week: i32, weekday: &str) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("DELETE FROM events WHERE week = $1 AND weekday = $2 RETURNING id")
            .bind(week)
            .bind(weekday)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn delete_all_events(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("DELETE FROM events RETURNING id")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    /// Find event by ID
    async fn find_event(&self, event_id: i64) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(event)
    }

    async fn list_week_events(&self, week: i32) -> Result<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE week = $1 ORDER BY id ASC",
            EVENT_COLUMNS
        ))
        .bind(week)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn count_week_events(&self, week: i32) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE week = $1")
            .bind(week)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn list_registrations(&self, event_id: i64) -> Result<Vec<Registration>> {
        let registrations = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations WHERE event_id = $1 ORDER BY registered_at ASC, id ASC",
            REGISTRATION_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(registrations)
    }

    async fn find_registration(&self, event_id: i64, participant: &str) -> Result<Option<Registration>> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations WHERE event_id = $1 AND participant = $2",
            REGISTRATION_COLUMNS
        ))
        .bind(event_id)
        .bind(participant)
        .fetch_optional(&self.pool)
        .await?;

        Ok(registration)
    }

    async fn count_registrations(&self, event_id: i64) -> Result<EventCounts> {
        let counts = sqlx::query_as::<_, EventCounts>(
            r#"
            SELECT COUNT(*) AS enrolled,
                   COUNT(*) FILTER (WHERE attended) AS attended
            FROM registrations
            WHERE event_id = $1
            "#
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(counts)
    }

    /// Check-and-insert under the event row lock and a participant advisory lock
    async fn register(&self, event_id: i64, participant: &str, policy: &EnrollPolicy) -> Result<RegisterResult> {
        let mut tx = self.pool.begin().await?;

        // Serializes weekly-cap checks of one participant across events
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(participant)
            .execute(&mut *tx)
            .await?;

        let event = sqlx::query_as::<_, (i32, i32)>("SELECT max_slots, week FROM events WHERE id = $1 FOR UPDATE")
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((max_slots, week)) = event else {
            return Ok(RegisterResult::EventMissing);
        };

        if let Some(limit) = policy.weekly_cap {
            let in_week = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM registrations r
                JOIN events e ON r.event_id = e.id
                WHERE r.participant = $1 AND e.week = $2
                "#
            )
            .bind(participant)
            .bind(week)
            .fetch_one(&mut *tx)
            .await?;
            if in_week >= i64::from(limit) {
                return Ok(RegisterResult::WeeklyCapReached { limit });
            }
        }

        let duplicate = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM registrations WHERE event_id = $1 AND participant = $2)"
        )
        .bind(event_id)
        .bind(participant)
        .fetch_one(&mut *tx)
        .await?;
        if duplicate {
            return Ok(RegisterResult::AlreadyRegistered);
        }

        if policy.enforce_capacity {
            let enrolled = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM registrations WHERE event_id = $1")
                .bind(event_id)
                .fetch_one(&mut *tx)
                .await?;
            if enrolled >= i64::from(max_slots) {
                return Ok(RegisterResult::EventFull { max_slots });
            }
        }

        let inserted = sqlx::query_as::<_, Registration>(&format!(
            r#"
            INSERT INTO registrations (event_id, participant)
            VALUES ($1, $2)
            ON CONFLICT (event_id, participant) DO NOTHING
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(event_id)
        .bind(participant)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(match inserted {
            Some(registration) => RegisterResult::Inserted(registration),
            None => RegisterResult::AlreadyRegistered,
        })
    }

    /// Delete the oldest matching row only
    async fn remove_registration(&self, event_id: i64, participant: &str) -> Result<Option<Registration>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM events WHERE id = $1 FOR UPDATE")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        let removed = sqlx::query_as::<_, Registration>(&format!(
            r#"
            DELETE FROM registrations
            WHERE id = (
                SELECT id FROM registrations
                WHERE event_id = $1 AND participant = $2
                ORDER BY registered_at ASC, id ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(event_id)
        .bind(participant)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(removed)
    }

    async fn set_attendance(&self, event_id: i64, participant: &str, attended: bool) -> Result<u64> {
        let result = sqlx::query("UPDATE registrations SET attended = $3 WHERE event_id = $1 AND participant = $2")
            .bind(event_id)
            .bind(participant)
            .bind(attended)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_participant_registrations(&self) -> Result<Vec<ParticipantRegistration>> {
        let rows = sqlx::query_as::<_, ParticipantRegistration>(
            r#"
            SELECT r.participant, r.attended, r.registered_at,
                   e.id AS event_id, e.title, e.weekday, e.start_time, e.end_time,
                   e.compensation, e.week, e.event_date
            FROM registrations r
            JOIN events e ON r.event_id = e.id
            ORDER BY r.participant ASC, r.registered_at ASC
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
