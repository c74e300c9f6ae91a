//! Week template repository implementation

use async_trait::async_trait;
use sqlx::PgPool;
use crate::database::repositories::event::EVENT_COLUMNS;
use crate::database::store::TemplateStore;
use crate::models::*;
use crate::utils::errors::Result;

const TEMPLATE_EVENT_COLUMNS: &str =
    "id, template_id, title, description, weekday, event_date, start_time, end_time, max_slots, compensation";

/// Advisory lock namespace for per-week event rewrites
const WEEK_LOCK_CLASS: i32 = 2;

#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for TemplateRepository {
    /// Insert the header and every blueprint in one transaction
    async fn save_template(&self, request: &SaveTemplateRequest) -> Result<WeekTemplate> {
        let mut tx = self.pool.begin().await?;

        let (id, created_at) = sqlx::query_as::<_, (i64, chrono::DateTime<chrono::Utc>)>(
            r#"
            INSERT INTO week_templates (name, description, target_week)
            VALUES ($1, $2, $3)
            RETURNING id, created_at
            "#
        )
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.target_week)
        .fetch_one(&mut *tx)
        .await?;

        for event in &request.events {
            sqlx::query(
                r#"
                INSERT INTO template_events
                    (template_id, title, description, weekday, event_date, start_time, end_time, max_slots, compensation)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#
            )
            .bind(id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(&event.weekday)
            .bind(event.event_date)
            .bind(&event.start_time)
            .bind(&event.end_time)
            .bind(event.max_slots)
            .bind(event.compensation)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(WeekTemplate {
            id,
            name: request.name.clone(),
            description: request.description.clone(),
            target_week: request.target_week,
            created_at,
            event_count: request.events.len() as i64,
        })
    }

    async fn list_templates(&self) -> Result<Vec<WeekTemplate>> {
        let templates = sqlx::query_as::<_, WeekTemplate>(
            r#"
            SELECT t.id, t.name, t.description, t.target_week, t.created_at,
                   COUNT(e.id) AS event_count
            FROM week_templates t
            LEFT JOIN template_events e ON e.template_id = t.id
            GROUP BY t.id
            ORDER BY t.created_at DESC, t.id DESC
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(templates)
    }

    async fn list_template_events(&self, template_id: i64) -> Result<Vec<TemplateEvent>> {
        let events = sqlx::query_as::<_, TemplateEvent>(&format!(
            "SELECT {} FROM template_events WHERE template_id = $1 ORDER BY id ASC",
            TEMPLATE_EVENT_COLUMNS
        ))
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn delete_template(&self, template_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM week_templates WHERE id = $1")
            .bind(template_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn apply_template(&self, template_id: i64, overwrite: bool) -> Result<ApplyTemplateResult> {
        let mut tx = self.pool.begin().await?;

        let template = sqlx::query_as::<_, WeekTemplate>(
            r#"
            SELECT t.id, t.name, t.description, t.target_week, t.created_at,
                   COUNT(e.id) AS event_count
            FROM week_templates t
            LEFT JOIN template_events e ON e.template_id = t.id
            WHERE t.id = $1
            GROUP BY t.id
            "#
        )
        .bind(template_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(template) = template else {
            return Ok(ApplyTemplateResult::TemplateMissing);
        };

        // Serializes concurrent applies to the same week
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(WEEK_LOCK_CLASS)
            .bind(template.target_week)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE week = $1")
            .bind(template.target_week)
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 && !overwrite {
            return Ok(ApplyTemplateResult::WeekNotEmpty { existing });
        }
        if template.event_count == 0 {
            return Ok(ApplyTemplateResult::TemplateEmpty);
        }

        let deleted = sqlx::query_scalar::<_, i64>("DELETE FROM events WHERE week = $1 RETURNING id")
            .bind(template.target_week)
            .fetch_all(&mut *tx)
            .await?;

        let mut created = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (title, description, weekday, start_time, end_time, max_slots, compensation, week, event_date)
            SELECT title, description, weekday, start_time, end_time, max_slots, compensation, $2, event_date
            FROM template_events
            WHERE template_id = $1
            ORDER BY id ASC
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(template_id)
        .bind(template.target_week)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        created.sort_by_key(|event| event.id);
        Ok(ApplyTemplateResult::Applied { template, deleted, created })
    }
}
