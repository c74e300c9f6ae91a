//! Whitelist repository implementation

use async_trait::async_trait;
use sqlx::PgPool;
use crate::database::store::Whitelist;
use crate::models::WhitelistEntry;
use crate::utils::errors::Result;
use crate::utils::helpers::normalize_login;

#[derive(Clone)]
pub struct WhitelistRepository {
    pool: PgPool,
}

impl WhitelistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Whitelist for WhitelistRepository {
    async fn is_authorized(&self, login: &str) -> Result<bool> {
        let authorized = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM whitelist WHERE login = $1)")
            .bind(normalize_login(login))
            .fetch_one(&self.pool)
            .await?;

        Ok(authorized)
    }

    async fn add(&self, login: &str) -> Result<bool> {
        let result = sqlx::query("INSERT INTO whitelist (login) VALUES ($1) ON CONFLICT (login) DO NOTHING")
            .bind(normalize_login(login))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, login: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM whitelist WHERE login = $1")
            .bind(normalize_login(login))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<WhitelistEntry>> {
        let entries = sqlx::query_as::<_, WhitelistEntry>("SELECT id, login, added_at FROM whitelist ORDER BY login ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }
}
