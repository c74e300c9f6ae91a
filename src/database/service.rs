//! Database service layer
//!
//! Bundles the PostgreSQL repositories behind the store contracts

use std::sync::Arc;
use crate::database::{
    DatabasePool, EventRepository, NotificationRepository, SettingsRepository, Stores, TemplateRepository, WhitelistRepository,
};
use crate::utils::errors::Result;

#[derive(Debug, Clone)]
pub struct DatabaseService {
    pool: DatabasePool,
}

impl DatabaseService {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Store handles backed by this pool
    pub fn stores(&self) -> Stores {
        Stores {
            events: Arc::new(EventRepository::new(self.pool.clone())),
            whitelist: Arc::new(WhitelistRepository::new(self.pool.clone())),
            settings: Arc::new(SettingsRepository::new(self.pool.clone())),
            notifications: Arc::new(NotificationRepository::new(self.pool.clone())),
            templates: Arc::new(TemplateRepository::new(self.pool.clone())),
        }
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        super::connection::health_check(&self.pool).await
    }
}
