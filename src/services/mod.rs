//! Services module
//!
//! This module contains business logic services

pub mod broadcast;
pub mod display;
pub mod ledger;
pub mod notifications;
pub mod push;
pub mod scheduler;
pub mod settings;
pub mod temporal;

// Re-export commonly used services
pub use broadcast::{Broadcaster, BroadcastMessage, ChannelBroadcaster, RedisBroadcaster};
pub use display::{DisplayAdvancer, DisplayTransition, DisplayView};
pub use ledger::{RegistrationLedger, EnrollOutcome, UnenrollOutcome, RejectReason};
pub use notifications::{NotificationScheduler, DispatchReport};
pub use push::{PushSender, DeliveryOutcome, WebPushSender, DisabledPushSender};
pub use scheduler::{BackgroundScheduler, SchedulerHandle};
pub use settings::SettingsService;
pub use temporal::{Clock, SystemClock, ManualClock, TemporalPolicy};

use std::sync::Arc;
use crate::config::settings::Settings;
use crate::database::{DatabaseService, Stores};
use push::{load_vapid_config, VapidConfigStatus};

/// Service factory for creating and managing all services
#[derive(Clone)]
pub struct ServiceFactory {
    pub settings: SettingsService,
    pub ledger: RegistrationLedger,
    pub display: DisplayAdvancer,
    pub notifications: NotificationScheduler,
    pub clock: Arc<dyn Clock>,
    push_enabled: bool,
}

impl ServiceFactory {
    /// Wire every service over the given stores and transports
    pub fn new(
        stores: Stores,
        broadcaster: Arc<dyn Broadcaster>,
        sender: Arc<dyn PushSender>,
        clock: Arc<dyn Clock>,
        config: &Settings,
    ) -> Self {
        let settings = SettingsService::new(stores.settings.clone(), broadcaster.clone());
        let notifications = NotificationScheduler::new(
            stores.notifications.clone(),
            sender,
            clock.clone(),
            config.scheduler.retention_days,
        );
        let ledger = RegistrationLedger::new(
            &stores,
            settings.clone(),
            notifications.clone(),
            broadcaster.clone(),
            clock.clone(),
            config.pool.temporal_policy,
        );
        let display = DisplayAdvancer::new(stores.events, ledger.clone(), broadcaster, clock.clone());
        let push_enabled = matches!(load_vapid_config(config.push.as_ref()), VapidConfigStatus::Ready(_));

        Self {
            settings,
            ledger,
            display,
            notifications,
            clock,
            push_enabled,
        }
    }

    /// Background loops over this factory's notification scheduler
    pub fn background_scheduler(&self, config: &Settings) -> BackgroundScheduler {
        BackgroundScheduler::new(self.notifications.clone(), self.clock.clone(), &config.scheduler)
    }

    /// Health check for all services
    pub async fn health_check(&self, database: &DatabaseService, redis: Option<&RedisBroadcaster>) -> ServiceHealthStatus {
        let database_healthy = database.health_check().await.is_ok();
        let redis_healthy = match redis {
            Some(redis) => redis.health_check().await,
            None => true,
        };

        ServiceHealthStatus {
            database_healthy,
            redis_healthy,
            push_enabled: self.push_enabled,
        }
    }
}

/// Health status for all services
#[derive(Debug, Clone)]
pub struct ServiceHealthStatus {
    pub database_healthy: bool,
    pub redis_healthy: bool,
    pub push_enabled: bool,
}

impl ServiceHealthStatus {
    /// Broadcasts and push are best-effort; only the database is critical
    pub fn is_healthy(&self) -> bool {
        self.database_healthy
    }

    /// Get list of unhealthy services
    pub fn get_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.database_healthy {
            issues.push("Database connection failed".to_string());
        }
        if !self.redis_healthy {
            issues.push("Redis connection failed".to_string());
        }
        if !self.push_enabled {
            issues.push("Push notifications disabled".to_string());
        }

        issues
    }
}
