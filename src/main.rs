//! ShiftPool
//!
//! Main application entry point: wires the stores, runs migrations and keeps
//! the background notification jobs alive until Ctrl-C.

use std::sync::Arc;
use anyhow::Context;
use tracing::{info, warn};

use ShiftPool::{
    config::Settings,
    utils::logging,
    database::{DatabaseService, connection::{create_pool, run_migrations}},
    services::{
        broadcast::RedisBroadcaster,
        push::sender_from_config,
        Broadcaster, ServiceFactory, SystemClock,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new().context("failed to load configuration")?;
    settings.validate()?;

    // Initialize logging
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", ShiftPool::info());
    info!(temporal_policy = ?settings.pool.temporal_policy, "Pool policy loaded");

    // Initialize database connection
    info!("Connecting to database...");
    let db_pool = create_pool(&settings.database).await?;

    // Run database migrations
    info!("Running database migrations...");
    run_migrations(&db_pool).await?;
    let database_service = DatabaseService::new(db_pool);

    // Initialize Redis broadcaster
    info!("Connecting to Redis...");
    let redis = Arc::new(RedisBroadcaster::new(&settings.redis)?);
    let broadcaster: Arc<dyn Broadcaster> = redis.clone();

    // Initialize services
    info!("Initializing services...");
    let sender = sender_from_config(settings.push.as_ref())?;
    let services = ServiceFactory::new(
        database_service.stores(),
        broadcaster,
        sender,
        Arc::new(SystemClock),
        &settings,
    );
    services.settings.initialize().await?;

    let health = services.health_check(&database_service, Some(&redis)).await;
    for issue in health.get_issues() {
        warn!("Health check: {}", issue);
    }

    let transition = services.display.evaluate().await?;
    info!(display_week = transition.week(), "Display week evaluated");

    let scheduler = services.background_scheduler(&settings).start();
    info!("ShiftPool is ready!");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    scheduler.shutdown().await;

    info!("ShiftPool has been shut down.");
    Ok(())
}
