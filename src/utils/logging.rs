//! Logging configuration and setup
//!
//! This module provides logging initialization and the structured records
//! that make up the action audit trail of ShiftPool.

use tracing::{info, warn, debug};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::config::LoggingConfig;
use crate::utils::errors::{ShiftPoolError, Result};

/// Initialize logging based on configuration.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.file_path, "shiftpool.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .map_err(|e| ShiftPoolError::Config(format!("logging already initialized: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log participant actions on an event (enroll, unenroll)
pub fn log_event_action(event_id: i64, action: &str, participant: &str, details: Option<&str>) {
    info!(
        event_id = event_id,
        action = action,
        participant = participant,
        details = details,
        "Event action performed"
    );
}

/// Log admin actions
pub fn log_admin_action(action: &str, target: Option<&str>, details: Option<&str>) {
    warn!(
        action = action,
        target = target,
        details = details,
        "Admin action performed"
    );
}

/// Log notification lifecycle records
pub fn log_notification(notification_id: i64, user_id: &str, outcome: &str, details: Option<&str>) {
    debug!(
        notification_id = notification_id,
        user_id = user_id,
        outcome = outcome,
        details = details,
        "Notification processed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_writes_into_configured_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = LoggingConfig {
            level: "debug".to_string(),
            file_path: dir.path().to_string_lossy().to_string(),
        };

        // A global subscriber may already be installed by another test
        match init_logging(&config) {
            Ok(guard) => drop(guard),
            Err(ShiftPoolError::Config(msg)) => assert!(msg.contains("already")),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
