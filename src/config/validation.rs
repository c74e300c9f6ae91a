//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{ShiftPoolError, Result};
use super::Settings;

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_database_config(&settings.database)?;
    validate_redis_config(&settings.redis)?;
    validate_scheduler_config(&settings.scheduler)?;
    validate_logging_config(&settings.logging)?;

    if let Some(ref push_config) = settings.push {
        validate_push_config(push_config)?;
    }

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(ShiftPoolError::Config(
            "Database URL is required".to_string()
        ));
    }

    if config.max_connections == 0 {
        return Err(ShiftPoolError::Config(
            "Max connections must be greater than 0".to_string()
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(ShiftPoolError::Config(
            "Min connections cannot be greater than max connections".to_string()
        ));
    }

    Ok(())
}

/// Validate Redis configuration
fn validate_redis_config(config: &super::RedisConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(ShiftPoolError::Config(
            "Redis URL is required".to_string()
        ));
    }

    Ok(())
}

/// Validate scheduler configuration
fn validate_scheduler_config(config: &super::SchedulerConfig) -> Result<()> {
    if config.poll_interval_secs == 0 {
        return Err(ShiftPoolError::Config(
            "Scheduler poll interval must be greater than 0".to_string()
        ));
    }

    if config.maintenance_hour > 23 {
        return Err(ShiftPoolError::Config(
            format!("Invalid maintenance hour: {}", config.maintenance_hour)
        ));
    }

    if config.retention_days <= 0 {
        return Err(ShiftPoolError::Config(
            "Notification retention must be at least one day".to_string()
        ));
    }

    Ok(())
}

/// Validate push configuration
fn validate_push_config(config: &super::PushConfig) -> Result<()> {
    let subject = config.vapid_subject.trim();
    if !subject.is_empty() && !(subject.starts_with("mailto:") || subject.starts_with("https:")) {
        return Err(ShiftPoolError::Config(
            "VAPID subject must be a mailto: or https: URI".to_string()
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(ShiftPoolError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(ShiftPoolError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PushConfig;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(validate_settings(&Settings::default()).is_ok());
    }

    #[test]
    fn test_rejects_min_above_max_connections() {
        let mut settings = Settings::default();
        settings.database.min_connections = 20;
        assert!(matches!(validate_settings(&settings), Err(ShiftPoolError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_poll_interval_and_bad_hour() {
        let mut settings = Settings::default();
        settings.scheduler.poll_interval_secs = 0;
        assert!(validate_settings(&settings).is_err());

        let mut settings = Settings::default();
        settings.scheduler.maintenance_hour = 24;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut settings = Settings::default();
        settings.logging.level = "verbose".to_string();
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_rejects_bad_vapid_subject() {
        let mut settings = Settings::default();
        settings.push = Some(PushConfig {
            vapid_private_key: "key".to_string(),
            vapid_public_key: "pub".to_string(),
            vapid_subject: "admin@example.com".to_string(),
        });
        assert!(validate_settings(&settings).is_err());

        if let Some(push) = settings.push.as_mut() {
            push.vapid_subject = "mailto:admin@example.com".to_string();
        }
        assert!(validate_settings(&settings).is_ok());
    }
}
