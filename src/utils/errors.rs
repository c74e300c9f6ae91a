//! Error handling for ShiftPool
//!
//! This module defines the main error type used throughout the application.
//! Policy rejections (event full, event passed, ...) are not errors: they are
//! returned as outcome values by the registration ledger.

use thiserror::Error;

/// Main error type for ShiftPool
#[derive(Error, Debug)]
pub enum ShiftPoolError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Event not found: {event_id}")]
    EventNotFound { event_id: i64 },

    #[error("Registration not found: {participant} in event {event_id}")]
    RegistrationNotFound { event_id: i64, participant: String },

    #[error("Template not found: {template_id}")]
    TemplateNotFound { template_id: i64 },

    #[error("Push setup error: {0}")]
    PushSetup(String),
}

/// Result type alias for ShiftPool operations
pub type Result<T> = std::result::Result<T, ShiftPoolError>;

impl From<config::ConfigError> for ShiftPoolError {
    fn from(err: config::ConfigError) -> Self {
        ShiftPoolError::Config(err.to_string())
    }
}

impl ShiftPoolError {
    /// Check if the error is recoverable (the same operation may succeed later)
    pub fn is_recoverable(&self) -> bool {
        match self {
            ShiftPoolError::Database(_) => true,
            ShiftPoolError::Migration(_) => false,
            ShiftPoolError::Redis(_) => true,
            ShiftPoolError::Serialization(_) => false,
            ShiftPoolError::Io(_) => true,
            ShiftPoolError::Config(_) => false,
            ShiftPoolError::InvalidInput(_) => false,
            ShiftPoolError::EventNotFound { .. } => false,
            ShiftPoolError::RegistrationNotFound { .. } => false,
            ShiftPoolError::TemplateNotFound { .. } => false,
            ShiftPoolError::PushSetup(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ShiftPoolError::Database(_) => ErrorSeverity::Critical,
            ShiftPoolError::Migration(_) => ErrorSeverity::Critical,
            ShiftPoolError::Config(_) => ErrorSeverity::Critical,
            ShiftPoolError::InvalidInput(_) => ErrorSeverity::Info,
            ShiftPoolError::EventNotFound { .. } => ErrorSeverity::Info,
            ShiftPoolError::RegistrationNotFound { .. } => ErrorSeverity::Info,
            ShiftPoolError::TemplateNotFound { .. } => ErrorSeverity::Info,
            ShiftPoolError::PushSetup(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
