//! Database repositories module
//!
//! PostgreSQL implementations of the store contracts

pub mod event;
pub mod settings;
pub mod notification;
pub mod template;
pub mod whitelist;

// Re-export repositories
pub use event::EventRepository;
pub use settings::SettingsRepository;
pub use notification::NotificationRepository;
pub use template::TemplateRepository;
pub use whitelist::WhitelistRepository;
