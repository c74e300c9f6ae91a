//! Broadcast emitter
//!
//! Fans state changes out to connected viewers. Emission is fire-and-forget:
//! transport failures are logged and never reach the caller.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, warn};
use crate::config::RedisConfig;
use crate::models::{EventAction, EventSnapshot};
use crate::utils::errors::Result;

pub const TOPIC_EVENT_UPDATE: &str = "event_update";
pub const TOPIC_WEEK_ACTIVATED: &str = "week_activated";
pub const TOPIC_DISPLAY_WEEK: &str = "display_week";

/// One published message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub topic: String,
    pub payload: Value,
}

/// One-way publication with no acknowledgment
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value);
}

pub fn event_update_payload(action: EventAction, snapshot: &EventSnapshot) -> Value {
    json!({ "action": action, "event": snapshot })
}

pub fn event_deleted_payload(event_id: i64) -> Value {
    json!({ "action": EventAction::Delete, "event_id": event_id })
}

/// Publishes on Redis channels named `<prefix><topic>`
pub struct RedisBroadcaster {
    client: Client,
    prefix: String,
    connection: OnceCell<ConnectionManager>,
}

impl RedisBroadcaster {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            prefix: config.channel_prefix.clone(),
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }

    pub fn channel(&self, topic: &str) -> String {
        format!("{}{}", self.prefix, topic)
    }

    /// PING the server
    pub async fn health_check(&self) -> bool {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                return false;
            }
        };
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(response) => response == "PONG",
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                false
            }
        }
    }

    async fn try_publish(&self, channel: &str, payload: &Value) -> Result<i64> {
        let message = serde_json::to_string(payload)?;
        let mut conn = self.connection().await?;
        let receivers: i64 = conn.publish(channel, message).await?;
        Ok(receivers)
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn publish(&self, topic: &str, payload: Value) {
        let channel = self.channel(topic);
        match self.try_publish(&channel, &payload).await {
            Ok(receivers) => debug!(channel = %channel, receivers = receivers, "Broadcast published"),
            Err(e) => warn!(channel = %channel, error = %e, "Broadcast dropped"),
        }
    }
}

/// In-process fan-out over a tokio broadcast channel
#[derive(Clone)]
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.sender.subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn publish(&self, topic: &str, payload: Value) {
        let message = BroadcastMessage {
            topic: topic.to_string(),
            payload,
        };
        // No receivers just means nobody is watching
        if self.sender.send(message).is_err() {
            debug!(topic = topic, "Broadcast without viewers");
        }
    }
}
