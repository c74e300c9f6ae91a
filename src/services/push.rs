//! Push delivery
//!
//! Web push transport plus the outcome classification the scheduler relies
//! on: permanent failures remove the subscription, transient ones retry.

use std::sync::Arc;
use async_trait::async_trait;
use tracing::debug;
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushClient, WebPushError,
    WebPushMessageBuilder, URL_SAFE_NO_PAD,
};
use crate::config::PushConfig;
use crate::models::PushSubscription;
use crate::utils::errors::{ShiftPoolError, Result};

/// Result of one delivery attempt to one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Endpoint is gone; the subscription must be deleted
    PermanentFailure(String),
    TransientFailure(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn deliver(&self, subscription: &PushSubscription, payload: &str) -> DeliveryOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapidConfig {
    pub private_key: String,
    pub public_key: String,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VapidConfigStatus {
    Missing,
    Incomplete,
    Ready(VapidConfig),
}

/// Classify the optional push section; blank values count as absent
pub fn load_vapid_config(config: Option<&PushConfig>) -> VapidConfigStatus {
    let Some(config) = config else {
        return VapidConfigStatus::Missing;
    };
    let present = |value: &str| !value.trim().is_empty();
    let fields = [&config.vapid_private_key, &config.vapid_public_key, &config.vapid_subject];

    if fields.iter().all(|value| present(value)) {
        VapidConfigStatus::Ready(VapidConfig {
            private_key: config.vapid_private_key.trim().to_string(),
            public_key: config.vapid_public_key.trim().to_string(),
            subject: config.vapid_subject.trim().to_string(),
        })
    } else if fields.iter().any(|value| present(value)) {
        VapidConfigStatus::Incomplete
    } else {
        VapidConfigStatus::Missing
    }
}

/// Sender backed by the `web-push` client
pub struct WebPushSender {
    vapid: VapidConfig,
    client: Arc<WebPushClient>,
}

impl WebPushSender {
    pub fn new(vapid: VapidConfig) -> Result<Self> {
        let client = WebPushClient::new().map_err(|e| ShiftPoolError::PushSetup(e.to_string()))?;
        Ok(Self {
            vapid,
            client: Arc::new(client),
        })
    }

    async fn send(&self, subscription: &PushSubscription, payload: &str) -> std::result::Result<(), WebPushError> {
        let subscription_info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.p256dh.clone(),
            subscription.auth.clone(),
        );
        let mut builder = WebPushMessageBuilder::new(&subscription_info)?;
        builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());
        let mut signature_builder =
            VapidSignatureBuilder::from_base64(&self.vapid.private_key, URL_SAFE_NO_PAD, &subscription_info)?;
        signature_builder.add_claim("sub", self.vapid.subject.as_str());
        builder.set_vapid_signature(signature_builder.build()?);
        self.client.send(builder.build()?).await?;
        Ok(())
    }
}

/// Map a transport error onto the retry policy
pub fn classify_error(error: &WebPushError) -> DeliveryOutcome {
    match error {
        WebPushError::EndpointNotValid { .. } | WebPushError::EndpointNotFound { .. } => {
            DeliveryOutcome::PermanentFailure(error.to_string())
        }
        _ => DeliveryOutcome::TransientFailure(error.to_string()),
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn deliver(&self, subscription: &PushSubscription, payload: &str) -> DeliveryOutcome {
        match self.send(subscription, payload).await {
            Ok(()) => {
                debug!(subscription_id = subscription.id, "Push delivered");
                DeliveryOutcome::Delivered
            }
            Err(e) => classify_error(&e),
        }
    }
}

/// Used when VAPID credentials are not configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPushSender;

#[async_trait]
impl PushSender for DisabledPushSender {
    async fn deliver(&self, _subscription: &PushSubscription, _payload: &str) -> DeliveryOutcome {
        DeliveryOutcome::TransientFailure("push delivery disabled".to_string())
    }
}

/// Build the sender the configuration allows
pub fn sender_from_config(config: Option<&PushConfig>) -> Result<Arc<dyn PushSender>> {
    match load_vapid_config(config) {
        VapidConfigStatus::Ready(vapid) => Ok(Arc::new(WebPushSender::new(vapid)?)),
        VapidConfigStatus::Incomplete => {
            tracing::warn!("Push notifications disabled: incomplete VAPID configuration");
            Ok(Arc::new(DisabledPushSender))
        }
        VapidConfigStatus::Missing => {
            tracing::info!("Push notifications disabled: no VAPID configuration");
            Ok(Arc::new(DisabledPushSender))
        }
    }
}
