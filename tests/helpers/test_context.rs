//! Test context
//!
//! Wires a full `ServiceFactory` over a given set of stores with a manual
//! clock, an in-process broadcaster and a recording push sender.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use ShiftPool::config::Settings;
use ShiftPool::database::Stores;
use ShiftPool::models::PushSubscription;
use ShiftPool::services::{
    BroadcastMessage, ChannelBroadcaster, DeliveryOutcome, ManualClock, PushSender, ServiceFactory, TemporalPolicy,
};
use tokio::sync::broadcast::Receiver;
use super::test_data::{at, PARTICIPANTS, POOL_START};

/// Push sender that records payloads and answers per endpoint
#[derive(Default)]
pub struct RecordingSender {
    outcomes: Mutex<HashMap<String, DeliveryOutcome>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn script(&self, endpoint: &str, outcome: DeliveryOutcome) {
        self.outcomes.lock().unwrap().insert(endpoint.to_string(), outcome);
    }

    /// (endpoint, payload) pairs in delivery order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for RecordingSender {
    async fn deliver(&self, subscription: &PushSubscription, payload: &str) -> DeliveryOutcome {
        if let Some(outcome) = self.outcomes.lock().unwrap().get(&subscription.endpoint) {
            return outcome.clone();
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), payload.to_string()));
        DeliveryOutcome::Delivered
    }
}

pub struct TestContext {
    pub services: ServiceFactory,
    pub stores: Stores,
    pub clock: Arc<ManualClock>,
    pub broadcaster: ChannelBroadcaster,
    pub sender: Arc<RecordingSender>,
}

impl TestContext {
    /// In-memory context; "now" is Sunday noon before week 1
    pub async fn new() -> Self {
        Self::with_stores(Stores::memory(), TemporalPolicy::FailOpen).await
    }

    pub async fn with_policy(policy: TemporalPolicy) -> Self {
        Self::with_stores(Stores::memory(), policy).await
    }

    pub async fn with_stores(stores: Stores, policy: TemporalPolicy) -> Self {
        let clock = Arc::new(ManualClock::new(at("2026-10-04", 12, 0)));
        let broadcaster = ChannelBroadcaster::default();
        let sender = Arc::new(RecordingSender::default());

        let mut settings = Settings::default();
        settings.pool.temporal_policy = policy;

        let services = ServiceFactory::new(
            stores.clone(),
            Arc::new(broadcaster.clone()),
            sender.clone(),
            clock.clone(),
            &settings,
        );
        services.settings.initialize().await.expect("initialize settings");
        services
            .settings
            .set_pool_dates(POOL_START, None)
            .await
            .expect("set pool dates");
        for login in PARTICIPANTS {
            services.ledger.whitelist_add(login).await.expect("whitelist participant");
        }

        Self {
            services,
            stores,
            clock,
            broadcaster,
            sender,
        }
    }

    pub fn viewer(&self) -> Receiver<BroadcastMessage> {
        self.broadcaster.subscribe()
    }

    /// Every message currently queued for `viewer`
    pub fn drain(viewer: &mut Receiver<BroadcastMessage>) -> Vec<BroadcastMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = viewer.try_recv() {
            messages.push(message);
        }
        messages
    }
}
