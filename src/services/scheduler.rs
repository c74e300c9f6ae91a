//! Background jobs
//!
//! Two loops share one cancellation token: the notification poll, which runs
//! every `poll_interval_secs` and on demand, and the daily maintenance pass
//! that purges sent notifications past retention. A poll never overlaps
//! another poll.

use std::sync::Arc;
use std::time::Duration as StdDuration;
use chrono::{Duration, NaiveDateTime, NaiveTime};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use crate::config::SchedulerConfig;
use crate::services::notifications::{DispatchReport, NotificationScheduler};
use crate::services::temporal::Clock;

#[derive(Clone)]
pub struct BackgroundScheduler {
    notifications: NotificationScheduler,
    clock: Arc<dyn Clock>,
    poll_interval: StdDuration,
    maintenance_hour: u32,
    poll_guard: Arc<Mutex<()>>,
}

impl BackgroundScheduler {
    pub fn new(notifications: NotificationScheduler, clock: Arc<dyn Clock>, config: &SchedulerConfig) -> Self {
        Self {
            notifications,
            clock,
            poll_interval: StdDuration::from_secs(config.poll_interval_secs.max(1)),
            maintenance_hour: config.maintenance_hour.min(23),
            poll_guard: Arc::new(Mutex::new(())),
        }
    }

    /// One dispatch pass; `None` when another pass is already running
    pub async fn poll_once(&self) -> Option<DispatchReport> {
        let Ok(_guard) = self.poll_guard.try_lock() else {
            debug!("Notification poll already running, skipping");
            return None;
        };
        match self.notifications.poll_and_dispatch().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(
                    error = %e,
                    severity = %e.severity(),
                    recoverable = e.is_recoverable(),
                    "Notification poll failed"
                );
                None
            }
        }
    }

    pub async fn maintenance_once(&self) -> Option<u64> {
        match self.notifications.purge_stale().await {
            Ok(purged) => Some(purged),
            Err(e) => {
                warn!(error = %e, severity = %e.severity(), "Notification cleanup failed");
                None
            }
        }
    }

    /// Spawn both loops on the current runtime
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let trigger = Arc::new(Notify::new());

        let poll_task = tokio::spawn(self.clone().run_poll_loop(cancel.clone(), trigger.clone()));
        let maintenance_task = tokio::spawn(self.run_maintenance_loop(cancel.clone()));
        info!("Background scheduler started");

        SchedulerHandle {
            cancel,
            trigger,
            poll_task,
            maintenance_task,
        }
    }

    async fn run_poll_loop(self, cancel: CancellationToken, trigger: Arc<Notify>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = trigger.notified() => {
                    self.poll_once().await;
                }
            }
        }
        info!("Notification poll loop stopped");
    }

    async fn run_maintenance_loop(self, cancel: CancellationToken) {
        loop {
            let wait = until_next_run(self.clock.now(), self.maintenance_hour);
            debug!(seconds = wait.as_secs(), "Next notification cleanup scheduled");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(wait) => {
                    self.maintenance_once().await;
                }
            }
        }
        info!("Maintenance loop stopped");
    }
}

/// Time until the next occurrence of `hour:00` strictly after `now`
pub fn until_next_run(now: NaiveDateTime, hour: u32) -> StdDuration {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let mut next = now.date().and_time(at);
    if next <= now {
        next += Duration::days(1);
    }
    (next - now).to_std().unwrap_or(StdDuration::from_secs(60))
}

/// Running loops; dropping it leaves them running until the runtime stops
pub struct SchedulerHandle {
    cancel: CancellationToken,
    trigger: Arc<Notify>,
    poll_task: JoinHandle<()>,
    maintenance_task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask for a poll without waiting for the next tick
    pub fn trigger_poll(&self) {
        self.trigger.notify_one();
    }

    /// Cancel both loops and wait for the in-flight pass to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, task) in [("poll", self.poll_task), ("maintenance", self.maintenance_task)] {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Scheduler task join failed");
            }
        }
        info!("Background scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::database::{EventStore, MemoryStore, NotificationStore};
    use crate::models::*;
    use crate::services::push::{DeliveryOutcome, PushSender};
    use crate::services::temporal::ManualClock;
    use crate::utils::helpers::parse_date;

    fn at(date: &str, hour: u32, minute: u32) -> NaiveDateTime {
        parse_date(date).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    struct AlwaysDelivers;

    #[async_trait]
    impl PushSender for AlwaysDelivers {
        async fn deliver(&self, _subscription: &PushSubscription, _payload: &str) -> DeliveryOutcome {
            DeliveryOutcome::Delivered
        }
    }

    #[test]
    fn test_until_next_run() {
        assert_eq!(until_next_run(at("2026-10-05", 1, 30), 3), StdDuration::from_secs(90 * 60));
        assert_eq!(until_next_run(at("2026-10-05", 3, 0), 3), StdDuration::from_secs(24 * 3600));
        assert_eq!(until_next_run(at("2026-10-05", 23, 0), 3), StdDuration::from_secs(4 * 3600));
    }

    #[tokio::test]
    async fn test_triggered_poll_dispatches_and_shutdown_joins() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(at("2026-10-05", 8, 0)));
        let notifications = NotificationScheduler::new(store.clone(), Arc::new(AlwaysDelivers), clock.clone(), 7);

        let event = store
            .create_event(&CreateEventRequest {
                title: "Library desk".to_string(),
                description: None,
                weekday: "Monday".to_string(),
                start_time: "10:00".to_string(),
                end_time: "12:00".to_string(),
                max_slots: 2,
                compensation: 0,
                week: 1,
                event_date: None,
            })
            .await
            .unwrap();
        notifications
            .subscribe("alice", &NewPushSubscription {
                endpoint: "https://push.example/alice".to_string(),
                p256dh: "key".to_string(),
                auth: "auth".to_string(),
            })
            .await
            .unwrap();
        notifications
            .schedule_for_registration("alice", event.id, 1, at("2026-10-05", 10, 0))
            .await
            .unwrap();
        clock.set(at("2026-10-05", 9, 30));

        let config = SchedulerConfig {
            poll_interval_secs: 3600,
            maintenance_hour: 3,
            retention_days: 7,
        };
        let handle = BackgroundScheduler::new(notifications, clock.clone(), &config).start();
        handle.trigger_poll();

        let mut sent = false;
        for _ in 0..50 {
            if store.list_for_registration(1).await.unwrap().iter().all(|row| row.sent) {
                sent = true;
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        handle.shutdown().await;
        assert!(sent);
    }

    #[tokio::test]
    async fn test_overlapping_polls_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(at("2026-10-05", 8, 0)));
        let notifications = NotificationScheduler::new(store, Arc::new(AlwaysDelivers), clock.clone(), 7);
        let scheduler = BackgroundScheduler::new(notifications, clock, &SchedulerConfig::default());

        let _held = scheduler.poll_guard.lock().await;
        assert!(scheduler.poll_once().await.is_none());
        drop(_held);
        assert_eq!(scheduler.poll_once().await, Some(DispatchReport::default()));
    }
}
