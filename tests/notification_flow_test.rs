//! Reminder lifecycle: enroll, schedule, dispatch, retry, purge

mod helpers;

use assert_matches::assert_matches;
use chrono::Duration;
use helpers::*;
use ShiftPool::database::NotificationStore;
use ShiftPool::models::{NotificationKind, NotificationPreferences, UpdateEventRequest};
use ShiftPool::services::{DeliveryOutcome, EnrollOutcome};
use ShiftPool::services::notifications::NO_SUBSCRIPTIONS;

#[tokio::test]
async fn test_enroll_to_delivery() {
    let ctx = TestContext::new().await;
    let notifications = &ctx.services.notifications;
    notifications.subscribe("alice", &subscription("alice-phone")).await.unwrap();
    notifications.subscribe("alice", &subscription("alice-laptop")).await.unwrap();

    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();
    let EnrollOutcome::Enrolled(registration) = ctx.services.ledger.enroll(event.id, "alice").await.unwrap() else {
        panic!("expected enrollment");
    };

    let rows = ctx.stores.notifications.list_for_registration(registration.id).await.unwrap();
    let kinds: Vec<_> = rows.iter().filter_map(|row| row.kind()).collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&NotificationKind::DayBefore));
    assert!(kinds.contains(&NotificationKind::HourBefore));

    // Nothing is due before the day-before mark
    let report = notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.processed, 0);

    ctx.clock.set(at("2026-10-04", 16, 0));
    let report = notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.sent, 1);
    let deliveries = ctx.sender.sent();
    assert_eq!(deliveries.len(), 2);
    let payload: serde_json::Value = serde_json::from_str(&deliveries[0].1).unwrap();
    assert_eq!(payload["title"], format!("Event reminder: {}", event.title));
    assert!(payload["body"].as_str().unwrap().contains("tomorrow"));

    // Sent rows are never picked again
    let report = notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.processed, 0);

    ctx.clock.set(at("2026-10-05", 15, 5));
    let report = notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.sent, 1);
    let payload: serde_json::Value = serde_json::from_str(&ctx.sender.sent()[2].1).unwrap();
    assert!(payload["body"].as_str().unwrap().contains("in 1 hour"));
}

#[tokio::test]
async fn test_late_enrollment_skips_past_lead_times() {
    let ctx = TestContext::new().await;
    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();
    ctx.clock.set(at("2026-10-05", 10, 0));

    let EnrollOutcome::Enrolled(registration) = ctx.services.ledger.enroll(event.id, "bob").await.unwrap() else {
        panic!("expected enrollment");
    };
    let rows = ctx.stores.notifications.list_for_registration(registration.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind(), Some(NotificationKind::HourBefore));
    assert_eq!(rows[0].fire_at, at("2026-10-05", 15, 0));
}

#[tokio::test]
async fn test_preferences_filter_scheduling() {
    let ctx = TestContext::new().await;
    let notifications = &ctx.services.notifications;
    notifications
        .set_preferences("carol", &NotificationPreferences { enabled: true, notify_24h: false, notify_1h: true })
        .await
        .unwrap();
    notifications
        .set_preferences("dave", &NotificationPreferences { enabled: false, notify_24h: true, notify_1h: true })
        .await
        .unwrap();

    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();
    let EnrollOutcome::Enrolled(carol) = ctx.services.ledger.enroll(event.id, "carol").await.unwrap() else {
        panic!("expected enrollment");
    };
    let EnrollOutcome::Enrolled(dave) = ctx.services.ledger.enroll(event.id, "dave").await.unwrap() else {
        panic!("expected enrollment");
    };

    let carol_rows = ctx.stores.notifications.list_for_registration(carol.id).await.unwrap();
    assert_eq!(carol_rows.len(), 1);
    assert_eq!(carol_rows[0].kind(), Some(NotificationKind::HourBefore));
    assert!(ctx.stores.notifications.list_for_registration(dave.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_subscription_keeps_row_pending() {
    let ctx = TestContext::new().await;
    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();
    let EnrollOutcome::Enrolled(registration) = ctx.services.ledger.enroll(event.id, "bob").await.unwrap() else {
        panic!("expected enrollment");
    };

    ctx.clock.set(at("2026-10-04", 16, 30));
    let report = ctx.services.notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.failed, 1);

    let rows = ctx.stores.notifications.list_for_registration(registration.id).await.unwrap();
    let day_before = rows.iter().find(|row| row.kind() == Some(NotificationKind::DayBefore)).unwrap();
    assert!(!day_before.sent);
    assert_eq!(day_before.error_message.as_deref(), Some(NO_SUBSCRIPTIONS));

    // Subscribing later lets the next poll deliver it
    ctx.services.notifications.subscribe("bob", &subscription("bob-phone")).await.unwrap();
    let report = ctx.services.notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn test_gone_endpoint_is_removed_and_others_still_deliver() {
    let ctx = TestContext::new().await;
    let notifications = &ctx.services.notifications;
    let stale = subscription("alice-old");
    notifications.subscribe("alice", &stale).await.unwrap();
    notifications.subscribe("alice", &subscription("alice-new")).await.unwrap();
    ctx.sender.script(&stale.endpoint, DeliveryOutcome::PermanentFailure("410 Gone".to_string()));

    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();
    ctx.services.ledger.enroll(event.id, "alice").await.unwrap();
    ctx.clock.set(at("2026-10-04", 16, 0));

    let report = notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.removed_subscriptions, 1);
    let endpoints: Vec<String> = ctx
        .stores
        .notifications
        .list_subscriptions("alice")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.endpoint)
        .collect();
    assert_eq!(endpoints, vec![subscription("alice-new").endpoint]);
}

#[tokio::test]
async fn test_transient_failure_retries_on_next_poll() {
    let ctx = TestContext::new().await;
    let phone = subscription("erin-phone");
    ctx.services.notifications.subscribe("erin", &phone).await.unwrap();
    ctx.sender.script(&phone.endpoint, DeliveryOutcome::TransientFailure("timeout".to_string()));

    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();
    let EnrollOutcome::Enrolled(registration) = ctx.services.ledger.admin_add_participant(event.id, "erin").await.unwrap() else {
        panic!("expected enrollment");
    };
    ctx.clock.set(at("2026-10-04", 16, 0));

    let report = ctx.services.notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.failed, 1);
    let rows = ctx.stores.notifications.list_for_registration(registration.id).await.unwrap();
    let day_before = rows.iter().find(|row| row.kind() == Some(NotificationKind::DayBefore)).unwrap();
    assert!(!day_before.sent);
    assert_matches!(day_before.error_message.as_deref(), Some(message) if message.starts_with("Delivery failed"));

    ctx.sender.script(&phone.endpoint, DeliveryOutcome::Delivered);
    let report = ctx.services.notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn test_unenroll_cancels_pending_but_keeps_sent() {
    let ctx = TestContext::new().await;
    ctx.services.notifications.subscribe("alice", &subscription("alice")).await.unwrap();
    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();
    let EnrollOutcome::Enrolled(registration) = ctx.services.ledger.enroll(event.id, "alice").await.unwrap() else {
        panic!("expected enrollment");
    };

    ctx.clock.set(at("2026-10-04", 16, 0));
    ctx.services.notifications.poll_and_dispatch().await.unwrap();
    ctx.services.ledger.unenroll(event.id, "alice", false).await.unwrap();

    let rows = ctx.stores.notifications.list_for_registration(registration.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].sent);
}

#[tokio::test]
async fn test_deleting_event_drops_its_notifications() {
    let ctx = TestContext::new().await;
    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();
    let EnrollOutcome::Enrolled(registration) = ctx.services.ledger.enroll(event.id, "alice").await.unwrap() else {
        panic!("expected enrollment");
    };

    ctx.services.ledger.delete_event(event.id).await.unwrap();
    assert!(ctx.stores.notifications.list_for_registration(registration.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_purge_respects_retention() {
    let ctx = TestContext::new().await;
    ctx.services.notifications.subscribe("alice", &subscription("alice")).await.unwrap();
    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();
    ctx.services.ledger.enroll(event.id, "alice").await.unwrap();

    ctx.clock.set(at("2026-10-05", 15, 30));
    let report = ctx.services.notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.sent, 2);

    ctx.clock.advance(Duration::days(6));
    assert_eq!(ctx.services.notifications.purge_stale().await.unwrap(), 0);
    ctx.clock.advance(Duration::days(2));
    assert_eq!(ctx.services.notifications.purge_stale().await.unwrap(), 2);
}

#[tokio::test]
async fn test_moved_event_reminds_at_new_time() {
    let ctx = TestContext::new().await;
    ctx.services.notifications.subscribe("alice", &subscription("alice")).await.unwrap();
    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();
    ctx.services.ledger.enroll(event.id, "alice").await.unwrap();

    let to_thursday = UpdateEventRequest { weekday: Some("Thursday".to_string()), ..Default::default() };
    ctx.services.ledger.update_event(event.id, &to_thursday).await.unwrap();

    // The old Monday lead times no longer fire
    ctx.clock.set(at("2026-10-05", 15, 30));
    assert_eq!(ctx.services.notifications.poll_and_dispatch().await.unwrap().processed, 0);

    ctx.clock.set(at("2026-10-07", 16, 0));
    let report = ctx.services.notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.sent, 1);
    let payload: serde_json::Value = serde_json::from_str(&ctx.sender.sent()[0].1).unwrap();
    let body = payload["body"].as_str().unwrap();
    assert!(body.contains("tomorrow"));
    assert!(body.contains("Thursday"));
}
