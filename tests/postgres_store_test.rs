//! PostgreSQL store tests
//!
//! Need Docker or `TEST_DATABASE_URL`; run with `cargo test -- --ignored`.

mod helpers;

use assert_matches::assert_matches;
use helpers::*;
use serial_test::serial;
use ShiftPool::database::{EventStore, NotificationStore, SettingsStore, Whitelist};
use ShiftPool::models::{ApplyTemplateResult, EnrollPolicy, RegisterResult, SaveTemplateRequest, UpdateEventRequest};
use ShiftPool::services::{DisplayTransition, EnrollOutcome, RejectReason, TemporalPolicy};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_pg_concurrent_enrollment_respects_capacity() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let ctx = TestContext::with_stores(db.service().stores(), TemporalPolicy::FailOpen).await;
    let event = ctx.services.ledger.create_event(monday_shift(3)).await.unwrap();

    let logins: Vec<String> = (0..16).map(|i| format!("volunteer{:02}", i)).collect();
    for login in &logins {
        ctx.services.ledger.whitelist_add(login).await.unwrap();
    }

    let handles: Vec<_> = logins
        .into_iter()
        .map(|login| {
            let ledger = ctx.services.ledger.clone();
            tokio::spawn(async move { ledger.enroll(event.id, &login).await })
        })
        .collect();

    let mut enrolled = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            EnrollOutcome::Enrolled(_) => enrolled += 1,
            EnrollOutcome::Rejected(reason) => assert_eq!(reason, RejectReason::EventFull),
        }
    }
    assert_eq!(enrolled, 3);
    assert_eq!(db.count_records("registrations").await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_pg_weekly_cap_under_concurrency() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let stores = db.service().stores();

    let mut ids = Vec::new();
    for weekday in ["Monday", "Tuesday", "Wednesday", "Thursday"] {
        let event = stores
            .events
            .create_event(&shift(1, weekday, "09:00", "10:00", 5))
            .await
            .unwrap();
        ids.push(event.id);
    }

    let policy = EnrollPolicy::self_service(1);
    let handles: Vec<_> = ids
        .iter()
        .map(|&id| {
            let events = stores.events.clone();
            tokio::spawn(async move { events.register(id, "alice", &policy).await })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RegisterResult::Inserted(_) => inserted += 1,
            other => assert_eq!(other, RegisterResult::WeeklyCapReached { limit: 1 }),
        }
    }
    assert_eq!(inserted, 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_pg_registration_lifecycle() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let stores = db.service().stores();
    let event = stores.events.create_event(&monday_shift(1)).await.unwrap();
    let policy = EnrollPolicy::self_service(0);

    assert_matches!(stores.events.register(event.id, "alice", &policy).await.unwrap(), RegisterResult::Inserted(_));
    assert_eq!(
        stores.events.register(event.id, "alice", &policy).await.unwrap(),
        RegisterResult::AlreadyRegistered
    );
    assert_eq!(
        stores.events.register(event.id, "bob", &policy).await.unwrap(),
        RegisterResult::EventFull { max_slots: 1 }
    );
    assert_matches!(
        stores.events.register(event.id, "bob", &EnrollPolicy::admin_override()).await.unwrap(),
        RegisterResult::Inserted(_)
    );
    assert_eq!(stores.events.register(424242, "bob", &policy).await.unwrap(), RegisterResult::EventMissing);

    assert_eq!(stores.events.set_attendance(event.id, "bob", false).await.unwrap(), 1);
    let counts = stores.events.count_registrations(event.id).await.unwrap();
    assert_eq!((counts.enrolled, counts.attended), (2, 1));

    let removed = stores.events.remove_registration(event.id, "alice").await.unwrap();
    assert_eq!(removed.map(|r| r.participant), Some("alice".to_string()));
    assert!(stores.events.remove_registration(event.id, "alice").await.unwrap().is_none());

    assert!(stores.events.delete_event(event.id).await.unwrap());
    assert_eq!(db.count_records("registrations").await.unwrap(), 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_pg_settings_compare_and_set() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let settings = db.service().stores().settings;

    assert!(settings.insert_if_absent("display_week", "1").await.unwrap());
    assert!(!settings.insert_if_absent("display_week", "3").await.unwrap());
    assert!(settings.compare_and_set("display_week", "1", "2").await.unwrap());
    assert!(!settings.compare_and_set("display_week", "1", "2").await.unwrap());
    assert_eq!(settings.get("display_week").await.unwrap().as_deref(), Some("2"));
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_pg_whitelist_is_case_insensitive() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let whitelist = db.service().stores().whitelist;

    assert!(whitelist.add("Alice").await.unwrap());
    assert!(!whitelist.add(" alice ").await.unwrap());
    assert!(whitelist.is_authorized("ALICE").await.unwrap());
    assert!(whitelist.remove("alice").await.unwrap());
    assert!(!whitelist.is_authorized("alice").await.unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_pg_notification_dispatch_and_purge() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let ctx = TestContext::with_stores(db.service().stores(), TemporalPolicy::FailOpen).await;
    ctx.services.notifications.subscribe("alice", &subscription("alice")).await.unwrap();
    // Same endpoint again only refreshes keys
    ctx.services.notifications.subscribe("alice", &subscription("alice")).await.unwrap();
    assert_eq!(ctx.stores.notifications.list_subscriptions("alice").await.unwrap().len(), 1);

    let event = ctx.services.ledger.create_event(monday_shift(2)).await.unwrap();
    ctx.services.ledger.enroll(event.id, "alice").await.unwrap();
    assert_eq!(db.count_records("scheduled_notifications").await.unwrap(), 2);

    ctx.clock.set(at("2026-10-05", 15, 30));
    let report = ctx.services.notifications.poll_and_dispatch().await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(ctx.sender.sent().len(), 2);

    ctx.clock.set(at("2026-10-20", 0, 0));
    assert_eq!(ctx.services.notifications.purge_stale().await.unwrap(), 2);
    assert_eq!(db.count_records("scheduled_notifications").await.unwrap(), 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_pg_display_week_advances_once() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let ctx = TestContext::with_stores(db.service().stores(), TemporalPolicy::FailOpen).await;
    ctx.services.ledger.create_event(monday_shift(2)).await.unwrap();
    ctx.services
        .ledger
        .create_event(shift(2, "Monday", "09:00", "10:00", 2))
        .await
        .unwrap();

    ctx.clock.set(at("2026-10-06", 0, 0));
    let (first, second) = tokio::join!(ctx.services.display.evaluate(), ctx.services.display.evaluate());
    let transitions = [first.unwrap(), second.unwrap()];
    let advanced = transitions
        .iter()
        .filter(|transition| matches!(transition, DisplayTransition::Advanced { .. }))
        .count();
    assert_eq!(advanced, 1);
    assert_eq!(ctx.services.settings.load().await.unwrap().display_week, 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_pg_single_digit_hours_are_stored_padded() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let ctx = TestContext::with_stores(db.service().stores(), TemporalPolicy::FailOpen).await;

    let event = ctx
        .services
        .ledger
        .create_event(shift(1, "Monday", "9:00", "10:00", 2))
        .await
        .unwrap();
    assert_eq!((event.start_time.as_str(), event.end_time.as_str()), ("09:00", "10:00"));

    let update = UpdateEventRequest { start_time: Some("8:00".to_string()), ..Default::default() };
    assert_eq!(ctx.services.ledger.update_event(event.id, &update).await.unwrap().start_time, "08:00");
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_pg_apply_template_overwrites_week() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let ctx = TestContext::with_stores(db.service().stores(), TemporalPolicy::FailOpen).await;
    let ledger = &ctx.services.ledger;

    let template = ledger
        .save_template(SaveTemplateRequest {
            name: "Standard week".to_string(),
            description: Some("Desk and cluster".to_string()),
            target_week: 2,
            events: vec![shift(2, "Monday", "9:00", "12:00", 2), shift(2, "Friday", "14:00", "16:00", 1)],
        })
        .await
        .unwrap();
    assert_eq!(ledger.templates().await.unwrap()[0].event_count, 2);

    let existing = ledger.create_event(shift(2, "Tuesday", "10:00", "11:00", 1)).await.unwrap();
    ledger.enroll(existing.id, "alice").await.unwrap();
    assert_eq!(
        ledger.apply_template(template.id, false).await.unwrap(),
        ApplyTemplateResult::WeekNotEmpty { existing: 1 }
    );

    let ApplyTemplateResult::Applied { deleted, created, .. } = ledger.apply_template(template.id, true).await.unwrap() else {
        panic!("expected template to apply");
    };
    assert_eq!(deleted, vec![existing.id]);
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].start_time, "09:00");
    assert_eq!(db.count_records("registrations").await.unwrap(), 0);
    assert_eq!(db.count_records("events").await.unwrap(), 2);

    ledger.delete_template(template.id).await.unwrap();
    assert_eq!(db.count_records("template_events").await.unwrap(), 0);
    assert_eq!(ledger.delete_day_events(2, "monday").await.unwrap(), 1);
    assert_eq!(ledger.delete_all_events().await.unwrap(), 1);
}
