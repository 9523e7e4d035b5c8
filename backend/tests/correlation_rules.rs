use chrono::Duration;
use serde_json::json;
use tokio::task::JoinSet;
use watchtower_backend::{
    models::{alert::AlertType, audit_event::{EventType, Severity}},
    services::EventDescriptor,
};

#[path = "support/mod.rs"]
mod support;

use support::{actor, context, Harness};

const ATTACKER: &str = "203.0.113.50";

#[tokio::test]
async fn brute_force_fires_on_the_fifth_failure_and_blocks_for_an_hour() {
    let harness = Harness::new();

    for _ in 0..4 {
        harness.failed_login(ATTACKER).await;
    }
    assert!(harness.alerts.all().is_empty());
    assert!(!harness.state.blocks.check(ATTACKER).await.unwrap());

    harness.failed_login(ATTACKER).await;

    let alerts = harness.alerts.all();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.alert_type, AlertType::BruteForce);
    assert_eq!(alert.severity, Severity::High);
    assert_eq!(alert.source_ip.as_deref(), Some(ATTACKER));
    assert_eq!(alert.evidence.0["failed_attempts"], json!(5));
    assert_eq!(alert.evidence.0["mitre_technique"], json!("T1110.001"));
    assert_eq!(alert.related_event_ids.len(), 1);
    assert!(harness.state.blocks.check(ATTACKER).await.unwrap());

    harness.clock.advance(Duration::minutes(59));
    assert!(harness.state.blocks.check(ATTACKER).await.unwrap());

    harness.clock.advance(Duration::minutes(1));
    assert!(!harness.state.blocks.check(ATTACKER).await.unwrap());
}

#[tokio::test]
async fn brute_force_alerts_are_not_duplicated_while_open() {
    let harness = Harness::new();

    for _ in 0..6 {
        harness.failed_login(ATTACKER).await;
    }

    assert_eq!(harness.alerts.all().len(), 1);
    assert_eq!(harness.blocks.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_raise_one_alert_and_one_block() {
    let harness = Harness::new();

    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let state = harness.state.clone();
        tasks.spawn(async move {
            state
                .monitor
                .record(
                    EventDescriptor::new(EventType::LoginFailed, "Invalid credentials")
                        .context(context(ATTACKER, "/api/auth/login/")),
                )
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task").expect("record failed login");
    }

    assert_eq!(harness.events_of_type(EventType::LoginFailed), 16);
    let alerts = harness.alerts.all();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::BruteForce);
    assert_eq!(harness.blocks.len(), 1);
    assert!(harness.state.blocks.check(ATTACKER).await.unwrap());
}

#[tokio::test]
async fn failures_from_other_addresses_are_counted_separately() {
    let harness = Harness::new();

    for _ in 0..3 {
        harness.failed_login(ATTACKER).await;
        harness.failed_login("198.51.100.9").await;
    }

    assert!(harness.alerts.all().is_empty());
}

#[tokio::test]
async fn failures_outside_the_window_do_not_count() {
    let harness = Harness::new();

    for _ in 0..4 {
        harness.failed_login(ATTACKER).await;
    }
    harness.clock.advance(Duration::minutes(11));
    harness.failed_login(ATTACKER).await;

    assert!(harness.alerts.all().is_empty());
}

#[tokio::test]
async fn account_enumeration_fires_above_ten_auth_requests() {
    let harness = Harness::new();
    let refresh = || {
        EventDescriptor::new(EventType::TokenRefresh, "Token refreshed")
            .context(context(ATTACKER, "/api/auth/token/refresh/"))
    };

    for _ in 0..10 {
        let recorded = harness.state.monitor.record(refresh()).await.unwrap();
        assert!(recorded.alerts.is_empty());
    }

    let recorded = harness.state.monitor.record(refresh()).await.unwrap();
    assert_eq!(recorded.alerts.len(), 1);
    let alert = &recorded.alerts[0];
    assert_eq!(alert.alert_type, AlertType::AccountEnumeration);
    assert_eq!(alert.evidence.0["request_count"], json!(11));
    assert_eq!(alert.evidence.0["endpoint"], json!("/api/auth/"));
    assert_eq!(
        alert.description,
        format!("Account enumeration detected: 11 auth requests from {}", ATTACKER)
    );
    assert!(harness.blocks.is_empty());
}

#[tokio::test]
async fn rapid_resource_creation_fires_on_the_fourth_booking() {
    let harness = Harness::new();
    let guest = actor("guest@example.com", false);
    let booking = || {
        EventDescriptor::new(EventType::BookingCreated, "Booking created")
            .context(context("192.0.2.44", "/api/bookings/"))
            .actor(guest.clone())
    };

    for _ in 0..3 {
        let recorded = harness.state.monitor.record(booking()).await.unwrap();
        assert!(recorded.alerts.is_empty());
    }
    assert_eq!(harness.events_of_type(EventType::SuspiciousActivity), 0);

    let recorded = harness.state.monitor.record(booking()).await.unwrap();
    assert_eq!(recorded.alerts.len(), 1);
    let alert = &recorded.alerts[0];
    assert_eq!(alert.alert_type, AlertType::RapidBooking);
    assert_eq!(alert.severity, Severity::Medium);
    assert_eq!(alert.affected_user, Some(guest.id));
    assert_eq!(alert.source_ip, None);
    assert_eq!(
        alert.description,
        "Unusual booking pattern: 4 bookings in 1 hour by guest@example.com"
    );

    let follow_ups: Vec<_> = harness
        .events
        .all()
        .into_iter()
        .filter(|event| event.event_type == "SUSPICIOUS_ACTIVITY")
        .collect();
    assert_eq!(follow_ups.len(), 1);
    assert_eq!(follow_ups[0].actor_id, Some(guest.id));
    assert_eq!(
        follow_ups[0].description,
        "Rapid booking pattern detected: 4 in 1h"
    );

    let recorded = harness.state.monitor.record(booking()).await.unwrap();
    assert!(recorded.alerts.is_empty());
    assert_eq!(harness.events_of_type(EventType::SuspiciousActivity), 1);
}

#[tokio::test]
async fn bookings_without_an_actor_are_not_correlated() {
    let harness = Harness::new();

    for _ in 0..5 {
        harness
            .state
            .monitor
            .record(
                EventDescriptor::new(EventType::BookingCreated, "Booking created")
                    .context(context("192.0.2.44", "/api/bookings/")),
            )
            .await
            .unwrap();
    }

    assert!(harness.alerts.all().is_empty());
}

#[tokio::test]
async fn rule_failures_do_not_fail_the_write() {
    let harness = Harness::new();
    harness.alerts.set_unavailable(true);

    for _ in 0..5 {
        harness.failed_login(ATTACKER).await;
    }

    assert_eq!(harness.events_of_type(EventType::LoginFailed), 5);
    assert!(harness.alerts.all().is_empty());
}
