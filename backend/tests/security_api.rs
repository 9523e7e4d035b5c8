use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use watchtower_backend::models::audit_event::EventType;

#[path = "support/mod.rs"]
mod support;

use support::{actor, bearer, get, json_body, Harness};

const ADMIN_IP: &str = "192.0.2.200";
const ATTACKER: &str = "203.0.113.50";

fn staff_bearer() -> String {
    bearer(&actor("ops@example.com", true))
}

fn json_request(method: &str, uri: &str, ip: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", ip)
        .header("authorization", staff_bearer())
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_is_open() {
    let harness = Harness::new();
    let response = harness
        .router()
        .oneshot(get("/health", "192.0.2.1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    assert!(harness.events.all().is_empty());
}

#[tokio::test]
async fn blocked_addresses_are_rejected_and_recorded() {
    let harness = Harness::new();
    harness
        .state
        .blocks
        .block(ATTACKER, "scanner", None, false)
        .await
        .unwrap();

    let response = harness
        .router()
        .oneshot(
            get("/health", ATTACKER)
                .header("x-request-id", "req-blocked-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-blocked-1"
    );
    assert_eq!(json_body(response).await, json!({ "error": "Access denied" }));

    let events = harness.events.all();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "UNAUTHORIZED_ACCESS");
    assert_eq!(
        events[0].description,
        format!("Blocked IP attempted access: {}", ATTACKER)
    );
    assert_eq!(events[0].correlation_id.as_deref(), Some("req-blocked-1"));
}

#[tokio::test]
async fn blocked_addresses_are_rejected_even_with_a_valid_token() {
    let harness = Harness::new();
    harness
        .state
        .blocks
        .block(ATTACKER, "scanner", None, false)
        .await
        .unwrap();

    let response = harness
        .router()
        .oneshot(
            get("/api/security/dashboard", ATTACKER)
                .header("authorization", staff_bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await, json!({ "error": "Access denied" }));
    let events = harness.events.all();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "UNAUTHORIZED_ACCESS");
    assert_eq!(events[0].actor_email.as_deref(), Some("ops@example.com"));
}

#[tokio::test]
async fn sql_injection_in_the_query_is_rejected() {
    let harness = Harness::new();
    let response = harness
        .router()
        .oneshot(
            get("/health?q=1%27%20OR%201=1", ATTACKER)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "Malicious request detected" })
    );
    assert_eq!(harness.events_of_type(EventType::SqlInjectionAttempt), 1);
    let event = &harness.events.all()[0];
    assert_eq!(event.ip_address.as_deref(), Some(ATTACKER));
    assert!(event.extra_data.0["preview"]
        .as_str()
        .unwrap()
        .contains("%27"));
}

#[tokio::test]
async fn script_tags_in_the_body_are_rejected_before_authentication() {
    let harness = Harness::new();
    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/security/block-ip")
                .header("x-forwarded-for", ATTACKER)
                .header("content-type", "application/json")
                .body(Body::from(r#"{"reason":"<script>alert(1)</script>"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.events_of_type(EventType::XssAttempt), 1);
    assert_eq!(harness.events_of_type(EventType::UnauthorizedAccess), 0);
}

#[tokio::test]
async fn padded_bodies_are_still_inspected_up_to_the_limit() {
    let harness = Harness::new();
    let body = format!(
        r#"{{"reason":"' OR 1=1 --","pad":"{}"}}"#,
        "a".repeat(70 * 1024)
    );

    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/security/block-ip")
                .header("x-forwarded-for", ATTACKER)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.events_of_type(EventType::SqlInjectionAttempt), 1);
    let partial: Vec<_> = harness
        .events
        .all()
        .into_iter()
        .filter(|event| event.event_type == "SUSPICIOUS_ACTIVITY")
        .collect();
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].extra_data.0["guard"], json!("signature"));
}

#[tokio::test]
async fn block_list_outage_lets_requests_through() {
    let harness = Harness::new();
    harness.blocks.set_unavailable(true);

    let response = harness
        .router()
        .oneshot(get("/health", ATTACKER).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let events = harness.events.all();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "SUSPICIOUS_ACTIVITY");
    assert_eq!(events[0].extra_data.0["guard"], json!("blocklist"));
}

#[tokio::test]
async fn admin_routes_require_a_staff_identity() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(
            get("/api/security/dashboard", "198.51.100.20")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = harness
        .router()
        .oneshot(
            get("/api/security/dashboard", "198.51.100.20")
                .header("authorization", bearer(&actor("guest@example.com", false)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = harness
        .router()
        .oneshot(
            get("/api/security/dashboard", "198.51.100.20")
                .header("authorization", "Bearer not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let events = harness.events.all();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].event_type, "UNAUTHORIZED_ACCESS");
    assert_eq!(events[0].status_code, Some(401));
    assert_eq!(
        events[0].description,
        "HTTP 401 on /api/security/dashboard"
    );
    assert_eq!(events[1].event_type, "SUSPICIOUS_ACTIVITY");
    assert_eq!(events[1].status_code, Some(403));
    assert_eq!(events[1].actor_email.as_deref(), Some("guest@example.com"));
}

#[tokio::test]
async fn dashboard_summarises_detections() {
    let harness = Harness::new();
    for _ in 0..5 {
        harness.failed_login(ATTACKER).await;
    }

    let response = harness
        .router()
        .oneshot(
            get("/api/security/dashboard", ADMIN_IP)
                .header("authorization", staff_bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["summary"]["open_alerts"], json!(1));
    assert_eq!(body["summary"]["failed_logins_24h"], json!(5));
    assert_eq!(body["summary"]["blocked_ips"], json!(1));
    assert_eq!(body["summary"]["total_alerts_24h"], json!(1));
    assert_eq!(body["top_suspicious_ips"][0]["label"], json!(ATTACKER));
    assert_eq!(body["top_suspicious_ips"][0]["count"], json!(5));
    assert_eq!(body["recent_alerts"][0]["alert_type"], json!("BRUTE_FORCE"));
}

#[tokio::test]
async fn manual_block_is_created_then_updated() {
    let harness = Harness::new();
    let payload = json!({ "ip_address": "203.0.113.9", "reason": "scanner" });

    let response = harness
        .router()
        .oneshot(json_request("POST", "/api/security/block-ip", ADMIN_IP, payload.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "message": "IP 203.0.113.9 has been blocked", "created": true })
    );

    let response = harness
        .router()
        .oneshot(json_request("POST", "/api/security/block-ip", ADMIN_IP, payload))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["created"], json!(false));

    assert_eq!(harness.blocks.len(), 1);
    assert!(harness.state.blocks.check("203.0.113.9").await.unwrap());
    assert_eq!(harness.events_of_type(EventType::SuspiciousActivity), 2);
}

#[tokio::test]
async fn manual_block_rejects_invalid_addresses() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(json_request(
            "POST",
            "/api/security/block-ip",
            ADMIN_IP,
            json!({ "ip_address": "not-an-ip" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], json!("VALIDATION_ERROR"));
    assert!(harness.blocks.is_empty());
}

#[tokio::test]
async fn alert_status_follows_the_workflow() {
    let harness = Harness::new();
    for _ in 0..5 {
        harness.failed_login(ATTACKER).await;
    }
    let alert_id = harness.alerts.all()[0].id.to_string();
    let uri = format!("/api/security/alerts/{}", alert_id);

    let response = harness
        .router()
        .oneshot(json_request("PATCH", &uri, ADMIN_IP, json!({ "status": "INVESTIGATING" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], json!("INVESTIGATING"));
    assert_eq!(body["resolved_at"], Value::Null);

    let response = harness
        .router()
        .oneshot(json_request("PATCH", &uri, ADMIN_IP, json!({ "status": "OPEN" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = harness
        .router()
        .oneshot(json_request("PATCH", &uri, ADMIN_IP, json!({ "status": "RESOLVED" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], json!("RESOLVED"));
    assert!(body["resolved_at"].is_string());

    let response = harness
        .router()
        .oneshot(json_request("PATCH", &uri, ADMIN_IP, json!({ "status": "FALSE_POSITIVE" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn alert_status_rejects_unknown_or_malformed_targets() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(json_request(
            "PATCH",
            "/api/security/alerts/0b8f1f4e-6a55-4a53-9a51-2f1f3d6f0c11",
            ADMIN_IP,
            json!({ "status": "RESOLVED" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = harness
        .router()
        .oneshot(json_request(
            "PATCH",
            "/api/security/alerts/abc",
            ADMIN_IP,
            json!({ "status": "RESOLVED" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = harness
        .router()
        .oneshot(json_request(
            "PATCH",
            "/api/security/alerts/0b8f1f4e-6a55-4a53-9a51-2f1f3d6f0c11",
            ADMIN_IP,
            json!({ "status": "CLOSED" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_is_audited() {
    let harness = Harness::new();
    harness.failed_login(ATTACKER).await;

    let response = harness
        .router()
        .oneshot(
            get("/api/security/export?format=cef&limit=5", ADMIN_IP)
                .header("authorization", staff_bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["format"], json!("CEF"));
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);

    let exports: Vec<_> = harness
        .events
        .all()
        .into_iter()
        .filter(|event| event.event_type == "DATA_EXPORT")
        .collect();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].description, "SIEM export of 1 records (cef)");
    assert_eq!(exports[0].actor_email.as_deref(), Some("ops@example.com"));
}

#[tokio::test]
async fn export_rejects_unknown_formats() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(
            get("/api/security/export?format=xml", ADMIN_IP)
                .header("authorization", staff_bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.events_of_type(EventType::DataExport), 0);
}
