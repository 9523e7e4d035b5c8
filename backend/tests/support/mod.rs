#![allow(dead_code)]
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use watchtower_backend::{
    config::Config,
    models::{audit_event::EventType, Actor},
    routes::build_router,
    services::{EventDescriptor, RequestContext},
    state::{AppState, Stores},
    types::UserId,
    repositories::{InMemoryAlertStore, InMemoryAuditEventStore, InMemoryBlockStore},
    utils::{jwt::create_access_token, time::ManualClock},
};

pub const TEST_JWT_SECRET: &str = "test-secret";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

pub fn test_config() -> Config {
    Config {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..Config::default()
    }
}

/// Application state over in-memory stores and a manual clock.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub events: Arc<InMemoryAuditEventStore>,
    pub alerts: Arc<InMemoryAlertStore>,
    pub blocks: Arc<InMemoryBlockStore>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let events = Arc::new(InMemoryAuditEventStore::new());
        let alerts = Arc::new(InMemoryAlertStore::new());
        let blocks = Arc::new(InMemoryBlockStore::new());
        let stores = Stores {
            events: events.clone(),
            alerts: alerts.clone(),
            blocks: blocks.clone(),
        };
        let state = AppState::new(config, stores, clock.clone()).expect("state");
        Self {
            clock,
            events,
            alerts,
            blocks,
            state,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn events_of_type(&self, event_type: EventType) -> usize {
        self.events
            .all()
            .iter()
            .filter(|event| event.event_type == event_type.as_str())
            .count()
    }

    pub async fn failed_login(&self, ip: &str) {
        self.state
            .monitor
            .record(
                EventDescriptor::new(EventType::LoginFailed, "Invalid credentials")
                    .context(context(ip, "/api/auth/login/"))
                    .username_attempted("guest@example.com"),
            )
            .await
            .expect("record failed login");
    }
}

pub fn context(ip: &str, path: &str) -> RequestContext {
    RequestContext {
        ip: Some(ip.to_string()),
        method: Some("POST".to_string()),
        path: Some(path.to_string()),
        ..RequestContext::default()
    }
}

pub fn actor(email: &str, is_staff: bool) -> Actor {
    Actor {
        id: UserId::new(),
        email: email.to_string(),
        is_staff,
    }
}

pub fn bearer(actor: &Actor) -> String {
    let token = create_access_token(actor, TEST_JWT_SECRET, 1).expect("token");
    format!("Bearer {}", token)
}

pub fn get(uri: &str, ip: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", ip)
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
