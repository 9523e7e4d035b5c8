//! Audit event ingestion.
//!
//! Every security-relevant action enters the system through [`AuditSink::log`],
//! which classifies it, persists it and mirrors a summary line on the
//! `security` tracing target for downstream SIEM collectors.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::middleware::request_id::RequestId;
use crate::models::audit_event::{classify_severity, AuditEvent, EventType};
use crate::models::{Actor, Payload};
use crate::repositories::AuditEventStore;
use crate::types::AuditEventId;
use crate::utils::network::{client_ip, user_agent};
use crate::utils::time::Clock;

/// Network and request context of the request that produced an event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    /// Identity already resolved for the request, if any.
    pub actor: Option<Actor>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
}

impl RequestContext {
    /// Captures context from request parts. The peer address comes from
    /// `ConnectInfo`, the identity from the `Actor` extension set by `identify`.
    pub fn from_parts(parts: &Parts) -> Self {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        Self {
            ip: client_ip(&parts.headers, peer),
            user_agent: user_agent(&parts.headers),
            method: Some(parts.method.to_string()),
            path: Some(parts.uri.path().to_string()),
            actor: parts.extensions.get::<Actor>().cloned(),
            session_id: None,
            correlation_id: parts
                .extensions
                .get::<RequestId>()
                .map(|id| id.0.clone()),
        }
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestContext::from_parts(parts))
    }
}

/// What happened, as reported by the producer of an event.
#[derive(Debug, Clone, Default)]
pub struct EventDescriptor {
    /// Raw label; unknown labels are stored with INFO severity.
    pub event_type: String,
    pub context: Option<RequestContext>,
    pub actor: Option<Actor>,
    pub username_attempted: Option<String>,
    pub description: String,
    pub extra_data: Payload,
    pub status_code: Option<u16>,
}

impl EventDescriptor {
    pub fn new(event_type: EventType, description: impl Into<String>) -> Self {
        Self::with_label(event_type.as_str(), description)
    }

    pub fn with_label(event_type: &str, description: impl Into<String>) -> Self {
        Self {
            event_type: event_type.to_string(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn username_attempted(mut self, username: impl Into<String>) -> Self {
        self.username_attempted = Some(username.into());
        self
    }

    pub fn extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra_data.insert(key.to_string(), value.into());
        self
    }

    pub fn status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn AuditEventStore>,
    clock: Arc<dyn Clock>,
}

impl AuditSink {
    pub fn new(store: Arc<dyn AuditEventStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persists the event and mirrors it to the log channel. Storage errors
    /// are returned to the caller.
    pub async fn log(&self, descriptor: EventDescriptor) -> Result<AuditEvent, StoreError> {
        let event = self.build_event(descriptor);
        self.store.insert(&event).await?;
        mirror(&event);
        Ok(event)
    }

    fn build_event(&self, descriptor: EventDescriptor) -> AuditEvent {
        let context = descriptor.context.unwrap_or_default();
        let actor = descriptor.actor.or(context.actor);
        AuditEvent {
            id: AuditEventId::new(),
            severity: classify_severity(&descriptor.event_type),
            event_type: descriptor.event_type,
            occurred_at: self.clock.now(),
            actor_id: actor.as_ref().map(|actor| actor.id),
            actor_email: actor.map(|actor| actor.email),
            username_attempted: descriptor.username_attempted,
            ip_address: context.ip,
            user_agent: context.user_agent,
            request_method: context.method,
            request_path: context.path,
            request_id: Uuid::new_v4().to_string(),
            description: descriptor.description,
            extra_data: sqlx::types::Json(descriptor.extra_data),
            status_code: descriptor.status_code.map(i32::from),
            session_id: context.session_id,
            correlation_id: context.correlation_id,
        }
    }
}

fn mirror(event: &AuditEvent) {
    let ip = event.ip_address.as_deref().unwrap_or("None");
    let user = event.user_label().unwrap_or("None");
    let severity = event.severity.as_str();
    if event.severity.is_elevated() {
        tracing::warn!(
            target: "security",
            event_type = %event.event_type,
            severity,
            ip,
            user,
            request_id = %event.request_id,
            "[{}] {} | IP: {} | User: {} | {}",
            severity,
            event.event_type,
            ip,
            user,
            event.description
        );
    } else {
        tracing::info!(
            target: "security",
            event_type = %event.event_type,
            severity,
            ip,
            user,
            request_id = %event.request_id,
            "[{}] {} | IP: {} | User: {} | {}",
            severity,
            event.event_type,
            ip,
            user,
            event.description
        );
    }
}
