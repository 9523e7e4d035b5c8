//! Threshold correlation rules.
//!
//! Rules run inline right after the triggering event is stored. Each rule
//! counts qualifying events in a trailing window and, once its threshold is
//! crossed, raises an alert through the alert store's atomic dedup insert.
//! Failures inside a rule are logged and swallowed so detection never breaks
//! the request that produced the event.

use chrono::Duration;
use serde_json::json;
use std::sync::Arc;

use super::audit_sink::{AuditSink, EventDescriptor, RequestContext};
use super::block_registry::BlockRegistry;
use crate::error::StoreError;
use crate::models::alert::{Alert, AlertSubject, AlertType};
use crate::models::audit_event::{AuditEvent, EventType, Severity};
use crate::models::{Actor, Payload};
use crate::repositories::{AlertStore, AuditEventFilter, AuditEventStore};
use crate::types::UserId;
use crate::utils::time::Clock;

pub const BRUTE_FORCE_WINDOW_MINUTES: i64 = 10;
pub const BRUTE_FORCE_THRESHOLD: i64 = 5;
pub const BRUTE_FORCE_BLOCK_MINUTES: i64 = 60;
pub const BRUTE_FORCE_TECHNIQUE: &str = "T1110.001";

pub const ENUMERATION_WINDOW_MINUTES: i64 = 5;
/// Fires once the count exceeds this value.
pub const ENUMERATION_LIMIT: i64 = 10;
pub const ENUMERATION_TECHNIQUE: &str = "T1087";

pub const RAPID_CREATION_WINDOW_MINUTES: i64 = 60;
/// Fires once the count exceeds this value.
pub const RAPID_CREATION_LIMIT: i64 = 3;

const BRUTE_FORCE_ACTION: &str = "Block IP, notify admin, reset affected account password";
const ENUMERATION_ACTION: &str = "Block IP, investigate for credential stuffing";
const RAPID_CREATION_ACTION: &str = "Review bookings, verify user identity, check for fraud";

#[derive(Clone)]
pub struct CorrelationEngine {
    events: Arc<dyn AuditEventStore>,
    alerts: Arc<dyn AlertStore>,
    blocks: BlockRegistry,
    sink: AuditSink,
    clock: Arc<dyn Clock>,
    auth_path_prefix: String,
}

impl CorrelationEngine {
    pub fn new(
        events: Arc<dyn AuditEventStore>,
        alerts: Arc<dyn AlertStore>,
        blocks: BlockRegistry,
        sink: AuditSink,
        clock: Arc<dyn Clock>,
        auth_path_prefix: impl Into<String>,
    ) -> Self {
        Self {
            events,
            alerts,
            blocks,
            sink,
            clock,
            auth_path_prefix: auth_path_prefix.into(),
        }
    }

    /// Runs every rule the event qualifies for and returns the alerts raised.
    pub async fn evaluate(&self, event: &AuditEvent) -> Vec<Alert> {
        let mut raised = Vec::new();
        let known = event.known_type();

        if let Some(ip) = event.ip_address.as_deref() {
            if known == Some(EventType::LoginFailed) {
                raised.extend(self.check_brute_force(ip, Some(event)).await);
            }
            let hits_auth_endpoint = event
                .request_path
                .as_deref()
                .is_some_and(|path| path.contains(self.auth_path_prefix.as_str()));
            if hits_auth_endpoint {
                raised.extend(self.check_account_enumeration(ip, Some(event)).await);
            }
        }

        if known.is_some_and(|event_type| event_type.is_resource_creation()) {
            if let (Some(id), Some(email)) = (event.actor_id, event.actor_email.clone()) {
                let actor = Actor {
                    id,
                    email,
                    is_staff: false,
                };
                raised.extend(self.check_rapid_resource_creation(&actor, Some(event)).await);
            }
        }

        raised
    }

    /// Failed logins from one address: fires at 5 within 10 minutes and
    /// blocks the address for an hour.
    pub async fn check_brute_force(&self, ip: &str, trigger: Option<&AuditEvent>) -> Option<Alert> {
        match self.brute_force(ip, trigger).await {
            Ok(alert) => alert,
            Err(err) => {
                tracing::error!(error = %err, ip_address = %ip, "brute force rule failed");
                None
            }
        }
    }

    /// Requests against authentication endpoints from one address: fires
    /// above 10 within 5 minutes. Never blocks.
    pub async fn check_account_enumeration(
        &self,
        ip: &str,
        trigger: Option<&AuditEvent>,
    ) -> Option<Alert> {
        match self.account_enumeration(ip, trigger).await {
            Ok(alert) => alert,
            Err(err) => {
                tracing::error!(error = %err, ip_address = %ip, "account enumeration rule failed");
                None
            }
        }
    }

    /// Resource creations by one user: fires above 3 within an hour and
    /// records a follow-up SUSPICIOUS_ACTIVITY event.
    pub async fn check_rapid_resource_creation(
        &self,
        actor: &Actor,
        trigger: Option<&AuditEvent>,
    ) -> Option<Alert> {
        match self.rapid_resource_creation(actor, trigger).await {
            Ok(alert) => alert,
            Err(err) => {
                tracing::error!(error = %err, user_id = %actor.id, "rapid resource creation rule failed");
                None
            }
        }
    }

    async fn brute_force(
        &self,
        ip: &str,
        trigger: Option<&AuditEvent>,
    ) -> Result<Option<Alert>, StoreError> {
        let window_start = self.clock.now() - Duration::minutes(BRUTE_FORCE_WINDOW_MINUTES);
        let failed_attempts = self
            .events
            .count(&AuditEventFilter {
                since: Some(window_start),
                event_type: Some(EventType::LoginFailed.as_str().to_string()),
                ip_address: Some(ip.to_string()),
                ..AuditEventFilter::default()
            })
            .await?;
        if failed_attempts < BRUTE_FORCE_THRESHOLD {
            return Ok(None);
        }

        let mut evidence = Payload::new();
        evidence.insert("failed_attempts".into(), json!(failed_attempts));
        evidence.insert(
            "timewindow".into(),
            json!(format!("{} minutes", BRUTE_FORCE_WINDOW_MINUTES)),
        );
        evidence.insert("ip_address".into(), json!(ip));
        evidence.insert("mitre_technique".into(), json!(BRUTE_FORCE_TECHNIQUE));

        let alert = self.open_alert(
            AlertType::BruteForce,
            Severity::High,
            AlertSubject::SourceIp(ip.to_string()),
            format!(
                "Brute force detected: {} failed login attempts from {} in {} minutes",
                failed_attempts, ip, BRUTE_FORCE_WINDOW_MINUTES
            ),
            evidence,
            BRUTE_FORCE_ACTION,
            trigger,
        );
        let raised = self.alerts.insert_unless_open(&alert, window_start).await?;

        // A suppressed duplicate still re-applies a missing block.
        if raised || !self.blocks.check(ip).await? {
            self.blocks
                .block(
                    ip,
                    &format!("Brute force: {} failed attempts", failed_attempts),
                    Some(Duration::minutes(BRUTE_FORCE_BLOCK_MINUTES)),
                    true,
                )
                .await?;
        }

        Ok(raised.then_some(alert))
    }

    async fn account_enumeration(
        &self,
        ip: &str,
        trigger: Option<&AuditEvent>,
    ) -> Result<Option<Alert>, StoreError> {
        let window_start = self.clock.now() - Duration::minutes(ENUMERATION_WINDOW_MINUTES);
        let request_count = self
            .events
            .count(&AuditEventFilter {
                since: Some(window_start),
                ip_address: Some(ip.to_string()),
                path_contains: Some(self.auth_path_prefix.clone()),
                ..AuditEventFilter::default()
            })
            .await?;
        if request_count <= ENUMERATION_LIMIT {
            return Ok(None);
        }

        let mut evidence = Payload::new();
        evidence.insert("request_count".into(), json!(request_count));
        evidence.insert("endpoint".into(), json!(self.auth_path_prefix));
        evidence.insert("mitre_technique".into(), json!(ENUMERATION_TECHNIQUE));

        let alert = self.open_alert(
            AlertType::AccountEnumeration,
            Severity::High,
            AlertSubject::SourceIp(ip.to_string()),
            format!(
                "Account enumeration detected: {} auth requests from {}",
                request_count, ip
            ),
            evidence,
            ENUMERATION_ACTION,
            trigger,
        );
        let raised = self.alerts.insert_unless_open(&alert, window_start).await?;
        Ok(raised.then_some(alert))
    }

    async fn rapid_resource_creation(
        &self,
        actor: &Actor,
        trigger: Option<&AuditEvent>,
    ) -> Result<Option<Alert>, StoreError> {
        let window_start = self.clock.now() - Duration::minutes(RAPID_CREATION_WINDOW_MINUTES);
        let resource_count = self.count_resource_creations(actor.id, window_start).await?;
        if resource_count <= RAPID_CREATION_LIMIT {
            return Ok(None);
        }

        let mut evidence = Payload::new();
        evidence.insert("resource_count".into(), json!(resource_count));
        evidence.insert("timewindow".into(), json!("1 hour"));
        evidence.insert("user_email".into(), json!(actor.email));

        let alert = self.open_alert(
            AlertType::RapidBooking,
            Severity::Medium,
            AlertSubject::User(actor.id),
            format!(
                "Unusual booking pattern: {} bookings in 1 hour by {}",
                resource_count, actor.email
            ),
            evidence,
            RAPID_CREATION_ACTION,
            trigger,
        );
        if !self.alerts.insert_unless_open(&alert, window_start).await? {
            return Ok(None);
        }

        let mut follow_up = EventDescriptor::new(
            EventType::SuspiciousActivity,
            format!("Rapid booking pattern detected: {} in 1h", resource_count),
        )
        .actor(actor.clone())
        .extra("alert_id", alert.id.to_string());
        if let Some(trigger) = trigger {
            follow_up = follow_up.context(context_of(trigger));
        }
        self.sink.log(follow_up).await?;

        Ok(Some(alert))
    }

    async fn count_resource_creations(
        &self,
        user_id: UserId,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64, StoreError> {
        let mut total = 0;
        for event_type in EventType::ALL.iter().filter(|t| t.is_resource_creation()) {
            total += self
                .events
                .count(&AuditEventFilter {
                    since: Some(since),
                    event_type: Some(event_type.as_str().to_string()),
                    actor_id: Some(user_id),
                    ..AuditEventFilter::default()
                })
                .await?;
        }
        Ok(total)
    }

    #[allow(clippy::too_many_arguments)]
    fn open_alert(
        &self,
        alert_type: AlertType,
        severity: Severity,
        subject: AlertSubject,
        description: String,
        evidence: Payload,
        recommended_action: &str,
        trigger: Option<&AuditEvent>,
    ) -> Alert {
        let mut alert = Alert::open(
            alert_type,
            severity,
            &subject,
            description,
            evidence,
            recommended_action,
            self.clock.now(),
        );
        if let Some(trigger) = trigger {
            alert.related_event_ids.push(trigger.id.into());
        }
        alert
    }
}

/// Request context recovered from a stored event, for follow-up events.
fn context_of(event: &AuditEvent) -> RequestContext {
    RequestContext {
        ip: event.ip_address.clone(),
        user_agent: event.user_agent.clone(),
        method: event.request_method.clone(),
        path: event.request_path.clone(),
        actor: None,
        session_id: event.session_id.clone(),
        correlation_id: event.correlation_id.clone(),
    }
}
