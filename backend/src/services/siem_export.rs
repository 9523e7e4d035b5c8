//! SIEM export of recent audit events as JSON records or CEF lines.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::audit_event::{technique_for, AuditEvent, Severity};
use crate::models::{ParseLabelError, Payload};
use crate::repositories::AuditEventStore;

pub const DEFAULT_EXPORT_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Cef,
}

impl FromStr for ExportFormat {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "cef" => Ok(ExportFormat::Cef),
            _ => Err(ParseLabelError::new("export format", s)),
        }
    }
}

/// One event in the JSON export.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SiemRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub severity: Severity,
    pub source_ip: Option<String>,
    pub user: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub outcome: &'static str,
    pub details: Payload,
    pub mitre_technique: &'static str,
}

impl From<&AuditEvent> for SiemRecord {
    fn from(event: &AuditEvent) -> Self {
        Self {
            timestamp: event.occurred_at,
            event_type: event.event_type.clone(),
            severity: event.severity,
            source_ip: event.ip_address.clone(),
            user: event.user_label().map(str::to_string),
            action: event.request_method.clone(),
            resource: event.request_path.clone(),
            outcome: outcome(event.status_code),
            details: event.extra_data.0.clone(),
            mitre_technique: technique_for(&event.event_type),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ExportEnvelope {
    Json {
        format: &'static str,
        total: usize,
        logs: Vec<SiemRecord>,
    },
    Cef {
        format: &'static str,
        logs: Vec<String>,
    },
}

impl ExportEnvelope {
    pub fn len(&self) -> usize {
        match self {
            ExportEnvelope::Json { logs, .. } => logs.len(),
            ExportEnvelope::Cef { logs, .. } => logs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `success` only for a recorded status below 400.
pub fn outcome(status_code: Option<i32>) -> &'static str {
    match status_code {
        Some(code) if code < 400 => "success",
        _ => "failure",
    }
}

/// Renders one CEF line. Field values are written as stored.
pub fn cef_line(event: &AuditEvent, vendor: &str) -> String {
    format!(
        "CEF:0|{}|Security|1.0|{}|{}|{}|src={} duser={} request={}",
        vendor,
        event.event_type,
        event.description,
        event.severity.cef_digit(),
        event.ip_address.as_deref().unwrap_or_default(),
        event.user_label().unwrap_or_default(),
        event.request_path.as_deref().unwrap_or_default(),
    )
}

#[derive(Clone)]
pub struct SiemExporter {
    store: Arc<dyn AuditEventStore>,
    vendor: String,
    max_limit: i64,
}

impl SiemExporter {
    pub fn new(store: Arc<dyn AuditEventStore>, vendor: impl Into<String>, max_limit: i64) -> Self {
        Self {
            store,
            vendor: vendor.into(),
            max_limit,
        }
    }

    /// Newest events first. `limit` defaults to 100 and is clamped to the
    /// configured maximum.
    pub async fn export(
        &self,
        format: ExportFormat,
        limit: Option<i64>,
    ) -> Result<ExportEnvelope, StoreError> {
        let limit = limit
            .unwrap_or(DEFAULT_EXPORT_LIMIT)
            .clamp(0, self.max_limit.max(0));
        let events = self.store.recent(limit).await?;
        let envelope = match format {
            ExportFormat::Json => {
                let logs: Vec<SiemRecord> = events.iter().map(SiemRecord::from).collect();
                ExportEnvelope::Json {
                    format: "JSON-SIEM",
                    total: logs.len(),
                    logs,
                }
            }
            ExportFormat::Cef => ExportEnvelope::Cef {
                format: "CEF",
                logs: events
                    .iter()
                    .map(|event| cef_line(event, &self.vendor))
                    .collect(),
            },
        };
        Ok(envelope)
    }
}
