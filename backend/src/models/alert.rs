//! Alerts raised by the correlation engine and their operator lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use std::fmt;
use uuid::Uuid;

use super::{audit_event::Severity, Payload};
use crate::types::{AlertId, UserId};

/// Findings the correlation engine can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    BruteForce,
    CredentialStuffing,
    UnusualLocation,
    RapidBooking,
    MassDataAccess,
    AfterHoursAccess,
    MultipleFailedPayments,
    AccountEnumeration,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::BruteForce => "BRUTE_FORCE",
            AlertType::CredentialStuffing => "CREDENTIAL_STUFFING",
            AlertType::UnusualLocation => "UNUSUAL_LOCATION",
            AlertType::RapidBooking => "RAPID_BOOKING",
            AlertType::MassDataAccess => "MASS_DATA_ACCESS",
            AlertType::AfterHoursAccess => "AFTER_HOURS_ACCESS",
            AlertType::MultipleFailedPayments => "MULTIPLE_FAILED_PAYMENTS",
            AlertType::AccountEnumeration => "ACCOUNT_ENUMERATION",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert lifecycle. Alerts are created `OPEN`; everything after that is
/// driven by operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "OPEN",
            AlertStatus::Investigating => "INVESTIGATING",
            AlertStatus::Resolved => "RESOLVED",
            AlertStatus::FalsePositive => "FALSE_POSITIVE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::FalsePositive)
    }

    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        match (self, next) {
            (AlertStatus::Open, AlertStatus::Investigating) => true,
            (AlertStatus::Open | AlertStatus::Investigating, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who or what an alert is about; alerts are deduplicated per subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertSubject {
    SourceIp(String),
    User(UserId),
}

impl AlertSubject {
    /// Stable key used for advisory locking and in-memory dedup.
    pub fn dedup_key(&self, alert_type: AlertType) -> String {
        match self {
            AlertSubject::SourceIp(ip) => format!("{}:ip:{}", alert_type, ip),
            AlertSubject::User(user_id) => format!("{}:user:{}", alert_type, user_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Alert {
    pub id: AlertId,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub status: AlertStatus,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub source_ip: Option<String>,
    pub affected_user: Option<UserId>,
    pub description: String,
    pub evidence: Json<Payload>,
    pub recommended_action: String,
    pub related_event_ids: Vec<Uuid>,
}

impl Alert {
    /// Builds a fresh `OPEN` alert.
    pub fn open(
        alert_type: AlertType,
        severity: Severity,
        subject: &AlertSubject,
        description: String,
        evidence: Payload,
        recommended_action: &str,
        triggered_at: DateTime<Utc>,
    ) -> Self {
        let (source_ip, affected_user) = match subject {
            AlertSubject::SourceIp(ip) => (Some(ip.clone()), None),
            AlertSubject::User(user_id) => (None, Some(*user_id)),
        };
        Self {
            id: AlertId::new(),
            alert_type,
            severity,
            status: AlertStatus::Open,
            triggered_at,
            resolved_at: None,
            source_ip,
            affected_user,
            description,
            evidence: Json(evidence),
            recommended_action: recommended_action.to_string(),
            related_event_ids: Vec::new(),
        }
    }

    pub fn subject(&self) -> Option<AlertSubject> {
        match (&self.source_ip, self.affected_user) {
            (Some(ip), _) => Some(AlertSubject::SourceIp(ip.clone())),
            (None, Some(user_id)) => Some(AlertSubject::User(user_id)),
            (None, None) => None,
        }
    }
}
