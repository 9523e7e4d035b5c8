//! Audit events: the immutable record of every security-relevant action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use std::fmt;
use std::str::FromStr;

use super::{ParseLabelError, Payload};
use crate::types::{AuditEventId, UserId};

/// Technique label used when an event type has no enrichment entry.
pub const TECHNIQUE_NOT_APPLICABLE: &str = "N/A";

macro_rules! event_types {
    ($($variant:ident => $label:literal),+ $(,)?) => {
        /// Known audit event types.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventType {
            $($variant),+
        }

        impl EventType {
            /// Every known event type, in declaration order.
            pub const ALL: &'static [EventType] = &[$(EventType::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EventType::$variant => $label),+
                }
            }
        }

        impl FromStr for EventType {
            type Err = ParseLabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(EventType::$variant),)+
                    other => Err(ParseLabelError::new("event type", other)),
                }
            }
        }
    };
}

event_types! {
    // Authentication
    LoginSuccess => "LOGIN_SUCCESS",
    LoginFailed => "LOGIN_FAILED",
    Logout => "LOGOUT",
    TokenRefresh => "TOKEN_REFRESH",
    PasswordChange => "PASSWORD_CHANGE",
    PasswordResetRequest => "PASSWORD_RESET_REQUEST",
    // Account
    AccountCreated => "ACCOUNT_CREATED",
    AccountLocked => "ACCOUNT_LOCKED",
    AccountUnlocked => "ACCOUNT_UNLOCKED",
    ProfileUpdate => "PROFILE_UPDATE",
    // Resource
    BookingCreated => "BOOKING_CREATED",
    BookingModified => "BOOKING_MODIFIED",
    BookingCancelled => "BOOKING_CANCELLED",
    PaymentInitiated => "PAYMENT_INITIATED",
    PaymentSuccess => "PAYMENT_SUCCESS",
    PaymentFailed => "PAYMENT_FAILED",
    // Security
    SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
    BruteForceDetected => "BRUTE_FORCE_DETECTED",
    RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
    UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
    SqlInjectionAttempt => "SQL_INJECTION_ATTEMPT",
    XssAttempt => "XSS_ATTEMPT",
    // Administration
    AdminLogin => "ADMIN_LOGIN",
    DataExport => "DATA_EXPORT",
    UserDeleted => "USER_DELETED",
    PermissionChange => "PERMISSION_CHANGE",
}

impl EventType {
    /// Severity tier assigned to this event type at write time.
    pub fn severity(&self) -> Severity {
        match self {
            EventType::BruteForceDetected
            | EventType::SqlInjectionAttempt
            | EventType::XssAttempt
            | EventType::AccountLocked => Severity::Critical,
            EventType::LoginFailed
            | EventType::UnauthorizedAccess
            | EventType::RateLimitExceeded
            | EventType::PaymentFailed => Severity::High,
            EventType::PasswordResetRequest | EventType::SuspiciousActivity => Severity::Medium,
            _ => Severity::Info,
        }
    }

    /// Standardized attacker-technique code for export enrichment.
    pub fn technique(&self) -> Option<&'static str> {
        match self {
            EventType::LoginFailed => Some("T1110 - Brute Force"),
            EventType::BruteForceDetected => Some("T1110.001 - Password Guessing"),
            EventType::SqlInjectionAttempt => Some("T1190 - Exploit Public-Facing Application"),
            EventType::XssAttempt => Some("T1059.007 - JavaScript"),
            EventType::UnauthorizedAccess => Some("T1078 - Valid Accounts"),
            EventType::RateLimitExceeded => Some("T1498 - Network Denial of Service"),
            _ => None,
        }
    }

    /// Event types counted by the rapid resource-creation rule.
    pub fn is_resource_creation(&self) -> bool {
        matches!(self, EventType::BookingCreated)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity for a raw event type label. Unknown labels (including the
/// `MULTIPLE_FAILED_PAYMENTS` rule name some producers emit) are handled here
/// rather than rejected.
pub fn classify_severity(event_type: &str) -> Severity {
    match event_type.parse::<EventType>() {
        Ok(known) => known.severity(),
        Err(_) if event_type == "MULTIPLE_FAILED_PAYMENTS" => Severity::Medium,
        Err(_) => Severity::Info,
    }
}

/// Technique code for a raw event type label, `N/A` when unmapped.
pub fn technique_for(event_type: &str) -> &'static str {
    event_type
        .parse::<EventType>()
        .ok()
        .and_then(|known| known.technique())
        .unwrap_or(TECHNIQUE_NOT_APPLICABLE)
}

/// Severity levels, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// CEF severity digit (0-10 scale).
    pub fn cef_digit(&self) -> u8 {
        match self {
            Severity::Info => 2,
            Severity::Low => 3,
            Severity::Medium => 5,
            Severity::High => 8,
            Severity::Critical => 10,
        }
    }

    /// Whether the summary line is mirrored at warning level.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted audit event. Created only by the audit sink, never mutated.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub event_type: String,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<UserId>,
    pub actor_email: Option<String>,
    /// Raw username submitted when no actor resolved (failed logins).
    pub username_attempted: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_method: Option<String>,
    pub request_path: Option<String>,
    pub request_id: String,
    pub description: String,
    pub extra_data: Json<Payload>,
    pub status_code: Option<i32>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
}

impl AuditEvent {
    /// Parsed event type, if it is one of the known labels.
    pub fn known_type(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    /// User label for exports: the actor's email or the attempted username.
    pub fn user_label(&self) -> Option<&str> {
        self.actor_email
            .as_deref()
            .or(self.username_attempted.as_deref())
    }
}
