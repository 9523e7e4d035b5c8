//! Data models shared across the stores, services and API handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema-less auxiliary payload attached to events and alerts. Keys are
/// kept sorted, values may nest.
pub type Payload = Map<String, Value>;

/// Error returned when a stored or submitted enum label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseLabelError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Identity of the user behind a request, as resolved by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: crate::types::UserId,
    pub email: String,
    #[serde(default)]
    pub is_staff: bool,
}

pub mod alert;
pub mod audit_event;
pub mod blocked_ip;
