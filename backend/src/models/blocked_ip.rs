use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Deny-list entry. One row per address; later blocks overwrite it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct BlockedIp {
    pub ip_address: String,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    /// `None` means the block never expires.
    pub blocked_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// `true` for system-origin blocks, `false` for administrator blocks.
    pub auto_blocked: bool,
}

impl BlockedIp {
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.blocked_until.map_or(true, |until| until > now)
    }
}

/// Values written by a block upsert.
#[derive(Debug, Clone)]
pub struct BlockRequest {
    pub ip_address: String,
    pub reason: String,
    pub blocked_until: Option<DateTime<Utc>>,
    pub auto_blocked: bool,
}
