//! TTL deny-list of source addresses.

use chrono::Duration;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::blocked_ip::BlockRequest;
use crate::repositories::{BlockStore, BlockUpsert};
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct BlockRegistry {
    store: Arc<dyn BlockStore>,
    clock: Arc<dyn Clock>,
}

impl BlockRegistry {
    pub fn new(store: Arc<dyn BlockStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Whether `ip` has an active, unexpired entry right now. Expired rows are
    /// left in place and simply stop matching.
    pub async fn check(&self, ip: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        Ok(self
            .store
            .find(ip)
            .await?
            .is_some_and(|entry| entry.is_effective(now)))
    }

    /// Upserts the single entry for `ip`. `duration` of `None` blocks
    /// indefinitely.
    pub async fn block(
        &self,
        ip: &str,
        reason: &str,
        duration: Option<Duration>,
        auto_blocked: bool,
    ) -> Result<BlockUpsert, StoreError> {
        let now = self.clock.now();
        let request = BlockRequest {
            ip_address: ip.to_string(),
            reason: reason.to_string(),
            blocked_until: duration.map(|duration| now + duration),
            auto_blocked,
        };
        let upsert = self.store.upsert(&request, now).await?;
        tracing::info!(
            ip_address = %ip,
            auto_blocked,
            blocked_until = ?upsert.entry.blocked_until,
            created = upsert.created,
            "IP address blocked"
        );
        Ok(upsert)
    }

    pub async fn count_effective(&self) -> Result<i64, StoreError> {
        self.store.count_effective(self.clock.now()).await
    }
}
