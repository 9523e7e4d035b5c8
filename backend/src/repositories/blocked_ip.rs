//! IP deny-list store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::StoreError;
use crate::models::blocked_ip::{BlockRequest, BlockedIp};

const TABLE_NAME: &str = "blocked_ips";
const SELECT_COLUMNS: &str =
    "ip_address, reason, blocked_at, blocked_until, is_active, auto_blocked";

/// Result of a block upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockUpsert {
    pub entry: BlockedIp,
    /// `false` when an existing row for the address was overwritten.
    pub created: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Inserts or overwrites the single row for `request.ip_address` and
    /// re-activates it. `now` becomes `blocked_at` for new rows only.
    async fn upsert(
        &self,
        request: &BlockRequest,
        now: DateTime<Utc>,
    ) -> Result<BlockUpsert, StoreError>;

    async fn find(&self, ip_address: &str) -> Result<Option<BlockedIp>, StoreError>;

    /// Rows that are active and not yet expired at `now`.
    async fn count_effective(&self, now: DateTime<Utc>) -> Result<i64, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgBlockStore {
    pool: PgPool,
}

impl PgBlockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    entry: BlockedIp,
    created: bool,
}

#[async_trait]
impl BlockStore for PgBlockStore {
    async fn upsert(
        &self,
        request: &BlockRequest,
        now: DateTime<Utc>,
    ) -> Result<BlockUpsert, StoreError> {
        // xmax is zero only for rows inserted by this statement.
        let query = format!(
            "INSERT INTO {table} ({columns}) VALUES ($1, $2, $3, $4, TRUE, $5) \
             ON CONFLICT (ip_address) DO UPDATE SET reason = EXCLUDED.reason, \
             blocked_until = EXCLUDED.blocked_until, is_active = TRUE, \
             auto_blocked = EXCLUDED.auto_blocked \
             RETURNING {columns}, (xmax = 0) AS created",
            table = TABLE_NAME,
            columns = SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, UpsertRow>(&query)
            .bind(&request.ip_address)
            .bind(&request.reason)
            .bind(now)
            .bind(request.blocked_until)
            .bind(request.auto_blocked)
            .fetch_one(&self.pool)
            .await?;
        Ok(BlockUpsert {
            entry: row.entry,
            created: row.created,
        })
    }

    async fn find(&self, ip_address: &str) -> Result<Option<BlockedIp>, StoreError> {
        let query = format!(
            "SELECT {} FROM {} WHERE ip_address = $1",
            SELECT_COLUMNS, TABLE_NAME
        );
        let row = sqlx::query_as::<_, BlockedIp>(&query)
            .bind(ip_address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count_effective(&self, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let query = format!(
            "SELECT COUNT(*) FROM {} WHERE is_active \
             AND (blocked_until IS NULL OR blocked_until > $1)",
            TABLE_NAME
        );
        let total = sqlx::query_scalar::<_, i64>(&query)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}
