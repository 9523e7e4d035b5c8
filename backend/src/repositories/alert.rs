//! Alert store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::alert::{Alert, AlertStatus, AlertSubject};
use crate::types::AlertId;

const TABLE_NAME: &str = "security_alerts";
const SELECT_COLUMNS: &str = "id, alert_type, severity, status, triggered_at, resolved_at, \
     source_ip, affected_user, description, evidence, recommended_action, related_event_ids";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Inserts `alert` unless an `OPEN` alert of the same type and subject was
    /// triggered at or after `window_start`. The check and the insert are one
    /// unit of work. Returns whether the alert was stored.
    async fn insert_unless_open(
        &self,
        alert: &Alert,
        window_start: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn find(&self, id: AlertId) -> Result<Option<Alert>, StoreError>;

    /// Moves an alert from `from` to `to`; `None` when the alert is missing or
    /// no longer in `from`.
    async fn update_status(
        &self,
        id: AlertId,
        from: AlertStatus,
        to: AlertStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Alert>, StoreError>;

    async fn count_by_status(&self, status: AlertStatus) -> Result<i64, StoreError>;

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError>;

    /// Newest first.
    async fn list_by_status(
        &self,
        status: AlertStatus,
        limit: i64,
    ) -> Result<Vec<Alert>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn insert_unless_open(
        &self,
        alert: &Alert,
        window_start: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(subject) = alert.subject() {
            // Serializes concurrent evaluations for the same alert key until commit.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(subject.dedup_key(alert.alert_type))
                .execute(&mut *tx)
                .await?;

            let subject_clause = match subject {
                AlertSubject::SourceIp(_) => "source_ip = $3",
                AlertSubject::User(_) => "affected_user = $3",
            };
            let query = format!(
                "SELECT EXISTS (SELECT 1 FROM {} WHERE alert_type = $1 AND status = 'OPEN' \
                 AND triggered_at >= $2 AND {})",
                TABLE_NAME, subject_clause
            );
            let existing = sqlx::query_scalar::<_, bool>(&query)
                .bind(alert.alert_type)
                .bind(window_start);
            let existing = match subject {
                AlertSubject::SourceIp(ip) => existing.bind(ip),
                AlertSubject::User(user_id) => existing.bind(user_id),
            };
            if existing.fetch_one(&mut *tx).await? {
                tx.rollback().await?;
                return Ok(false);
            }
        }

        let query = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            TABLE_NAME, SELECT_COLUMNS
        );
        sqlx::query(&query)
            .bind(alert.id)
            .bind(alert.alert_type)
            .bind(alert.severity)
            .bind(alert.status)
            .bind(alert.triggered_at)
            .bind(alert.resolved_at)
            .bind(&alert.source_ip)
            .bind(alert.affected_user)
            .bind(&alert.description)
            .bind(&alert.evidence)
            .bind(&alert.recommended_action)
            .bind(&alert.related_event_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn find(&self, id: AlertId) -> Result<Option<Alert>, StoreError> {
        let query = format!("SELECT {} FROM {} WHERE id = $1", SELECT_COLUMNS, TABLE_NAME);
        let row = sqlx::query_as::<_, Alert>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_status(
        &self,
        id: AlertId,
        from: AlertStatus,
        to: AlertStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Alert>, StoreError> {
        let query = format!(
            "UPDATE {} SET status = $3, resolved_at = COALESCE($4, resolved_at) \
             WHERE id = $1 AND status = $2 RETURNING {}",
            TABLE_NAME, SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, Alert>(&query)
            .bind(id)
            .bind(from)
            .bind(to)
            .bind(resolved_at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count_by_status(&self, status: AlertStatus) -> Result<i64, StoreError> {
        let query = format!("SELECT COUNT(*) FROM {} WHERE status = $1", TABLE_NAME);
        let total = sqlx::query_scalar::<_, i64>(&query)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let query = format!("SELECT COUNT(*) FROM {} WHERE triggered_at >= $1", TABLE_NAME);
        let total = sqlx::query_scalar::<_, i64>(&query)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn list_by_status(
        &self,
        status: AlertStatus,
        limit: i64,
    ) -> Result<Vec<Alert>, StoreError> {
        let query = format!(
            "SELECT {} FROM {} WHERE status = $1 ORDER BY triggered_at DESC, id DESC LIMIT $2",
            SELECT_COLUMNS, TABLE_NAME
        );
        let rows = sqlx::query_as::<_, Alert>(&query)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
