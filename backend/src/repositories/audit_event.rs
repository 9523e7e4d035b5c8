//! Append-only audit event store.
//!
//! Events are written once by the audit sink and afterwards only counted or
//! aggregated; there is no update or delete path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::error::StoreError;
use crate::models::audit_event::{AuditEvent, Severity};
use crate::types::UserId;

const TABLE_NAME: &str = "audit_events";
const SELECT_COLUMNS: &str = "id, event_type, severity, occurred_at, actor_id, actor_email, \
     username_attempted, ip_address, user_agent, request_method, request_path, request_id, \
     description, extra_data, status_code, session_id, correlation_id";

/// Predicates over stored events. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditEventFilter {
    /// Inclusive lower bound on `occurred_at`.
    pub since: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub ip_address: Option<String>,
    /// Substring that must appear in the request path.
    pub path_contains: Option<String>,
    pub actor_id: Option<UserId>,
    pub min_severity: Option<Severity>,
}

impl AuditEventFilter {
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..Self::default()
        }
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.since.map_or(true, |since| event.occurred_at >= since)
            && self
                .event_type
                .as_ref()
                .map_or(true, |event_type| &event.event_type == event_type)
            && self
                .ip_address
                .as_ref()
                .map_or(true, |ip| event.ip_address.as_ref() == Some(ip))
            && self.path_contains.as_ref().map_or(true, |needle| {
                event
                    .request_path
                    .as_deref()
                    .is_some_and(|path| path.contains(needle.as_str()))
            })
            && self
                .actor_id
                .map_or(true, |actor_id| event.actor_id == Some(actor_id))
            && self
                .min_severity
                .map_or(true, |min| event.severity >= min)
    }
}

/// Event count for one hour bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct HourlyCount {
    pub hour: DateTime<Utc>,
    pub count: i64,
}

/// Event count grouped by a text column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditEventStore: Send + Sync {
    async fn insert(&self, event: &AuditEvent) -> Result<(), StoreError>;

    async fn count(&self, filter: &AuditEventFilter) -> Result<i64, StoreError>;

    /// Newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<AuditEvent>, StoreError>;

    async fn hourly_counts(&self, since: DateTime<Utc>) -> Result<Vec<HourlyCount>, StoreError>;

    /// Most frequent event types, descending.
    async fn counts_by_event_type(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<LabelCount>, StoreError>;

    async fn counts_by_severity(&self, since: DateTime<Utc>)
        -> Result<Vec<LabelCount>, StoreError>;

    /// Addresses with the most events at or above `min_severity`, descending.
    async fn top_source_ips(
        &self,
        since: DateTime<Utc>,
        min_severity: Severity,
        limit: i64,
    ) -> Result<Vec<LabelCount>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgAuditEventStore {
    pool: PgPool,
}

impl PgAuditEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditEventStore for PgAuditEventStore {
    async fn insert(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO {} ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            TABLE_NAME, SELECT_COLUMNS
        );
        sqlx::query(&query)
            .bind(event.id)
            .bind(&event.event_type)
            .bind(event.severity)
            .bind(event.occurred_at)
            .bind(event.actor_id)
            .bind(&event.actor_email)
            .bind(&event.username_attempted)
            .bind(&event.ip_address)
            .bind(&event.user_agent)
            .bind(&event.request_method)
            .bind(&event.request_path)
            .bind(&event.request_id)
            .bind(&event.description)
            .bind(&event.extra_data)
            .bind(event.status_code)
            .bind(&event.session_id)
            .bind(&event.correlation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self, filter: &AuditEventFilter) -> Result<i64, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", TABLE_NAME));
        let mut has_clause = false;
        apply_filters(&mut builder, &mut has_clause, filter);
        let total = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditEvent>, StoreError> {
        let query = format!(
            "SELECT {} FROM {} ORDER BY occurred_at DESC, id DESC LIMIT $1",
            SELECT_COLUMNS, TABLE_NAME
        );
        let rows = sqlx::query_as::<_, AuditEvent>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn hourly_counts(&self, since: DateTime<Utc>) -> Result<Vec<HourlyCount>, StoreError> {
        let query = format!(
            "SELECT date_trunc('hour', occurred_at) AS hour, COUNT(*) AS count FROM {} \
             WHERE occurred_at >= $1 GROUP BY 1 ORDER BY 1",
            TABLE_NAME
        );
        let rows = sqlx::query_as::<_, HourlyCount>(&query)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn counts_by_event_type(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<LabelCount>, StoreError> {
        let query = format!(
            "SELECT event_type AS label, COUNT(*) AS count FROM {} \
             WHERE occurred_at >= $1 GROUP BY event_type ORDER BY count DESC, label LIMIT $2",
            TABLE_NAME
        );
        let rows = sqlx::query_as::<_, LabelCount>(&query)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn counts_by_severity(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<LabelCount>, StoreError> {
        let query = format!(
            "SELECT severity AS label, COUNT(*) AS count FROM {} \
             WHERE occurred_at >= $1 GROUP BY severity ORDER BY label",
            TABLE_NAME
        );
        let rows = sqlx::query_as::<_, LabelCount>(&query)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn top_source_ips(
        &self,
        since: DateTime<Utc>,
        min_severity: Severity,
        limit: i64,
    ) -> Result<Vec<LabelCount>, StoreError> {
        let query = format!(
            "SELECT ip_address AS label, COUNT(*) AS count FROM {} \
             WHERE occurred_at >= $1 AND severity = ANY($2) AND ip_address IS NOT NULL \
             GROUP BY ip_address ORDER BY count DESC, label LIMIT $3",
            TABLE_NAME
        );
        let rows = sqlx::query_as::<_, LabelCount>(&query)
            .bind(since)
            .bind(severity_labels_from(min_severity))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

fn severity_labels_from(min: Severity) -> Vec<String> {
    Severity::ALL
        .iter()
        .filter(|severity| **severity >= min)
        .map(|severity| severity.as_str().to_string())
        .collect()
}

fn apply_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    has_clause: &mut bool,
    filter: &AuditEventFilter,
) {
    if let Some(since) = filter.since {
        push_clause(builder, has_clause);
        builder.push("occurred_at >= ").push_bind(since);
    }
    if let Some(event_type) = filter.event_type.as_ref() {
        push_clause(builder, has_clause);
        builder.push("event_type = ").push_bind(event_type.clone());
    }
    if let Some(ip) = filter.ip_address.as_ref() {
        push_clause(builder, has_clause);
        builder.push("ip_address = ").push_bind(ip.clone());
    }
    if let Some(needle) = filter.path_contains.as_ref() {
        push_clause(builder, has_clause);
        builder
            .push("strpos(request_path, ")
            .push_bind(needle.clone())
            .push(") > 0");
    }
    if let Some(actor_id) = filter.actor_id {
        push_clause(builder, has_clause);
        builder.push("actor_id = ").push_bind(actor_id);
    }
    if let Some(min) = filter.min_severity {
        push_clause(builder, has_clause);
        builder
            .push("severity = ANY(")
            .push_bind(severity_labels_from(min))
            .push(")");
    }
}

fn push_clause(builder: &mut QueryBuilder<'_, Postgres>, has_clause: &mut bool) {
    if *has_clause {
        builder.push(" AND ");
    } else {
        builder.push(" WHERE ");
        *has_clause = true;
    }
}
