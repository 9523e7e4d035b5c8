//! In-process implementations of the security stores.
//!
//! They back the integration tests and embedders that run without Postgres.
//! Each store can be switched into an outage mode in which every call fails
//! with [`StoreError::Unavailable`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::alert::AlertStore;
use super::audit_event::{AuditEventFilter, AuditEventStore, HourlyCount, LabelCount};
use super::blocked_ip::{BlockStore, BlockUpsert};
use crate::error::StoreError;
use crate::models::alert::{Alert, AlertStatus};
use crate::models::audit_event::{AuditEvent, Severity};
use crate::models::blocked_ip::{BlockRequest, BlockedIp};
use crate::types::AlertId;
use crate::utils::time::truncate_to_hour;

#[derive(Debug, Default)]
struct Outage(AtomicBool);

impl Outage {
    fn set(&self, down: bool) {
        self.0.store(down, Ordering::SeqCst);
    }

    fn check(&self, store: &str) -> Result<(), StoreError> {
        if self.0.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("{} is offline", store)))
        } else {
            Ok(())
        }
    }
}

fn top_labels(counts: HashMap<String, i64>, limit: i64) -> Vec<LabelCount> {
    let mut rows: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    rows.sort_by(|a, b| {
        Reverse(a.count)
            .cmp(&Reverse(b.count))
            .then_with(|| a.label.cmp(&b.label))
    });
    rows.truncate(limit.max(0) as usize);
    rows
}

#[derive(Debug, Default)]
pub struct InMemoryAuditEventStore {
    events: Mutex<Vec<AuditEvent>>,
    outage: Outage,
}

impl InMemoryAuditEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }

    /// Snapshot of every stored event, oldest first.
    pub fn all(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn with_events<T>(&self, f: impl FnOnce(&[AuditEvent]) -> T) -> Result<T, StoreError> {
        self.outage.check("audit event store")?;
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        Ok(f(&events))
    }
}

#[async_trait]
impl AuditEventStore for InMemoryAuditEventStore {
    async fn insert(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.outage.check("audit event store")?;
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }

    async fn count(&self, filter: &AuditEventFilter) -> Result<i64, StoreError> {
        self.with_events(|events| events.iter().filter(|event| filter.matches(event)).count() as i64)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditEvent>, StoreError> {
        self.with_events(|events| {
            let mut newest: Vec<AuditEvent> = events.to_vec();
            newest.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
            newest.truncate(limit.max(0) as usize);
            newest
        })
    }

    async fn hourly_counts(&self, since: DateTime<Utc>) -> Result<Vec<HourlyCount>, StoreError> {
        self.with_events(|events| {
            let mut buckets: BTreeMap<DateTime<Utc>, i64> = BTreeMap::new();
            for event in events.iter().filter(|event| event.occurred_at >= since) {
                *buckets.entry(truncate_to_hour(event.occurred_at)).or_default() += 1;
            }
            buckets
                .into_iter()
                .map(|(hour, count)| HourlyCount { hour, count })
                .collect()
        })
    }

    async fn counts_by_event_type(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<LabelCount>, StoreError> {
        self.with_events(|events| {
            let mut counts: HashMap<String, i64> = HashMap::new();
            for event in events.iter().filter(|event| event.occurred_at >= since) {
                *counts.entry(event.event_type.clone()).or_default() += 1;
            }
            top_labels(counts, limit)
        })
    }

    async fn counts_by_severity(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<LabelCount>, StoreError> {
        self.with_events(|events| {
            let mut counts: BTreeMap<&'static str, i64> = BTreeMap::new();
            for event in events.iter().filter(|event| event.occurred_at >= since) {
                *counts.entry(event.severity.as_str()).or_default() += 1;
            }
            counts
                .into_iter()
                .map(|(label, count)| LabelCount {
                    label: label.to_string(),
                    count,
                })
                .collect()
        })
    }

    async fn top_source_ips(
        &self,
        since: DateTime<Utc>,
        min_severity: Severity,
        limit: i64,
    ) -> Result<Vec<LabelCount>, StoreError> {
        self.with_events(|events| {
            let mut counts: HashMap<String, i64> = HashMap::new();
            for event in events
                .iter()
                .filter(|event| event.occurred_at >= since && event.severity >= min_severity)
            {
                if let Some(ip) = event.ip_address.as_ref() {
                    *counts.entry(ip.clone()).or_default() += 1;
                }
            }
            top_labels(counts, limit)
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: Mutex<Vec<Alert>>,
    outage: Outage,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }

    /// Snapshot of every stored alert, oldest first.
    pub fn all(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn insert_unless_open(
        &self,
        alert: &Alert,
        window_start: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.outage.check("alert store")?;
        // The lock spans check and insert.
        let mut alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(subject) = alert.subject() {
            let duplicate = alerts.iter().any(|existing| {
                existing.alert_type == alert.alert_type
                    && existing.status == AlertStatus::Open
                    && existing.triggered_at >= window_start
                    && existing.subject().as_ref() == Some(&subject)
            });
            if duplicate {
                return Ok(false);
            }
        }
        alerts.push(alert.clone());
        Ok(true)
    }

    async fn find(&self, id: AlertId) -> Result<Option<Alert>, StoreError> {
        self.outage.check("alert store")?;
        let alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(alerts.iter().find(|alert| alert.id == id).cloned())
    }

    async fn update_status(
        &self,
        id: AlertId,
        from: AlertStatus,
        to: AlertStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Alert>, StoreError> {
        self.outage.check("alert store")?;
        let mut alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        let Some(alert) = alerts
            .iter_mut()
            .find(|alert| alert.id == id && alert.status == from)
        else {
            return Ok(None);
        };
        alert.status = to;
        if resolved_at.is_some() {
            alert.resolved_at = resolved_at;
        }
        Ok(Some(alert.clone()))
    }

    async fn count_by_status(&self, status: AlertStatus) -> Result<i64, StoreError> {
        self.outage.check("alert store")?;
        let alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(alerts.iter().filter(|alert| alert.status == status).count() as i64)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        self.outage.check("alert store")?;
        let alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(alerts
            .iter()
            .filter(|alert| alert.triggered_at >= since)
            .count() as i64)
    }

    async fn list_by_status(
        &self,
        status: AlertStatus,
        limit: i64,
    ) -> Result<Vec<Alert>, StoreError> {
        self.outage.check("alert store")?;
        let alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<Alert> = alerts
            .iter()
            .filter(|alert| alert.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    entries: Mutex<HashMap<String, BlockedIp>>,
    outage: Outage,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn upsert(
        &self,
        request: &BlockRequest,
        now: DateTime<Utc>,
    ) -> Result<BlockUpsert, StoreError> {
        self.outage.check("block store")?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let created = !entries.contains_key(&request.ip_address);
        let entry = entries
            .entry(request.ip_address.clone())
            .or_insert_with(|| BlockedIp {
                ip_address: request.ip_address.clone(),
                reason: String::new(),
                blocked_at: now,
                blocked_until: None,
                is_active: true,
                auto_blocked: request.auto_blocked,
            });
        entry.reason = request.reason.clone();
        entry.blocked_until = request.blocked_until;
        entry.is_active = true;
        entry.auto_blocked = request.auto_blocked;
        Ok(BlockUpsert {
            entry: entry.clone(),
            created,
        })
    }

    async fn find(&self, ip_address: &str) -> Result<Option<BlockedIp>, StoreError> {
        self.outage.check("block store")?;
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(ip_address).cloned())
    }

    async fn count_effective(&self, now: DateTime<Utc>) -> Result<i64, StoreError> {
        self.outage.check("block store")?;
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .values()
            .filter(|entry| entry.is_effective(now))
            .count() as i64)
    }
}
