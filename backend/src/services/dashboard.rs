//! Read-only aggregation for the security dashboard.

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;

use super::block_registry::BlockRegistry;
use crate::error::StoreError;
use crate::models::alert::{Alert, AlertStatus};
use crate::models::audit_event::{EventType, Severity};
use crate::repositories::{AlertStore, AuditEventFilter, AuditEventStore, HourlyCount, LabelCount};
use crate::utils::time::Clock;

const TOP_N: i64 = 10;
const RECENT_ALERTS: i64 = 10;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DashboardSummary {
    pub open_alerts: i64,
    pub critical_events_24h: i64,
    pub failed_logins_24h: i64,
    /// Blocks that are active and not yet expired.
    pub blocked_ips: i64,
    pub total_alerts_24h: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub summary: DashboardSummary,
    pub event_timeline: Vec<HourlyCount>,
    pub events_by_type: Vec<LabelCount>,
    pub severity_distribution: Vec<LabelCount>,
    pub top_suspicious_ips: Vec<LabelCount>,
    pub recent_alerts: Vec<Alert>,
}

#[derive(Clone)]
pub struct DashboardService {
    events: Arc<dyn AuditEventStore>,
    alerts: Arc<dyn AlertStore>,
    blocks: BlockRegistry,
    clock: Arc<dyn Clock>,
}

impl DashboardService {
    pub fn new(
        events: Arc<dyn AuditEventStore>,
        alerts: Arc<dyn AlertStore>,
        blocks: BlockRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            alerts,
            blocks,
            clock,
        }
    }

    pub async fn build(&self) -> Result<Dashboard, StoreError> {
        let now = self.clock.now();
        let last_24h = now - Duration::hours(24);
        let last_7d = now - Duration::days(7);

        let summary = DashboardSummary {
            open_alerts: self.alerts.count_by_status(AlertStatus::Open).await?,
            critical_events_24h: self
                .events
                .count(&AuditEventFilter {
                    min_severity: Some(Severity::Critical),
                    ..AuditEventFilter::since(last_24h)
                })
                .await?,
            failed_logins_24h: self
                .events
                .count(&AuditEventFilter {
                    event_type: Some(EventType::LoginFailed.as_str().to_string()),
                    ..AuditEventFilter::since(last_24h)
                })
                .await?,
            blocked_ips: self.blocks.count_effective().await?,
            total_alerts_24h: self.alerts.count_since(last_24h).await?,
        };

        Ok(Dashboard {
            summary,
            event_timeline: self.events.hourly_counts(last_24h).await?,
            events_by_type: self.events.counts_by_event_type(last_24h, TOP_N).await?,
            severity_distribution: self.events.counts_by_severity(last_7d).await?,
            top_suspicious_ips: self
                .events
                .top_source_ips(last_24h, Severity::High, TOP_N)
                .await?,
            recent_alerts: self
                .alerts
                .list_by_status(AlertStatus::Open, RECENT_ALERTS)
                .await?,
        })
    }
}
