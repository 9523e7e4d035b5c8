use std::sync::Arc;

use super::audit_sink::{AuditSink, EventDescriptor};
use super::correlation::CorrelationEngine;
use crate::error::StoreError;
use crate::models::alert::Alert;
use crate::models::audit_event::AuditEvent;

/// Outcome of recording one event.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub event: AuditEvent,
    pub alerts: Vec<Alert>,
}

/// Entry point for event producers: log the event, then correlate it.
#[derive(Clone)]
pub struct SecurityMonitor {
    sink: AuditSink,
    engine: Arc<CorrelationEngine>,
}

impl SecurityMonitor {
    pub fn new(sink: AuditSink, engine: Arc<CorrelationEngine>) -> Self {
        Self { sink, engine }
    }

    pub fn sink(&self) -> &AuditSink {
        &self.sink
    }

    pub fn engine(&self) -> &CorrelationEngine {
        &self.engine
    }

    /// Only the write can fail; correlation problems are logged by the rules.
    pub async fn record(&self, descriptor: EventDescriptor) -> Result<Recorded, StoreError> {
        let event = self.sink.log(descriptor).await?;
        let alerts = self.engine.evaluate(&event).await;
        Ok(Recorded { event, alerts })
    }
}
