pub mod alert_workflow;
pub mod audit_sink;
pub mod block_registry;
pub mod correlation;
pub mod dashboard;
pub mod monitor;
pub mod pattern_matcher;
pub mod siem_export;

pub use alert_workflow::{AlertWorkflow, TransitionError};
pub use audit_sink::{AuditSink, EventDescriptor, RequestContext};
pub use block_registry::BlockRegistry;
pub use correlation::CorrelationEngine;
pub use dashboard::{Dashboard, DashboardService, DashboardSummary};
pub use monitor::{Recorded, SecurityMonitor};
pub use pattern_matcher::{PatternMatcher, ThreatCategory};
pub use siem_export::{ExportEnvelope, ExportFormat, SiemExporter};
