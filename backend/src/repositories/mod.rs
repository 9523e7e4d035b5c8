pub mod alert;
pub mod audit_event;
pub mod blocked_ip;
pub mod memory;

pub use alert::{AlertStore, PgAlertStore};
pub use audit_event::{AuditEventFilter, AuditEventStore, HourlyCount, LabelCount, PgAuditEventStore};
pub use blocked_ip::{BlockStore, BlockUpsert, PgBlockStore};
pub use memory::{InMemoryAlertStore, InMemoryAuditEventStore, InMemoryBlockStore};
