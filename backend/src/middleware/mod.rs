pub mod audit_log;
pub mod auth;
pub mod request_id;
pub mod threat_guard;

pub use audit_log::*;
pub use auth::*;
pub use request_id::*;
pub use threat_guard::*;
