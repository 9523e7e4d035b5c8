pub mod jwt;
pub mod network;
pub mod time;

pub use network::*;
pub use time::*;
