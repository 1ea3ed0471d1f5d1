//! Uptrail status page core: compacted monitor state, status/uptime
//! aggregation, and the periodic refresh loop around them.

pub mod config;
pub mod refresh;
pub mod status;
pub mod store;
pub mod web;

pub use config::AppConfig;
pub use refresh::{RefreshController, StateSource};
pub use status::{Severity, StatusBoard, StatusKind};
pub use store::{MonitorState, STATE_KEY};
