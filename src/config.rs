//! Configuration module.
//!
//! The monitor target list, grouping, and maintenance windows come from a
//! JSON config file; server settings can be overridden through
//! environment variables:
//!
//! - `UPTRAIL_CONFIG`: config file path (default: "uptrail.json")
//! - `UPTRAIL_HTTP_PORT`: HTTP port (default: 8080)
//! - `UPTRAIL_DB_PATH`: state store path (default: "uptrail.db")
//!
//! Everything here is loaded once at startup and read-only afterwards;
//! the core never reaches for ambient globals.

use std::env;
use std::fs;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// A monitored endpoint as shown on the status page. The probing itself
/// happens elsewhere; this is display metadata keyed by the stable id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorTarget {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_page_link: Option<String>,
    #[serde(default)]
    pub hide_latency_chart: bool,
}

/// Named, ordered grouping of monitor ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorGroup {
    pub name: String,
    pub monitors: Vec<String>,
}

/// A scheduled window during which listed monitors show "maintenance"
/// instead of "down". Overlay only: stored incident data is never touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub monitors: Vec<String>,
}

impl MaintenanceWindow {
    /// Whether the window covers the given unix timestamp. An absent end
    /// means open-ended.
    pub fn active_at(&self, now: u64) -> bool {
        let now = now as i64;
        if now < self.start.timestamp() {
            return false;
        }
        match self.end {
            Some(end) => now <= end.timestamp(),
            None => true,
        }
    }

    pub fn covers(&self, monitor_id: &str, now: u64) -> bool {
        self.active_at(now) && self.monitors.iter().any(|m| m == monitor_id)
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Client refresh interval in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// How much latency history to keep in the compacted blob.
    #[serde(default = "default_latency_retention")]
    pub latency_retention_secs: u64,
    /// How long resolved incidents stay in the compacted blob.
    #[serde(default = "default_incident_retention")]
    pub incident_retention_secs: u64,
    #[serde(default)]
    pub monitors: Vec<MonitorTarget>,
    #[serde(default)]
    pub groups: Vec<MonitorGroup>,
    #[serde(default)]
    pub maintenances: Vec<MaintenanceWindow>,
}

fn default_http_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "uptrail.db".to_string()
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_latency_retention() -> u64 {
    12 * 3600
}

fn default_incident_retention() -> u64 {
    90 * 24 * 3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            db_path: default_db_path(),
            refresh_interval_secs: default_refresh_interval(),
            latency_retention_secs: default_latency_retention(),
            incident_retention_secs: default_incident_retention(),
            monitors: Vec::new(),
            groups: Vec::new(),
            maintenances: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the file named by `UPTRAIL_CONFIG`, then
    /// apply environment overrides. A missing file yields the defaults
    /// with an empty monitor list.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("UPTRAIL_CONFIG").unwrap_or_else(|_| "uptrail.json".to_string());
        let mut cfg = match fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        if let Ok(port_str) = env::var("UPTRAIL_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }
        if let Ok(db_path) = env::var("UPTRAIL_DB_PATH") {
            cfg.db_path = db_path;
        }

        Ok(cfg)
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    pub fn target(&self, id: &str) -> Option<&MonitorTarget> {
        self.monitors.iter().find(|m| m.id == id)
    }

    pub fn group(&self, name: &str) -> Option<&MonitorGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}
