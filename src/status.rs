//! Aggregation engine: per-monitor status, group summaries, and the
//! overall severity shown at the top of the page.
//!
//! Everything here is a pure function of a decoded [`MonitorState`], the
//! static configuration, and an explicit `now`; nothing mutates stored
//! incident data. The maintenance overlay in particular is recomputed on
//! every call.

use serde::Serialize;

use crate::config::AppConfig;
use crate::store::{format_percent, MonitorState};

/// Three-way health classification for a group or the whole page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Every monitor is up.
    Operational,
    /// Some monitors are down.
    Degraded,
    /// Every monitor is down.
    Down,
}

impl Severity {
    fn classify(down: usize, total: usize) -> Self {
        if down == 0 {
            Severity::Operational
        } else if down == total {
            Severity::Down
        } else {
            Severity::Degraded
        }
    }
}

/// Presentation-facing status of a single monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Up,
    Down,
    /// Down, but inside an active maintenance window: shown as planned
    /// work rather than an outage.
    Maintenance,
    /// No history recorded for this monitor yet.
    NoData,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MonitorStatus {
    pub kind: StatusKind,
    /// Seconds since the last up/down transition, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub down_count: usize,
    pub total: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallSummary {
    pub down_count: usize,
    pub total: usize,
    pub severity: Severity,
}

/// Latency figures for one monitor.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatencyStats {
    pub latest_ms: u32,
    pub average_ms: u32,
}

/// Query surface over a monitor state, parameterized by the static
/// configuration (targets, groups, maintenance windows).
pub struct StatusBoard {
    config: AppConfig,
}

impl StatusBoard {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Status of one monitor, with the maintenance overlay applied.
    pub fn monitor_status(&self, state: &MonitorState, id: &str, now: u64) -> MonitorStatus {
        let history = match state.monitor(id) {
            Some(h) if !h.latency.is_empty() || !h.incident.is_empty() => h,
            _ => {
                return MonitorStatus {
                    kind: StatusKind::NoData,
                    since_secs: None,
                }
            }
        };

        let down = history.is_down();
        let kind = if down && self.in_maintenance(id, now) {
            StatusKind::Maintenance
        } else if down {
            StatusKind::Down
        } else {
            StatusKind::Up
        };

        MonitorStatus {
            kind,
            since_secs: history.last_change().map(|t| now.saturating_sub(t)),
        }
    }

    /// Uptime over the observed window, `None` when there is no data to
    /// compute one from.
    pub fn uptime_percent(&self, state: &MonitorState, id: &str, now: u64) -> Option<f64> {
        state.monitor(id)?.uptime_percent(now)
    }

    /// Uptime as shown on the page: 4 significant digits or "no data".
    pub fn uptime_display(&self, state: &MonitorState, id: &str, now: u64) -> String {
        match self.uptime_percent(state, id, now) {
            Some(p) => format!("{}%", format_percent(p)),
            None => "no data".to_string(),
        }
    }

    pub fn latency_stats(&self, state: &MonitorState, id: &str) -> LatencyStats {
        let (latest_ms, average_ms) = state
            .monitor(id)
            .map(|h| (h.latest_latency(), h.average_latency()))
            .unwrap_or((0, 0));
        LatencyStats {
            latest_ms,
            average_ms,
        }
    }

    /// Down count and severity for one configured group.
    ///
    /// The count uses the raw down status; monitors under maintenance
    /// still count as down here, only their per-monitor presentation
    /// changes.
    pub fn group_summary(&self, state: &MonitorState, name: &str) -> Option<GroupSummary> {
        let group = self.config.group(name)?;
        let down_count = self.count_down(state, group.monitors.iter().map(String::as_str));
        Some(GroupSummary {
            name: group.name.clone(),
            down_count,
            total: group.monitors.len(),
            severity: Severity::classify(down_count, group.monitors.len()),
        })
    }

    /// Summaries for every configured group, in config order.
    pub fn group_summaries(&self, state: &MonitorState) -> Vec<GroupSummary> {
        self.config
            .groups
            .iter()
            .filter_map(|g| self.group_summary(state, &g.name))
            .collect()
    }

    /// Three-way severity across all configured monitors, independent of
    /// grouping.
    pub fn overall(&self, state: &MonitorState) -> OverallSummary {
        let down_count = self.count_down(state, self.config.monitors.iter().map(|m| m.id.as_str()));
        let total = self.config.monitors.len();
        OverallSummary {
            down_count,
            total,
            severity: Severity::classify(down_count, total),
        }
    }

    fn in_maintenance(&self, id: &str, now: u64) -> bool {
        self.config.maintenances.iter().any(|w| w.covers(id, now))
    }

    fn count_down<'a>(&self, state: &MonitorState, ids: impl Iterator<Item = &'a str>) -> usize {
        ids.filter(|id| state.monitor(id).map(|h| h.is_down()).unwrap_or(false))
            .count()
    }
}
