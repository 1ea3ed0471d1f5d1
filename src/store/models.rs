//! Monitor state model types and derived queries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One latency reading for a monitor.
///
/// A ping of 0 means the probe got no successful reading at that time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySample {
    /// Unix timestamp in seconds.
    pub time: u64,
    /// Round-trip latency in milliseconds.
    pub ping: u32,
}

/// A contiguous down period for a monitor.
///
/// `end` absent means the incident is still ongoing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Unix timestamp when the down period began.
    pub start: u64,
    /// Probe id or error cause that opened the incident.
    pub cause: String,
    /// Unix timestamp when the monitor recovered, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Per-monitor history: latency samples and incidents, both chronological.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorHistory {
    pub latency: Vec<LatencySample>,
    pub incident: Vec<Incident>,
}

impl MonitorHistory {
    /// A monitor is down iff its last incident has no end yet.
    pub fn is_down(&self) -> bool {
        self.incident.last().map(Incident::is_open).unwrap_or(false)
    }

    /// Unix timestamp of the most recent status transition.
    ///
    /// Down: the open incident's start. Up after an incident: that
    /// incident's end. Never down: the first sample's time.
    pub fn last_change(&self) -> Option<u64> {
        match self.incident.last() {
            Some(inc) => Some(inc.end.unwrap_or(inc.start)),
            None => self.latency.first().map(|s| s.time),
        }
    }

    /// Uptime percentage over the observed window, clamped to [0, 100].
    ///
    /// The window opens at the first incident's start. Returns `None` when
    /// no incidents have been recorded or the window is degenerate, which
    /// callers report as "no data" rather than 0%.
    pub fn uptime_percent(&self, now: u64) -> Option<f64> {
        let first = self.incident.first()?;
        if now <= first.start {
            return None;
        }
        let total = (now - first.start) as f64;
        let down: f64 = self
            .incident
            .iter()
            .map(|inc| inc.end.unwrap_or(now).saturating_sub(inc.start) as f64)
            .sum();
        Some(((total - down) / total * 100.0).clamp(0.0, 100.0))
    }

    /// Ping of the most recent sample, or 0 if there are none.
    pub fn latest_latency(&self) -> u32 {
        self.latency.last().map(|s| s.ping).unwrap_or(0)
    }

    /// Mean of successful samples (ping > 0), or 0 if there are none.
    ///
    /// Zero pings are failed probes, not 0ms responses, so they are
    /// excluded from the mean instead of dragging it down.
    pub fn average_latency(&self) -> u32 {
        let mut sum: u64 = 0;
        let mut count: u64 = 0;
        for s in &self.latency {
            if s.ping > 0 {
                sum += u64::from(s.ping);
                count += 1;
            }
        }
        if count == 0 {
            0
        } else {
            (sum as f64 / count as f64).round() as u32
        }
    }
}

/// Full monitor state: one history per monitor id plus the time of the
/// last collection round.
///
/// Decoded instances are treated as immutable; a refresh replaces the
/// whole value. The recording operations below are used only by the
/// collector side before re-encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    pub monitors: BTreeMap<String, MonitorHistory>,
    pub last_update: u64,
}

impl MonitorState {
    /// True when no collection round has ever been stored.
    pub fn is_empty(&self) -> bool {
        self.last_update == 0 && self.monitors.is_empty()
    }

    pub fn monitor(&self, id: &str) -> Option<&MonitorHistory> {
        self.monitors.get(id)
    }

    /// Record one probe result for a monitor.
    ///
    /// Appends a latency sample (0 when the probe failed), closes the open
    /// incident on recovery and opens a new one on failure. Incidents
    /// never overlap: a new one only opens when the previous has an end.
    pub fn record(&mut self, id: &str, now: u64, ping: u32, up: bool, cause: &str) {
        // The wall clock can step backwards (NTP); history must stay
        // chronological or the delta-encoded wire form breaks.
        let now = now.max(self.last_update);
        let history = self.monitors.entry(id.to_string()).or_default();

        history.latency.push(LatencySample {
            time: now,
            ping: if up { ping } else { 0 },
        });

        if up {
            if let Some(last) = history.incident.last_mut() {
                if last.is_open() {
                    last.end = Some(now);
                }
            }
        } else if !history.is_down() {
            history.incident.push(Incident {
                start: now,
                cause: cause.to_string(),
                end: None,
            });
        }

        self.last_update = self.last_update.max(now);
    }

    /// Drop history outside the retention windows to keep the compacted
    /// blob within the store's size ceiling.
    ///
    /// Latency samples older than `latency_window` and incidents fully
    /// resolved before `incident_window` are removed. An open incident is
    /// always kept.
    pub fn prune(&mut self, now: u64, latency_window: u64, incident_window: u64) {
        let latency_cutoff = now.saturating_sub(latency_window);
        let incident_cutoff = now.saturating_sub(incident_window);

        for history in self.monitors.values_mut() {
            history.latency.retain(|s| s.time >= latency_cutoff);
            history
                .incident
                .retain(|inc| match inc.end {
                    Some(end) => end >= incident_cutoff,
                    None => true,
                });
        }
    }
}

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Format a percentage with 4 significant digits, e.g. "99.98" or "100.0".
pub fn format_percent(percent: f64) -> String {
    if percent == 0.0 {
        return "0.000".to_string();
    }
    let digits_before = percent.abs().log10().floor() as i32 + 1;
    let decimals = (4 - digits_before).max(0) as usize;
    format!("{:.*}", decimals, percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: u64, ping: u32) -> LatencySample {
        LatencySample { time, ping }
    }

    #[test]
    fn test_latency_stats_exclude_failed_probes() {
        let history = MonitorHistory {
            latency: vec![sample(0, 100), sample(60, 0), sample(120, 150)],
            incident: vec![],
        };
        assert_eq!(history.average_latency(), 125);
        assert_eq!(history.latest_latency(), 150);
    }

    #[test]
    fn test_latency_stats_empty() {
        let history = MonitorHistory::default();
        assert_eq!(history.average_latency(), 0);
        assert_eq!(history.latest_latency(), 0);
    }

    #[test]
    fn test_uptime_half() {
        let history = MonitorHistory {
            latency: vec![],
            incident: vec![Incident {
                start: 1000,
                cause: "probe".to_string(),
                end: Some(2000),
            }],
        };
        let uptime = history.uptime_percent(3000).unwrap();
        assert!((uptime - 50.0).abs() < 1e-9);
        assert_eq!(format_percent(uptime), "50.00");
    }

    #[test]
    fn test_uptime_no_incidents_is_no_data() {
        let history = MonitorHistory {
            latency: vec![sample(0, 10)],
            incident: vec![],
        };
        assert_eq!(history.uptime_percent(1000), None);
    }

    #[test]
    fn test_uptime_degenerate_window_is_no_data() {
        let history = MonitorHistory {
            latency: vec![],
            incident: vec![Incident {
                start: 500,
                cause: "x".to_string(),
                end: None,
            }],
        };
        assert_eq!(history.uptime_percent(500), None);
    }

    #[test]
    fn test_uptime_bounds() {
        // Ongoing incident since the start of the window: 0%, not negative.
        let history = MonitorHistory {
            latency: vec![],
            incident: vec![Incident {
                start: 100,
                cause: "x".to_string(),
                end: None,
            }],
        };
        let uptime = history.uptime_percent(5000).unwrap();
        assert!((0.0..=100.0).contains(&uptime));
        assert_eq!(uptime, 0.0);
    }

    #[test]
    fn test_down_detection_flips_on_end() {
        let mut history = MonitorHistory {
            latency: vec![],
            incident: vec![Incident {
                start: 10,
                cause: "timeout".to_string(),
                end: None,
            }],
        };
        assert!(history.is_down());
        history.incident.last_mut().unwrap().end = Some(20);
        assert!(!history.is_down());
    }

    #[test]
    fn test_record_opens_and_closes_incidents() {
        let mut state = MonitorState::default();
        state.record("web", 100, 42, true, "");
        assert!(!state.monitor("web").unwrap().is_down());

        state.record("web", 160, 0, false, "connect timeout");
        state.record("web", 220, 0, false, "connect timeout");
        let history = state.monitor("web").unwrap();
        // Second failure extends the open incident instead of opening another.
        assert_eq!(history.incident.len(), 1);
        assert!(history.is_down());
        assert_eq!(history.incident[0].start, 160);

        state.record("web", 280, 55, true, "");
        let history = state.monitor("web").unwrap();
        assert!(!history.is_down());
        assert_eq!(history.incident[0].end, Some(280));
        assert_eq!(state.last_update, 280);

        // Incidents stay non-overlapping: the next failure opens a new one.
        state.record("web", 340, 0, false, "dns");
        let history = state.monitor("web").unwrap();
        assert_eq!(history.incident.len(), 2);
        assert!(history.incident[1].start >= history.incident[0].end.unwrap());
    }

    #[test]
    fn test_record_clamps_backwards_clock() {
        let mut state = MonitorState::default();
        state.record("web", 100, 40, true, "");
        // Wall clock stepped back between probe rounds.
        state.record("web", 50, 0, false, "timeout");
        let history = state.monitor("web").unwrap();
        assert_eq!(history.latency[1].time, 100);
        assert_eq!(history.incident[0].start, 100);

        state.record("web", 80, 30, true, "");
        let history = state.monitor("web").unwrap();
        assert_eq!(history.latency[2].time, 100);
        assert_eq!(history.incident[0].end, Some(100));
        assert_eq!(state.last_update, 100);
    }

    #[test]
    fn test_prune_keeps_open_incident() {
        let mut state = MonitorState::default();
        state.record("web", 100, 0, false, "old outage");
        state.record("web", 200, 10, true, "");
        state.record("web", 5000, 0, false, "ongoing");

        state.prune(10_000, 6000, 6000);
        let history = state.monitor("web").unwrap();
        assert_eq!(history.latency.len(), 1);
        assert_eq!(history.latency[0].time, 5000);
        assert_eq!(history.incident.len(), 1);
        assert!(history.incident[0].is_open());
    }

    #[test]
    fn test_last_change() {
        let mut history = MonitorHistory {
            latency: vec![sample(5, 10)],
            incident: vec![],
        };
        assert_eq!(history.last_change(), Some(5));

        history.incident.push(Incident {
            start: 50,
            cause: "x".to_string(),
            end: None,
        });
        assert_eq!(history.last_change(), Some(50));

        history.incident.last_mut().unwrap().end = Some(80);
        assert_eq!(history.last_change(), Some(80));
    }

    #[test]
    fn test_format_percent_significant_digits() {
        assert_eq!(format_percent(100.0), "100.0");
        assert_eq!(format_percent(99.987), "99.99");
        assert_eq!(format_percent(7.5), "7.500");
    }
}
