//! HTTP request handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::status::{GroupSummary, LatencyStats, MonitorStatus, OverallSummary, StatusKind};
use crate::store::{decode, encode, unix_now, MonitorState, STATE_KEY};

const STATUS_TEMPLATE: &str = include_str!("templates/status.html");

// ============================================================================
// Status page
// ============================================================================

pub async fn handle_index(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.controller.current();
    let now = unix_now();
    let board = &state.board;
    let overall = board.overall(&snapshot);

    let (overall_class, overall_text) = if snapshot.is_empty() {
        ("no_data".to_string(), "No monitor state recorded yet".to_string())
    } else {
        let class = severity_class(overall.severity).to_string();
        let text = format!(
            "{}/{} monitors operational",
            overall.total - overall.down_count,
            overall.total
        );
        (class, text)
    };

    let groups_section: String = board
        .group_summaries(&snapshot)
        .iter()
        .map(|g| {
            format!(
                "<p class=\"{}\">{}: {}/{} operational</p>",
                severity_class(g.severity),
                g.name,
                g.total - g.down_count,
                g.total
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let monitor_rows: String = board
        .config()
        .monitors
        .iter()
        .map(|m| {
            let status = board.monitor_status(&snapshot, &m.id, now);
            let latency = board.latency_stats(&snapshot, &m.id);
            format!(
                "<tr><td>{}</td><td class=\"{}\">{}</td><td>{}</td><td>{}ms</td><td>{}ms</td></tr>",
                m.name,
                kind_class(status.kind),
                kind_label(status.kind),
                board.uptime_display(&snapshot, &m.id, now),
                latency.latest_ms,
                latency.average_ms,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let last_update_text = if snapshot.last_update == 0 {
        "No data".to_string()
    } else {
        format!(
            "Last update {}s ago",
            now.saturating_sub(snapshot.last_update)
        )
    };

    // The blob is embedded verbatim so a polling client can re-extract it
    // without re-deriving anything server-side.
    let blob = state.store.get(STATE_KEY).ok().flatten().unwrap_or_default();

    let page = STATUS_TEMPLATE
        .replace("{{title}}", "Service Status")
        .replace(
            "{{refresh_secs}}",
            &state.board.config().refresh_interval_secs.to_string(),
        )
        .replace("{{overall_class}}", &overall_class)
        .replace("{{overall_text}}", &overall_text)
        .replace("{{groups_section}}", &groups_section)
        .replace("{{monitor_rows}}", &monitor_rows)
        .replace("{{last_update_text}}", &last_update_text)
        .replace("{{state_blob}}", &blob);

    Html(page)
}

fn severity_class(severity: crate::status::Severity) -> &'static str {
    match severity {
        crate::status::Severity::Operational => "operational",
        crate::status::Severity::Degraded => "degraded",
        crate::status::Severity::Down => "down",
    }
}

fn kind_class(kind: StatusKind) -> &'static str {
    match kind {
        StatusKind::Up => "operational",
        StatusKind::Down => "down",
        StatusKind::Maintenance => "maintenance",
        StatusKind::NoData => "no_data",
    }
}

fn kind_label(kind: StatusKind) -> &'static str {
    match kind {
        StatusKind::Up => "Operational",
        StatusKind::Down => "Down",
        StatusKind::Maintenance => "Maintenance",
        StatusKind::NoData => "No data",
    }
}

// ============================================================================
// API: compacted blob
// ============================================================================

pub async fn handle_data(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get(STATE_KEY) {
        Ok(blob) => blob.unwrap_or_default().into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// API: status queries
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MonitorRow {
    pub id: String,
    pub name: String,
    pub status: MonitorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_percent: Option<f64>,
    pub uptime: String,
    pub latency: LatencyStats,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub last_update: u64,
    pub overall: OverallSummary,
    pub groups: Vec<GroupSummary>,
    pub monitors: Vec<MonitorRow>,
}

fn monitor_row(state: &AppState, snapshot: &MonitorState, id: &str, now: u64) -> Option<MonitorRow> {
    let target = state.board.config().target(id)?;
    Some(MonitorRow {
        id: target.id.clone(),
        name: target.name.clone(),
        status: state.board.monitor_status(snapshot, id, now),
        uptime_percent: state.board.uptime_percent(snapshot, id, now),
        uptime: state.board.uptime_display(snapshot, id, now),
        latency: state.board.latency_stats(snapshot, id),
    })
}

pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.controller.current();
    let now = unix_now();

    let monitors = state
        .board
        .config()
        .monitors
        .iter()
        .filter_map(|m| monitor_row(&state, &snapshot, &m.id, now))
        .collect();

    Json(StatusResponse {
        last_update: snapshot.last_update,
        overall: state.board.overall(&snapshot),
        groups: state.board.group_summaries(&snapshot),
        monitors,
    })
}

pub async fn handle_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let snapshot = state.controller.current();
    match monitor_row(&state, &snapshot, &id, unix_now()) {
        Some(row) => Json(row).into_response(),
        None => (StatusCode::NOT_FOUND, "Monitor not found").into_response(),
    }
}

// ============================================================================
// API: collector boundary
// ============================================================================

/// One probe result from the external collector.
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub id: String,
    pub up: bool,
    #[serde(default)]
    pub ping: u32,
    #[serde(default)]
    pub cause: String,
}

pub async fn handle_report(
    State(state): State<AppState>,
    Json(req): Json<ReportRequest>,
) -> impl IntoResponse {
    if state.board.config().target(&req.id).is_none() {
        return (StatusCode::BAD_REQUEST, "Unknown monitor id").into_response();
    }

    let _guard = state.ingest_lock.lock().await;

    let blob = match state.store.get(STATE_KEY) {
        Ok(b) => b,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    let mut monitor_state = match decode(blob.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Ingest: stored state is malformed, starting fresh: {}", e);
            MonitorState::default()
        }
    };

    let now = unix_now();
    monitor_state.record(&req.id, now, req.ping, req.up, &req.cause);
    let cfg = state.board.config();
    monitor_state.prune(now, cfg.latency_retention_secs, cfg.incident_retention_secs);

    if let Err(e) = state.store.put(STATE_KEY, &encode(&monitor_state)) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    // Let the refresh loop pick the new blob up right away.
    state.controller.poke();

    StatusCode::NO_CONTENT.into_response()
}
