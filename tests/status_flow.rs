//! End-to-end flow: record probe results, compact into the store, refresh
//! from it, and aggregate for the page.

use std::sync::Arc;
use std::time::Duration;

use uptrail::config::AppConfig;
use uptrail::refresh::{RefreshController, RefreshOutcome, StoreSource};
use uptrail::status::{Severity, StatusBoard, StatusKind};
use uptrail::store::{encode, KvStore, MonitorState, STATE_KEY};

fn test_config() -> AppConfig {
    AppConfig::from_json(
        r#"{
            "monitors": [
                {"id": "web", "name": "Website"},
                {"id": "api", "name": "API"},
                {"id": "db", "name": "Database"}
            ],
            "groups": [
                {"name": "Edge", "monitors": ["web", "api"]},
                {"name": "Backend", "monitors": ["db"]}
            ],
            "maintenances": [
                {"start": "1970-01-01T00:00:00Z", "monitors": ["db"]}
            ]
        }"#,
    )
    .unwrap()
}

fn collected_state(now: u64) -> MonitorState {
    let mut state = MonitorState::default();
    // web: one resolved outage, healthy since.
    state.record("web", now - 3000, 80, true, "");
    state.record("web", now - 2000, 0, false, "http 502");
    state.record("web", now - 1000, 90, true, "");
    // api: healthy throughout.
    state.record("api", now - 3000, 120, true, "");
    state.record("api", now - 1000, 110, true, "");
    // db: currently down, covered by an open-ended maintenance window.
    state.record("db", now - 500, 0, false, "connect refused");
    state
}

#[tokio::test]
async fn record_compact_refresh_aggregate() {
    let now = 100_000;
    let store = KvStore::open_in_memory().unwrap();
    store.put(STATE_KEY, &encode(&collected_state(now))).unwrap();

    let controller = RefreshController::new(
        Arc::new(StoreSource::new(store.clone())),
        Duration::from_secs(60),
    );
    assert_eq!(controller.refresh_once().await, RefreshOutcome::Updated);
    let snapshot = controller.current();
    assert_eq!(*snapshot, collected_state(now));

    let board = StatusBoard::new(test_config());

    // Overall: one of three down.
    let overall = board.overall(&snapshot);
    assert_eq!(overall.down_count, 1);
    assert_eq!(overall.severity, Severity::Degraded);

    // Groups: edge fully up, backend fully down.
    let edge = board.group_summary(&snapshot, "Edge").unwrap();
    assert_eq!(edge.severity, Severity::Operational);
    let backend = board.group_summary(&snapshot, "Backend").unwrap();
    assert_eq!(backend.severity, Severity::Down);
    assert_eq!(backend.down_count, 1);

    // db is down but inside maintenance; the stored incident survives.
    let db_status = board.monitor_status(&snapshot, "db", now);
    assert_eq!(db_status.kind, StatusKind::Maintenance);
    assert!(snapshot.monitor("db").unwrap().is_down());

    // web recovered: uptime covers the 1000s outage in a 2000s window.
    let web_status = board.monitor_status(&snapshot, "web", now);
    assert_eq!(web_status.kind, StatusKind::Up);
    let uptime = board.uptime_percent(&snapshot, "web", now).unwrap();
    assert!((uptime - 50.0).abs() < 1e-9);
    assert_eq!(board.uptime_display(&snapshot, "web", now), "50.00%");

    // api never went down: no incident window, so no uptime figure.
    assert_eq!(board.uptime_display(&snapshot, "api", now), "no data");
    let api_latency = board.latency_stats(&snapshot, "api");
    assert_eq!(api_latency.latest_ms, 110);
    assert_eq!(api_latency.average_ms, 115);
}

#[tokio::test]
async fn empty_store_renders_as_no_data() {
    let store = KvStore::open_in_memory().unwrap();
    let controller = RefreshController::new(
        Arc::new(StoreSource::new(store)),
        Duration::from_secs(60),
    );
    assert_eq!(controller.refresh_once().await, RefreshOutcome::Updated);
    let snapshot = controller.current();
    assert!(snapshot.is_empty());

    let board = StatusBoard::new(test_config());
    assert_eq!(
        board.monitor_status(&snapshot, "web", 1000).kind,
        StatusKind::NoData
    );
    assert_eq!(board.overall(&snapshot).down_count, 0);
    assert_eq!(board.uptime_display(&snapshot, "web", 1000), "no data");
}
