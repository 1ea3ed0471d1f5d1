//! Periodic refresh of the live monitor state.
//!
//! A controller polls a [`StateSource`] on a fixed interval, decodes the
//! compacted blob, and swaps the result into an [`ArcSwap`] slot that
//! readers load lock-free. Failed attempts leave the previously published
//! state untouched and are retried on the next tick; at most one refresh
//! runs at a time.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tokio::sync::Notify;

use crate::store::{decode, KvStore, MonitorState, STATE_KEY};

/// Fetch error types.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("state blob not found in page payload")]
    Pattern,
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

/// Where a refresh cycle gets the compacted blob from.
///
/// `Ok(None)` means no state has been stored yet, which is a valid
/// "no data" outcome, not a failure.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn fetch(&self) -> Result<Option<String>, FetchError>;
}

/// Reads the blob straight from the local key-value store.
pub struct StoreSource {
    store: KvStore,
}

impl StoreSource {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StateSource for StoreSource {
    async fn fetch(&self) -> Result<Option<String>, FetchError> {
        Ok(self.store.get(STATE_KEY)?)
    }
}

/// Fetches the hosting page over HTTP and extracts the embedded blob,
/// the way the browser-side refresh loop re-reads its own page.
pub struct PageSource {
    client: reqwest::Client,
    url: String,
    pattern: Regex,
}

impl PageSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            // Matches the embed written by the status page template.
            pattern: Regex::new(r#"id="monitor-state"[^>]*>([A-Za-z0-9+/=]*)<"#)
                .expect("embed pattern is valid"),
        }
    }
}

#[async_trait]
impl StateSource for PageSource {
    async fn fetch(&self) -> Result<Option<String>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let body = response
            .error_for_status()
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let captures = self.pattern.captures(&body).ok_or(FetchError::Pattern)?;
        let blob = captures[1].to_string();
        Ok(if blob.is_empty() { None } else { Some(blob) })
    }
}

/// Outcome of a single refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New state decoded and published.
    Updated,
    /// A refresh was already in flight; this tick did nothing.
    Skipped,
    /// Fetch or decode failed; the published state is unchanged.
    Failed,
}

const IDLE: u8 = 0;
const REFRESHING: u8 = 1;

/// Timer-driven fetch/decode/swap loop around the live state slot.
pub struct RefreshController {
    slot: Arc<ArcSwap<MonitorState>>,
    source: Arc<dyn StateSource>,
    interval: Duration,
    phase: AtomicU8,
    nudge: Notify,
}

impl RefreshController {
    pub fn new(source: Arc<dyn StateSource>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            slot: Arc::new(ArcSwap::from_pointee(MonitorState::default())),
            source,
            interval,
            phase: AtomicU8::new(IDLE),
            nudge: Notify::new(),
        })
    }

    /// Last successfully decoded state. Loads are lock-free; a refresh
    /// replaces the whole value, never mutates it in place.
    pub fn current(&self) -> Arc<MonitorState> {
        self.slot.load_full()
    }

    /// Ask the run loop to refresh before its next scheduled tick.
    pub fn poke(&self) {
        self.nudge.notify_one();
    }

    /// Run one fetch/decode/swap cycle.
    ///
    /// A cycle that starts while another is in flight is skipped, not
    /// queued. Any failure leaves the slot untouched.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        if self
            .phase
            .compare_exchange(IDLE, REFRESHING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return RefreshOutcome::Skipped;
        }

        let outcome = match self.source.fetch().await {
            Ok(blob) => match decode(blob.as_deref()) {
                Ok(state) => {
                    self.slot.store(Arc::new(state));
                    RefreshOutcome::Updated
                }
                Err(e) => {
                    tracing::warn!("Refresh: discarding malformed state: {}", e);
                    RefreshOutcome::Failed
                }
            },
            Err(e) => {
                tracing::debug!("Refresh: fetch failed, keeping previous state: {}", e);
                RefreshOutcome::Failed
            }
        };

        self.phase.store(IDLE, Ordering::Release);
        outcome
    }

    /// Run the periodic loop until the stop signal fires.
    ///
    /// The first tick happens immediately so the slot is populated before
    /// the first render where possible.
    pub async fn run(self: Arc<Self>, mut stop: tokio::sync::broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop.recv() => break,
                _ = interval.tick() => {
                    self.refresh_once().await;
                }
                _ = self.nudge.notified() => {
                    self.refresh_once().await;
                }
            }
        }
    }

    /// Spawn the loop on the runtime, returning the stop handle.
    pub fn start(self: &Arc<Self>) -> tokio::sync::broadcast::Sender<()> {
        let (tx, rx) = tokio::sync::broadcast::channel(1);
        tokio::spawn(self.clone().run(rx));
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource(Option<String>);

    #[async_trait]
    impl StateSource for StaticSource {
        async fn fetch(&self) -> Result<Option<String>, FetchError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_absent_blob_publishes_empty_state() {
        let controller =
            RefreshController::new(Arc::new(StaticSource(None)), Duration::from_secs(60));
        assert_eq!(controller.refresh_once().await, RefreshOutcome::Updated);
        assert!(controller.current().is_empty());
    }

    #[tokio::test]
    async fn test_page_source_pattern() {
        let source = PageSource::new("http://localhost/");
        let body = r#"<html><script id="monitor-state" type="text/plain">AQID</script></html>"#;
        let captures = source.pattern.captures(body).unwrap();
        assert_eq!(&captures[1], "AQID");
        assert!(source.pattern.captures("<html>nope</html>").is_none());
    }
}
