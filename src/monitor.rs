//! Confirmation monitor
//!
//! Tracks settlement depth of broadcast transactions. One periodic task per
//! tracked txid polls the chain tracker; a push notification path re-checks
//! immediately without waiting for the next tick. Successive checks for the
//! same txid never overlap; distinct txids poll concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::collaborators::ChainTracker;

/// Confirmation monitor configuration
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Fixed poll interval
    pub poll_interval: Duration,
    /// Attempt cap; tracking stops silently once elapsed
    pub max_attempts: u32,
    /// Depth at which a transaction counts as settled
    pub confirmation_threshold: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_attempts: 2880, // ~48 hours at the default interval
            confirmation_threshold: 6,
        }
    }
}

/// Receiver of confirmation updates
#[async_trait::async_trait]
pub trait ConfirmationSink: Send + Sync {
    /// Called with the current depth of a tracked transaction
    async fn on_confirmation_update(&self, txid: &str, confirmations: u32, block_height: u64);
}

struct TrackedEntry {
    handle: JoinHandle<()>,
    guard: Arc<Mutex<()>>,
}

/// Tracks settlement depth of broadcast transactions
pub struct ConfirmationMonitor {
    config: MonitorConfig,
    tracker: Arc<dyn ChainTracker>,
    sink: Arc<RwLock<Option<Weak<dyn ConfirmationSink>>>>,
    tracked: Arc<RwLock<HashMap<String, TrackedEntry>>>,
}

impl ConfirmationMonitor {
    /// Create a monitor over a chain tracker
    pub fn new(tracker: Arc<dyn ChainTracker>, config: MonitorConfig) -> Self {
        Self {
            config,
            tracker,
            sink: Arc::new(RwLock::new(None)),
            tracked: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bind the update receiver
    ///
    /// Held weakly; tracking tasks stop themselves once the receiver drops.
    pub async fn bind(&self, sink: Weak<dyn ConfirmationSink>) {
        *self.sink.write().await = Some(sink);
    }

    /// Start tracking a transaction; a no-op when already tracked
    pub async fn track(&self, txid: &str) {
        let mut tracked = self.tracked.write().await;
        if tracked.contains_key(txid) {
            debug!(txid, "already tracking");
            return;
        }
        let guard = Arc::new(Mutex::new(()));
        let handle = tokio::spawn(poll_loop(
            txid.to_string(),
            self.config.clone(),
            self.tracker.clone(),
            self.sink.clone(),
            guard.clone(),
            self.tracked.clone(),
        ));
        tracked.insert(txid.to_string(), TrackedEntry { handle, guard });
        debug!(txid, "tracking confirmations");
    }

    /// Re-check one transaction immediately, off the poll schedule
    pub async fn check_now(&self, txid: &str) {
        let guard = {
            self.tracked
                .read()
                .await
                .get(txid)
                .map(|entry| entry.guard.clone())
        };
        let Some(guard) = guard else {
            return;
        };
        let done = check_once(
            txid,
            self.config.confirmation_threshold,
            &self.tracker,
            &self.sink,
            &guard,
        )
        .await;
        if done {
            self.stop(txid).await;
        }
    }

    /// Re-check every tracked transaction immediately
    pub async fn check_all(&self) {
        let txids: Vec<String> = self.tracked.read().await.keys().cloned().collect();
        for txid in txids {
            self.check_now(&txid).await;
        }
    }

    /// Stop tracking one transaction
    pub async fn stop(&self, txid: &str) {
        if let Some(entry) = self.tracked.write().await.remove(txid) {
            entry.handle.abort();
            debug!(txid, "stopped tracking");
        }
    }

    /// Stop all tracking tasks; safe for teardown
    pub async fn stop_all(&self) {
        let mut tracked = self.tracked.write().await;
        for (txid, entry) in tracked.drain() {
            entry.handle.abort();
            debug!(txid = %txid, "stopped tracking");
        }
    }

    /// Whether a transaction is currently tracked
    pub async fn is_tracking(&self, txid: &str) -> bool {
        self.tracked.read().await.contains_key(txid)
    }

    /// Number of tracked transactions
    pub async fn tracked_count(&self) -> usize {
        self.tracked.read().await.len()
    }
}

async fn poll_loop(
    txid: String,
    config: MonitorConfig,
    tracker: Arc<dyn ChainTracker>,
    sink: Arc<RwLock<Option<Weak<dyn ConfirmationSink>>>>,
    guard: Arc<Mutex<()>>,
    tracked: Arc<RwLock<HashMap<String, TrackedEntry>>>,
) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts = 0u32;

    loop {
        interval.tick().await;
        attempts += 1;
        if check_once(
            &txid,
            config.confirmation_threshold,
            &tracker,
            &sink,
            &guard,
        )
        .await
        {
            break;
        }
        if attempts >= config.max_attempts {
            info!(txid = %txid, attempts, "confirmation attempt cap reached, stopping tracking");
            break;
        }
    }

    tracked.write().await.remove(&txid);
}

/// One poll of the chain tracker; returns true when tracking should stop
async fn check_once(
    txid: &str,
    threshold: u32,
    tracker: &Arc<dyn ChainTracker>,
    sink: &Arc<RwLock<Option<Weak<dyn ConfirmationSink>>>>,
    guard: &Arc<Mutex<()>>,
) -> bool {
    // single-flight per txid: skip when a check is already in flight
    let Ok(_permit) = guard.try_lock() else {
        return false;
    };

    let height = match tracker.current_height().await {
        Ok(height) => height,
        Err(e) => {
            warn!(txid = %txid, error = %e, "chain height query failed");
            return false;
        }
    };
    let proof = match tracker.merkle_proof(txid).await {
        Ok(proof) => proof,
        Err(e) => {
            warn!(txid = %txid, error = %e, "merkle proof query failed");
            return false;
        }
    };
    let Some(proof) = proof else {
        return false; // not mined yet
    };
    if height < proof.block_height {
        return false;
    }
    let confirmations = u32::try_from(height - proof.block_height + 1).unwrap_or(u32::MAX);

    let Some(sink) = sink.read().await.clone().and_then(|weak| weak.upgrade()) else {
        return true; // receiver gone, nothing left to notify
    };
    sink.on_confirmation_update(txid, confirmations, proof.block_height)
        .await;

    confirmations >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MemoryChainTracker;

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<(String, u32, u64)>>,
    }

    impl RecordingSink {
        async fn updates(&self) -> Vec<(String, u32, u64)> {
            self.updates.lock().await.clone()
        }
    }

    #[async_trait::async_trait]
    impl ConfirmationSink for RecordingSink {
        async fn on_confirmation_update(&self, txid: &str, confirmations: u32, block_height: u64) {
            self.updates
                .lock()
                .await
                .push((txid.to_string(), confirmations, block_height));
        }
    }

    fn fast_config(max_attempts: u32) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(10),
            max_attempts,
            confirmation_threshold: 6,
        }
    }

    #[tokio::test]
    async fn test_track_is_idempotent() {
        let tracker = Arc::new(MemoryChainTracker::new());
        let monitor = ConfirmationMonitor::new(tracker, fast_config(1000));

        monitor.track("aa").await;
        monitor.track("aa").await;
        assert_eq!(monitor.tracked_count().await, 1);

        monitor.stop_all().await;
        assert_eq!(monitor.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn test_updates_fire_and_stop_at_threshold() {
        let tracker = Arc::new(MemoryChainTracker::new());
        let monitor = ConfirmationMonitor::new(tracker.clone(), fast_config(1000));
        let sink = Arc::new(RecordingSink::default());
        let sink_dyn: Arc<dyn ConfirmationSink> = sink.clone();
        monitor.bind(Arc::downgrade(&sink_dyn)).await;

        tracker.set_height(105).await;
        tracker.confirm("aa", 100).await; // 6 confirmations
        monitor.track("aa").await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        let updates = sink.updates().await;
        assert!(!updates.is_empty());
        assert_eq!(updates[0], ("aa".to_string(), 6, 100));
        assert!(!monitor.is_tracking("aa").await);
    }

    #[tokio::test]
    async fn test_check_now_bypasses_poll_schedule() {
        let tracker = Arc::new(MemoryChainTracker::new());
        let monitor = ConfirmationMonitor::new(
            tracker.clone(),
            MonitorConfig {
                poll_interval: Duration::from_secs(3600),
                max_attempts: 10,
                confirmation_threshold: 6,
            },
        );
        let sink = Arc::new(RecordingSink::default());
        let sink_dyn: Arc<dyn ConfirmationSink> = sink.clone();
        monitor.bind(Arc::downgrade(&sink_dyn)).await;

        monitor.track("bb").await;
        tokio::time::sleep(Duration::from_millis(20)).await; // let the first tick pass
        assert!(sink.updates().await.is_empty()); // unmined, no update

        tracker.set_height(100).await;
        tracker.confirm("bb", 100).await; // 1 confirmation
        monitor.check_now("bb").await;

        let updates = sink.updates().await;
        assert_eq!(updates, vec![("bb".to_string(), 1, 100)]);
        assert!(monitor.is_tracking("bb").await); // below threshold, still tracked

        monitor.stop_all().await;
    }

    #[tokio::test]
    async fn test_attempt_cap_stops_tracking_silently() {
        let tracker = Arc::new(MemoryChainTracker::new());
        let monitor = ConfirmationMonitor::new(tracker, fast_config(2));
        let sink = Arc::new(RecordingSink::default());
        let sink_dyn: Arc<dyn ConfirmationSink> = sink.clone();
        monitor.bind(Arc::downgrade(&sink_dyn)).await;

        monitor.track("cc").await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(!monitor.is_tracking("cc").await);
        assert!(sink.updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_tracker_errors_are_swallowed_but_count() {
        let tracker = Arc::new(MemoryChainTracker::new());
        tracker.set_failing(true).await;
        let monitor = ConfirmationMonitor::new(tracker, fast_config(3));

        monitor.track("dd").await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        // cap applied despite every poll failing
        assert!(!monitor.is_tracking("dd").await);
    }
}
