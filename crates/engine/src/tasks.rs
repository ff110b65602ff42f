//! # Periodic Producers
//!
//! The boundary to the excluded feed collaborators: the earthquake poller
//! and the report scraper implement the feed traits and run on their own
//! schedules, talking to the core exclusively through the
//! [`IngestionCoordinator`]. A failed poll is logged and retried on the
//! next tick, never escalated.
//!
//! ## Table of Contents
//! 1. Feed traits
//! 2. FeedRunner — interval loops + shutdown

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ingest::IngestionCoordinator;
use crate::types::{EarthquakeRecord, SightingRecord};

// ============================================================================
// 1. Feed traits
// ============================================================================

/// Source of earthquake records (the excluded HTTP poller implements this).
#[async_trait]
pub trait EarthquakeFeed: Send + Sync {
    /// Feed label for log lines
    fn name(&self) -> &str;
    /// Fetch whatever is new since the last poll
    async fn poll(&self) -> Result<Vec<EarthquakeRecord>>;
}

/// Source of sighting records (the excluded scraper implements this).
#[async_trait]
pub trait ReportFeed: Send + Sync {
    /// Feed label for log lines
    fn name(&self) -> &str;
    /// Fetch whatever is new since the last poll
    async fn poll(&self) -> Result<Vec<SightingRecord>>;
}

// ============================================================================
// 2. FeedRunner — interval loops + shutdown
// ============================================================================

/// Spawns and owns the periodic intake loops. Dropping the runner does not
/// stop them; call [`shutdown`](Self::shutdown) for a clean stop.
pub struct FeedRunner {
    coordinator: Arc<IngestionCoordinator>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl FeedRunner {
    /// Create a runner over the coordinator.
    pub fn new(coordinator: Arc<IngestionCoordinator>) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self { coordinator, stop_tx, stop_rx, handles: Vec::new() }
    }

    /// Poll an earthquake feed on a fixed interval.
    pub fn spawn_earthquake_feed(&mut self, feed: Arc<dyn EarthquakeFeed>, every: Duration) {
        let coordinator = self.coordinator.clone();
        let mut stop = self.stop_rx.clone();
        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match feed.poll().await {
                            Ok(records) => {
                                let summary = coordinator.ingest_earthquakes(records, Utc::now());
                                info!(
                                    feed = feed.name(),
                                    created = summary.created,
                                    duplicates = summary.duplicates,
                                    rejected = summary.rejected,
                                    "earthquake feed poll complete"
                                );
                            }
                            Err(e) => {
                                warn!(feed = feed.name(), error = %e, "earthquake feed poll failed; retrying next tick");
                            }
                        }
                    }
                    _ = stop.changed() => {
                        debug!(feed = feed.name(), "earthquake feed loop stopping");
                        break;
                    }
                }
            }
        }));
    }

    /// Poll a report feed on a fixed interval.
    pub fn spawn_report_feed(&mut self, feed: Arc<dyn ReportFeed>, every: Duration) {
        let coordinator = self.coordinator.clone();
        let mut stop = self.stop_rx.clone();
        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match feed.poll().await {
                            Ok(records) => {
                                let summary = coordinator.ingest_reports(records, Utc::now()).await;
                                info!(
                                    feed = feed.name(),
                                    created = summary.created,
                                    duplicates = summary.duplicates,
                                    rejected = summary.rejected,
                                    "report feed poll complete"
                                );
                            }
                            Err(e) => {
                                warn!(feed = feed.name(), error = %e, "report feed poll failed; retrying next tick");
                            }
                        }
                    }
                    _ = stop.changed() => {
                        debug!(feed = feed.name(), "report feed loop stopping");
                        break;
                    }
                }
            }
        }));
    }

    /// Run the watch housekeeping sweep on a fixed interval.
    pub fn spawn_watch_sweep(&mut self, every: Duration) {
        let coordinator = self.coordinator.clone();
        let mut stop = self.stop_rx.clone();
        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        coordinator.sweep_watches(Utc::now());
                    }
                    _ = stop.changed() => {
                        debug!("watch sweep loop stopping");
                        break;
                    }
                }
            }
        }));
    }

    /// Number of running loops
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Stop every loop and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("feed runner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, GridConfig};
    use crate::error::EngineError;
    use crate::grid::{FileGridSource, GridGate};
    use crate::proximity::ProximityIndex;
    use chrono::{TimeZone, Utc};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneShotQuakeFeed {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl EarthquakeFeed for OneShotQuakeFeed {
        fn name(&self) -> &str {
            "test-quake-feed"
        }

        async fn poll(&self) -> Result<Vec<EarthquakeRecord>> {
            if self.polls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Ok(Vec::new());
            }
            Ok(vec![EarthquakeRecord {
                external_id: "eq-feed-1".to_string(),
                magnitude: 4.0,
                latitude: 37.7,
                longitude: -122.4,
                occurred_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            }])
        }
    }

    struct FailingReportFeed;

    #[async_trait]
    impl ReportFeed for FailingReportFeed {
        fn name(&self) -> &str {
            "test-report-feed"
        }

        async fn poll(&self) -> Result<Vec<SightingRecord>> {
            Err(EngineError::unavailable("scrape target down"))
        }
    }

    fn coordinator() -> (Arc<IngestionCoordinator>, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"-122.4 37.7 30.0\n").unwrap();
        let grid_config = GridConfig {
            path: Some(file.path().to_path_buf()),
            url: None,
            load_timeout_secs: 30,
            failure_retry_secs: 900,
        };
        let gate = Arc::new(GridGate::new(
            Box::new(FileGridSource::new(file.path())),
            &grid_config,
        ));
        let reference = Arc::new(ProximityIndex::new(Vec::new()));
        (
            Arc::new(IngestionCoordinator::new(EngineConfig::default(), gate, reference)),
            file,
        )
    }

    #[tokio::test]
    async fn test_feed_records_reach_the_coordinator() {
        let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
        let (coordinator, _file) = coordinator();
        let feed = Arc::new(OneShotQuakeFeed { polls: AtomicUsize::new(0) });

        let mut runner = FeedRunner::new(coordinator.clone());
        runner.spawn_earthquake_feed(feed.clone(), Duration::from_millis(10));
        assert_eq!(runner.task_count(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        runner.shutdown().await;

        assert_eq!(coordinator.event_count(), 1);
        // re-delivery on later ticks stays deduplicated
        assert!(feed.polls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_failing_feed_keeps_retrying() {
        let (coordinator, _file) = coordinator();
        let mut runner = FeedRunner::new(coordinator.clone());
        runner.spawn_report_feed(Arc::new(FailingReportFeed), Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(40)).await;
        runner.shutdown().await;

        // failures never abort the loop or create entities
        assert_eq!(coordinator.report_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_loops() {
        let (coordinator, _file) = coordinator();
        let mut runner = FeedRunner::new(coordinator);
        runner.spawn_watch_sweep(Duration::from_millis(5));
        runner.spawn_report_feed(Arc::new(FailingReportFeed), Duration::from_millis(5));
        assert_eq!(runner.task_count(), 2);

        // must return promptly rather than hanging on live loops
        tokio::time::timeout(Duration::from_secs(2), runner.shutdown()).await.unwrap();
    }
}
