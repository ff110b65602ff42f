//! # Geomagnetic Anomaly Grid
//!
//! Loads a dense, irregularly-ordered XYZ value grid and answers
//! nearest-value lookups for arbitrary coordinates via an R-tree over
//! unit-sphere points, so nearest-neighbor is exact in great-circle terms.
//!
//! The grid is large (tens of megabytes) and lives behind [`GridGate`]: it
//! is not fetched until the first lookup, exactly one fetch+parse happens no
//! matter how many callers race on the first load, and a failed load is
//! cached for a bounded interval instead of hammering the origin.
//!
//! ## Table of Contents
//! 1. GridSample — one grid cell
//! 2. SpatialGrid — R-tree index + lookups
//! 3. XYZ parsing
//! 4. GridSource — fetch abstraction (file / HTTP)
//! 5. GridGate — lazy single-acquisition gate

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::GridConfig;
use crate::coords::to_unit_sphere;
use crate::error::{EngineError, Result};

// ============================================================================
// 1. GridSample — one grid cell
// ============================================================================

/// One grid cell: a coordinate and its anomaly value in nanotesla.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSample {
    /// Latitude (degrees)
    pub latitude: f64,
    /// Longitude (degrees)
    pub longitude: f64,
    /// Anomaly value (nT)
    pub value: f64,
}

/// R-tree entry: unit-sphere position plus the sample's load index.
type GridNode = GeomWithData<[f64; 3], usize>;

// ============================================================================
// 2. SpatialGrid — R-tree index + lookups
// ============================================================================

/// Read-only spatial index over the loaded grid. Shared without locking.
#[derive(Debug)]
pub struct SpatialGrid {
    tree: RTree<GridNode>,
    samples: Vec<GridSample>,
}

impl SpatialGrid {
    /// Build the index. Duplicate exact coordinates collapse last-write-wins
    /// (keeping the first occurrence's index position). An empty sample set
    /// is a load failure, which keeps `value_at` total on any built grid.
    pub fn from_samples(raw: Vec<GridSample>) -> Result<Self> {
        if raw.is_empty() {
            return Err(EngineError::unavailable("grid source produced no samples"));
        }

        let mut samples: Vec<GridSample> = Vec::with_capacity(raw.len());
        let mut seen: std::collections::HashMap<(u64, u64), usize> =
            std::collections::HashMap::with_capacity(raw.len());
        for sample in raw {
            let key = (sample.latitude.to_bits(), sample.longitude.to_bits());
            match seen.get(&key) {
                Some(&idx) => samples[idx].value = sample.value,
                None => {
                    seen.insert(key, samples.len());
                    samples.push(sample);
                }
            }
        }

        let nodes: Vec<GridNode> = samples
            .iter()
            .enumerate()
            .map(|(idx, s)| GridNode::new(to_unit_sphere(s.latitude, s.longitude), idx))
            .collect();

        Ok(Self { tree: RTree::bulk_load(nodes), samples })
    }

    /// Number of indexed samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the grid holds no samples (never true for a built grid)
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Anomaly value at a location. Total and deterministic: always the
    /// nearest sample's value, which also covers out-of-extent queries.
    pub fn value_at(&self, lat: f64, lon: f64) -> f64 {
        self.nearest_sample(lat, lon).value
    }

    /// Nearest sample in great-circle terms. Among equidistant samples the
    /// lowest load index wins.
    pub fn nearest_sample(&self, lat: f64, lon: f64) -> GridSample {
        let query = to_unit_sphere(lat, lon);
        let mut best: Option<(usize, f64)> = None;
        for node in self.tree.nearest_neighbor_iter(&query) {
            let d2 = chord_sq(node.geom(), &query);
            match best {
                None => best = Some((node.data, d2)),
                Some((_, best_d2)) if d2 > best_d2 => break,
                Some((best_idx, best_d2)) if d2 == best_d2 && node.data < best_idx => {
                    best = Some((node.data, d2));
                }
                _ => {}
            }
        }
        let idx = best.map(|(idx, _)| idx).unwrap_or(0);
        self.samples[idx]
    }
}

fn chord_sq(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

// ============================================================================
// 3. XYZ parsing
// ============================================================================

/// Parse whitespace-separated `lon lat value` triples, one per line.
/// Malformed or out-of-range lines are counted and skipped, never fatal.
pub fn parse_xyz(bytes: &[u8]) -> Result<Vec<GridSample>> {
    use std::io::BufRead;

    let mut samples = Vec::new();
    let mut malformed = 0usize;

    for line in bytes.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut fields = trimmed.split_whitespace();
        let parsed = (
            fields.next().and_then(|f| f.parse::<f64>().ok()),
            fields.next().and_then(|f| f.parse::<f64>().ok()),
            fields.next().and_then(|f| f.parse::<f64>().ok()),
        );
        match parsed {
            (Some(lon), Some(lat), Some(value))
                if lat.is_finite()
                    && lon.is_finite()
                    && value.is_finite()
                    && (-90.0..=90.0).contains(&lat)
                    && (-180.0..=180.0).contains(&lon) =>
            {
                samples.push(GridSample { latitude: lat, longitude: lon, value });
            }
            _ => malformed += 1,
        }
    }

    if malformed > 0 {
        warn!(skipped = malformed, kept = samples.len(), "skipped unparseable grid lines");
    }
    Ok(samples)
}

// ============================================================================
// 4. GridSource — fetch abstraction (file / HTTP)
// ============================================================================

/// Where the raw XYZ bytes come from.
#[async_trait]
pub trait GridSource: Send + Sync {
    /// Fetch the full dataset
    async fn fetch(&self) -> Result<Vec<u8>>;
    /// Label for log lines
    fn describe(&self) -> String;
}

/// Local XYZ file source.
pub struct FileGridSource {
    path: std::path::PathBuf,
}

impl FileGridSource {
    /// Create a file source
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl GridSource for FileGridSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path).await.map_err(|e| {
            EngineError::unavailable(format!("{}: {}", self.path.display(), e))
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Remote XYZ source fetched over HTTP.
#[cfg(feature = "http-source")]
pub struct HttpGridSource {
    url: String,
    client: reqwest::Client,
}

#[cfg(feature = "http-source")]
impl HttpGridSource {
    /// Create an HTTP source
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new() }
    }
}

#[cfg(feature = "http-source")]
#[async_trait]
impl GridSource for HttpGridSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| EngineError::unavailable(format!("{}: {}", self.url, e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::unavailable(format!("{}: {}", self.url, e)))?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

// ============================================================================
// 5. GridGate — lazy single-acquisition gate
// ============================================================================

enum GateState {
    /// Nothing loaded yet
    Idle,
    /// Load succeeded; served forever
    Ready(Arc<SpatialGrid>),
    /// Load failed; served until the retry interval elapses
    Failed { at: Instant, reason: String },
}

/// Lazy, one-time acquisition gate around the grid.
///
/// The first caller performs the load while holding the write lock, so
/// concurrent first-callers queue on that same load rather than duplicating
/// the fetch. A failure is cached and re-served for `failure_retry_secs`
/// before another attempt is allowed.
pub struct GridGate {
    source: Box<dyn GridSource>,
    load_timeout: Duration,
    failure_retry: Duration,
    state: RwLock<GateState>,
}

impl GridGate {
    /// Create a gate over an explicit source.
    pub fn new(source: Box<dyn GridSource>, config: &GridConfig) -> Self {
        Self {
            source,
            load_timeout: Duration::from_secs(config.load_timeout_secs),
            failure_retry: Duration::from_secs(config.failure_retry_secs),
            state: RwLock::new(GateState::Idle),
        }
    }

    /// Create a gate from config: `path` wins over `url`.
    pub fn from_config(config: &GridConfig) -> Result<Self> {
        if let Some(path) = &config.path {
            return Ok(Self::new(Box::new(FileGridSource::new(path.clone())), config));
        }
        #[cfg(feature = "http-source")]
        if let Some(url) = &config.url {
            return Ok(Self::new(Box::new(HttpGridSource::new(url.clone())), config));
        }
        Err(EngineError::config(
            "grid source requires a path (or a url with the http-source feature)",
        ))
    }

    /// Acquire the loaded grid, loading it on first use.
    pub async fn acquire(&self) -> Result<Arc<SpatialGrid>> {
        // Fast path: already resolved
        {
            let state = self.state.read().await;
            match &*state {
                GateState::Ready(grid) => return Ok(grid.clone()),
                GateState::Failed { at, reason } if at.elapsed() < self.failure_retry => {
                    return Err(EngineError::unavailable(reason.clone()));
                }
                _ => {}
            }
        }

        // Slow path: one loader at a time; queued callers re-check on entry
        let mut state = self.state.write().await;
        match &*state {
            GateState::Ready(grid) => return Ok(grid.clone()),
            GateState::Failed { at, reason } if at.elapsed() < self.failure_retry => {
                return Err(EngineError::unavailable(reason.clone()));
            }
            _ => {}
        }

        let started = Instant::now();
        let loaded = match tokio::time::timeout(self.load_timeout, self.load()).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::unavailable(format!(
                "grid load from {} timed out after {:?}",
                self.source.describe(),
                self.load_timeout
            ))),
        };

        match loaded {
            Ok(grid) => {
                let grid = Arc::new(grid);
                info!(
                    source = %self.source.describe(),
                    samples = grid.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "grid loaded"
                );
                *state = GateState::Ready(grid.clone());
                Ok(grid)
            }
            Err(e) => {
                warn!(
                    source = %self.source.describe(),
                    error = %e,
                    retry_after = ?self.failure_retry,
                    "grid load failed; caching failure"
                );
                let reason = e.to_string();
                *state = GateState::Failed { at: Instant::now(), reason: reason.clone() };
                Err(EngineError::unavailable(reason))
            }
        }
    }

    /// Whether a grid is currently resolved and ready.
    pub async fn is_loaded(&self) -> bool {
        matches!(&*self.state.read().await, GateState::Ready(_))
    }

    async fn load(&self) -> Result<SpatialGrid> {
        let bytes = self.source.fetch().await?;
        let samples = parse_xyz(&bytes)?;
        SpatialGrid::from_samples(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source that counts fetches.
    struct StaticSource {
        bytes: Vec<u8>,
        fetches: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    impl StaticSource {
        fn ok(data: &str) -> Self {
            Self {
                bytes: data.as_bytes().to_vec(),
                fetches: AtomicUsize::new(0),
                fail: false,
                delay: None,
            }
        }

        fn failing() -> Self {
            Self { bytes: Vec::new(), fetches: AtomicUsize::new(0), fail: true, delay: None }
        }

        fn slow(data: &str, delay: Duration) -> Self {
            Self {
                bytes: data.as_bytes().to_vec(),
                fetches: AtomicUsize::new(0),
                fail: false,
                delay: Some(delay),
            }
        }
    }

    #[async_trait]
    impl GridSource for Arc<StaticSource> {
        async fn fetch(&self) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(EngineError::unavailable("static source configured to fail"));
            }
            Ok(self.bytes.clone())
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    fn gate_over(source: Arc<StaticSource>, retry_secs: u64, timeout_secs: u64) -> GridGate {
        let config = GridConfig {
            path: None,
            url: None,
            load_timeout_secs: timeout_secs,
            failure_retry_secs: retry_secs,
        };
        GridGate::new(Box::new(source), &config)
    }

    const THREE_SAMPLES: &str = "-122.0 37.0 30.0\n-121.0 37.0 120.0\n-120.0 37.0 250.0\n";

    #[test]
    fn test_parse_xyz_skips_malformed() {
        let data = "-122.0 37.0 30.0\nnot a line\n-121.0 999.0 5.0\n\n# comment\n-120.0 36.0 10.0\n";
        let samples = parse_xyz(data.as_bytes()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].longitude, -122.0);
        assert_eq!(samples[1].value, 10.0);
    }

    #[test]
    fn test_duplicate_coordinates_last_write_wins() {
        let samples = vec![
            GridSample { latitude: 37.0, longitude: -122.0, value: 1.0 },
            GridSample { latitude: 38.0, longitude: -121.0, value: 2.0 },
            GridSample { latitude: 37.0, longitude: -122.0, value: 9.0 },
        ];
        let grid = SpatialGrid::from_samples(samples).unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.value_at(37.0, -122.0), 9.0);
    }

    #[test]
    fn test_empty_grid_is_load_failure() {
        assert!(matches!(
            SpatialGrid::from_samples(Vec::new()),
            Err(EngineError::DataUnavailable(_))
        ));
    }

    #[test]
    fn test_value_at_is_deterministic() {
        let samples = parse_xyz(THREE_SAMPLES.as_bytes()).unwrap();
        let grid = SpatialGrid::from_samples(samples).unwrap();
        let first = grid.value_at(37.2, -121.9);
        let second = grid.value_at(37.2, -121.9);
        assert_eq!(first, second);
        assert_eq!(first, 30.0);
    }

    #[test]
    fn test_nearest_fallback_outside_extent() {
        let samples = parse_xyz(THREE_SAMPLES.as_bytes()).unwrap();
        let grid = SpatialGrid::from_samples(samples).unwrap();
        // far east of the extent: nearest is the easternmost sample
        assert_eq!(grid.value_at(37.0, -100.0), 250.0);
    }

    #[test]
    fn test_nearest_tie_breaks_to_lowest_index() {
        // two samples symmetric about the query longitude
        let samples = vec![
            GridSample { latitude: 37.0, longitude: -121.0, value: 111.0 },
            GridSample { latitude: 37.0, longitude: -123.0, value: 222.0 },
        ];
        let grid = SpatialGrid::from_samples(samples).unwrap();
        assert_eq!(grid.value_at(37.0, -122.0), 111.0);

        // reversed load order flips the winner
        let samples = vec![
            GridSample { latitude: 37.0, longitude: -123.0, value: 222.0 },
            GridSample { latitude: 37.0, longitude: -121.0, value: 111.0 },
        ];
        let grid = SpatialGrid::from_samples(samples).unwrap();
        assert_eq!(grid.value_at(37.0, -122.0), 222.0);
    }

    #[tokio::test]
    async fn test_gate_loads_once_under_contention() {
        let source = Arc::new(StaticSource::slow(THREE_SAMPLES, Duration::from_millis(20)));
        let gate = Arc::new(gate_over(source.clone(), 900, 30));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move { gate.acquire().await }));
        }
        for handle in handles {
            let grid = handle.await.unwrap().unwrap();
            assert_eq!(grid.len(), 3);
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gate_caches_failure() {
        let source = Arc::new(StaticSource::failing());
        let gate = gate_over(source.clone(), 900, 30);

        assert!(gate.acquire().await.is_err());
        assert!(gate.acquire().await.is_err());
        assert!(gate.acquire().await.is_err());
        // only the first call hit the source; the rest served the cached failure
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(!gate.is_loaded().await);
    }

    #[tokio::test]
    async fn test_gate_times_out_slow_load() {
        let source = Arc::new(StaticSource::slow(THREE_SAMPLES, Duration::from_secs(5)));
        let config = GridConfig {
            path: None,
            url: None,
            load_timeout_secs: 0,
            failure_retry_secs: 900,
        };
        let gate = GridGate::new(Box::new(source), &config);
        match gate.acquire().await {
            Err(EngineError::DataUnavailable(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gate_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(THREE_SAMPLES.as_bytes()).unwrap();

        let config = GridConfig {
            path: Some(file.path().to_path_buf()),
            url: None,
            load_timeout_secs: 30,
            failure_retry_secs: 900,
        };
        let gate = GridGate::from_config(&config).unwrap();
        let grid = gate.acquire().await.unwrap();
        assert_eq!(grid.len(), 3);
        assert!(gate.is_loaded().await);
    }

    #[test]
    fn test_gate_requires_a_source() {
        let config = GridConfig::default();
        assert!(matches!(GridGate::from_config(&config), Err(EngineError::Config(_))));
    }
}
