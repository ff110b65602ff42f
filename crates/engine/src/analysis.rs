//! # Correlation Analysis
//!
//! Population-level statistics over the accumulated report set: observed
//! proximity distributions vs. a randomized baseline with rank-based
//! significance testing and family-wise correction, plus a grid-value rank
//! correlation. Results are transient and cached only for a bounded TTL.
//!
//! ## Table of Contents
//! 1. BaselineGenerator — randomized comparison samples
//! 2. ScoredPoint — analyzer input
//! 3. CorrelationAnalyzer
//! 4. Result cache

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::coords::BoundingRegion;
use crate::error::{EngineError, Result};
use crate::grid::GridGate;
use crate::proximity::ProximityIndex;
use crate::stats::{bonferroni, mann_whitney_u, spearman};
use crate::types::CorrelationResult;

// ============================================================================
// 1. BaselineGenerator — randomized comparison samples
// ============================================================================

/// Draws the randomized comparison sample for one analysis invocation.
pub trait BaselineGenerator: Send + Sync {
    /// Sample `n` points within the region as `(lat, lon)` pairs.
    fn sample(&self, n: usize, region: &BoundingRegion) -> Vec<(f64, f64)>;
}

/// Area-uniform sampling within a bounding region: longitude uniform,
/// latitude uniform in its sine. A fixed seed makes the baseline
/// reproducible; without one, fresh entropy per invocation.
pub struct UniformBaseline {
    seed: Option<u64>,
}

impl UniformBaseline {
    /// Fresh entropy per invocation
    pub fn new() -> Self {
        Self { seed: None }
    }

    /// Reproducible baseline for a fixed seed
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    /// Seeded when the config pins a seed, fresh otherwise
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self { seed: config.baseline_seed }
    }
}

impl Default for UniformBaseline {
    fn default() -> Self {
        Self::new()
    }
}

impl BaselineGenerator for UniformBaseline {
    fn sample(&self, n: usize, region: &BoundingRegion) -> Vec<(f64, f64)> {
        let mut rng: StdRng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let sin_min = region.lat_min.to_radians().sin();
        let sin_max = region.lat_max.to_radians().sin();
        (0..n)
            .map(|_| {
                let lat = rng.gen_range(sin_min..=sin_max).asin().to_degrees();
                let lon = rng.gen_range(region.lon_min..=region.lon_max);
                (lat, lon)
            })
            .collect()
    }
}

// ============================================================================
// 2. ScoredPoint — analyzer input
// ============================================================================

/// A report location with its composite score, for grid correlation.
#[derive(Debug, Clone, Copy)]
pub struct ScoredPoint {
    /// Latitude (degrees)
    pub latitude: f64,
    /// Longitude (degrees)
    pub longitude: f64,
    /// Composite score
    pub score: f64,
}

// ============================================================================
// 3. CorrelationAnalyzer
// ============================================================================

/// Computes aggregate comparisons against the static layers. Reads a
/// point-in-time snapshot handed in by the caller and never blocks
/// ingestion.
pub struct CorrelationAnalyzer {
    reference: Arc<ProximityIndex>,
    grid: Arc<GridGate>,
    config: AnalysisConfig,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    at: Instant,
    results: Vec<CorrelationResult>,
}

impl CorrelationAnalyzer {
    /// Create an analyzer over the static layers.
    pub fn new(reference: Arc<ProximityIndex>, grid: Arc<GridGate>, config: AnalysisConfig) -> Self {
        Self { reference, grid, config, cache: Mutex::new(HashMap::new()) }
    }

    /// The analysis parameters
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Observed-vs-baseline proximity comparison.
    ///
    /// For each distance band, reports the observed and baseline fractions
    /// of points whose minimum great-circle distance to the reference set
    /// falls inside the band, their ratio (`None` when the baseline
    /// fraction is exactly zero), and the rank-test significance of the
    /// full distance distributions, Bonferroni-corrected across the bands
    /// evaluated in this call.
    ///
    /// An empty observed set produces no results. An empty reference set is
    /// `DataUnavailable`; a malformed region is `InvalidRegion`; a zero
    /// baseline sample size is `DegenerateBaseline`.
    pub fn compare_proximity(
        &self,
        observed: &[(f64, f64)],
        bands: &[f64],
        baseline: &dyn BaselineGenerator,
    ) -> Result<Vec<CorrelationResult>> {
        self.config.region.validate()?;
        if self.reference.is_empty() {
            return Err(EngineError::unavailable("reference point set is empty"));
        }
        if observed.is_empty() {
            debug!("no observed points; proximity comparison yields no results");
            return Ok(Vec::new());
        }
        if self.config.baseline_samples == 0 {
            return Err(EngineError::DegenerateBaseline(
                "baseline sample size is zero".to_string(),
            ));
        }

        let observed_d = self.min_distances(observed);
        let baseline_points = baseline.sample(self.config.baseline_samples, &self.config.region);
        let baseline_d = self.min_distances(&baseline_points);

        // one rank test over the full distributions supplies the family's raw p
        let raw_p = match mann_whitney_u(&observed_d, &baseline_d) {
            Some(test) => test.p_value,
            None => 1.0,
        };
        let corrected_p = bonferroni(raw_p, bands.len());
        let survives = corrected_p < self.config.alpha;

        let mut results = Vec::with_capacity(bands.len());
        for &band in bands {
            let observed_frac = fraction_within(&observed_d, band);
            let baseline_frac = fraction_within(&baseline_d, band);
            let ratio = if baseline_frac > 0.0 {
                Some(observed_frac / baseline_frac)
            } else {
                warn!(band_km = band, "baseline fraction is zero; ratio undefined");
                None
            };
            results.push(CorrelationResult {
                metric: format!("proximity_le_{}km", band.round() as i64),
                observed_statistic: observed_frac,
                baseline_statistic: baseline_frac,
                ratio,
                p_value: raw_p,
                correction_method: "bonferroni".to_string(),
                corrected_p,
                survives_correction: survives,
                observed_n: observed_d.len(),
                baseline_n: baseline_d.len(),
            });
        }
        Ok(results)
    }

    /// Spearman rank correlation between the grid value at each report
    /// location and the report's composite score.
    ///
    /// Needs a loaded grid (`DataUnavailable` otherwise) and at least three
    /// scored points with non-degenerate ranks (`DegenerateBaseline`
    /// otherwise). A family of one: the corrected p equals the raw p.
    pub async fn grid_correlation(&self, scored: &[ScoredPoint]) -> Result<CorrelationResult> {
        let grid = self.grid.acquire().await?;
        if scored.len() < 3 {
            return Err(EngineError::DegenerateBaseline(format!(
                "grid correlation needs at least 3 scored points, got {}",
                scored.len()
            )));
        }

        let grid_values: Vec<f64> =
            scored.iter().map(|p| grid.value_at(p.latitude, p.longitude)).collect();
        let scores: Vec<f64> = scored.iter().map(|p| p.score).collect();

        let test = spearman(&grid_values, &scores).ok_or_else(|| {
            EngineError::DegenerateBaseline("zero-variance ranks in grid correlation".to_string())
        })?;

        let corrected_p = bonferroni(test.p_value, 1);
        Ok(CorrelationResult {
            metric: "grid_score_spearman".to_string(),
            observed_statistic: test.rho,
            baseline_statistic: 0.0,
            ratio: None,
            p_value: test.p_value,
            correction_method: "bonferroni".to_string(),
            corrected_p,
            survives_correction: corrected_p < self.config.alpha,
            observed_n: test.n,
            baseline_n: 0,
        })
    }

    fn min_distances(&self, points: &[(f64, f64)]) -> Vec<f64> {
        points
            .iter()
            .filter_map(|&(lat, lon)| self.reference.min_distance_km(lat, lon))
            .collect()
    }

    // ------------------------------------------------------------------------
    // 4. Result cache
    // ------------------------------------------------------------------------

    /// Cached front of [`compare_proximity`](Self::compare_proximity):
    /// within the TTL, the previous results for the same band set are
    /// returned without recomputation.
    pub fn proximity_stats(
        &self,
        observed: &[(f64, f64)],
        bands: &[f64],
        baseline: &dyn BaselineGenerator,
    ) -> Result<Vec<CorrelationResult>> {
        let key = band_key(bands);
        if let Some(results) = self.cache_get(&key) {
            return Ok(results);
        }
        let results = self.compare_proximity(observed, bands, baseline)?;
        self.cache_put(key, results.clone());
        Ok(results)
    }

    /// Cached front of [`grid_correlation`](Self::grid_correlation).
    pub async fn grid_correlation_cached(&self, scored: &[ScoredPoint]) -> Result<CorrelationResult> {
        const KEY: &str = "grid_score_spearman";
        if let Some(results) = self.cache_get(KEY) {
            if let Some(result) = results.into_iter().next() {
                return Ok(result);
            }
        }
        let result = self.grid_correlation(scored).await?;
        self.cache_put(KEY.to_string(), vec![result.clone()]);
        Ok(result)
    }

    fn cache_get(&self, key: &str) -> Option<Vec<CorrelationResult>> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let cache = self.cache.lock();
        cache.get(key).filter(|entry| entry.at.elapsed() < ttl).map(|entry| entry.results.clone())
    }

    fn cache_put(&self, key: String, results: Vec<CorrelationResult>) {
        self.cache.lock().insert(key, CacheEntry { at: Instant::now(), results });
    }
}

fn fraction_within(distances: &[f64], band_km: f64) -> f64 {
    if distances.is_empty() {
        return 0.0;
    }
    distances.iter().filter(|&&d| d <= band_km).count() as f64 / distances.len() as f64
}

fn band_key(bands: &[f64]) -> String {
    let joined: Vec<String> = bands.iter().map(|b| format!("{b}")).collect();
    format!("proximity:{}", joined.join(","))
}
