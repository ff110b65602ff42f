//! # Engine Configuration
//!
//! Parses `engine.toml` — the declarative config for the correlation engine.
//! Every knob carries a compiled-in default, so `EngineConfig::default()` is
//! fully usable without a file.
//!
//! ## Table of Contents
//! 1. EngineConfig — Top-level config
//! 2. GridConfig — Geomagnetic grid source
//! 3. WatchConfig — Watch zone parameters
//! 4. ScoringConfig — Score dimension tables
//! 5. AnalysisConfig — Correlation analysis parameters
//! 6. ReferenceConfig — Static reference points
//! 7. Parsing

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coords::BoundingRegion;
use crate::error::{EngineError, Result};
use crate::types::ReferencePoint;

// ============================================================================
// 1. EngineConfig — Top-level config
// ============================================================================

/// Top-level engine configuration, parsed from `engine.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Geomagnetic grid source
    #[serde(default)]
    pub grid: GridConfig,
    /// Watch zone parameters
    #[serde(default)]
    pub watch: WatchConfig,
    /// Scoring dimension tables
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Correlation analysis parameters
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Static reference points
    #[serde(default)]
    pub reference: ReferenceConfig,
}

// ============================================================================
// 2. GridConfig — Geomagnetic grid source
// ============================================================================

/// Where the anomaly grid comes from and how patiently to load it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Local XYZ file (takes precedence over `url`)
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Remote XYZ source (requires the `http-source` feature)
    #[serde(default)]
    pub url: Option<String>,
    /// Abort the load after this many seconds
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
    /// After a failed load, serve the cached failure for this long before
    /// allowing another fetch attempt
    #[serde(default = "default_failure_retry_secs")]
    pub failure_retry_secs: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            path: None,
            url: None,
            load_timeout_secs: default_load_timeout_secs(),
            failure_retry_secs: default_failure_retry_secs(),
        }
    }
}

fn default_load_timeout_secs() -> u64 { 300 }
fn default_failure_retry_secs() -> u64 { 900 }

// ============================================================================
// 3. WatchConfig — Watch zone parameters
// ============================================================================

/// Shared parameters for all watch zones. No per-event customization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Minimum magnitude that opens a zone (inclusive)
    #[serde(default = "default_min_magnitude")]
    pub min_magnitude: f64,
    /// Zone radius in kilometers
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
    /// Zone lifetime in hours
    #[serde(default = "default_duration_hours")]
    pub duration_hours: f64,
    /// Keep expired zones queryable for this many hours before the
    /// housekeeping sweep drops them
    #[serde(default = "default_retention_hours")]
    pub retention_hours: f64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            min_magnitude: default_min_magnitude(),
            radius_km: default_radius_km(),
            duration_hours: default_duration_hours(),
            retention_hours: default_retention_hours(),
        }
    }
}

fn default_min_magnitude() -> f64 { 3.0 }
fn default_radius_km() -> f64 { 150.0 }
fn default_duration_hours() -> f64 { 72.0 }
fn default_retention_hours() -> f64 { 336.0 }

// ============================================================================
// 4. ScoringConfig — Score dimension tables
// ============================================================================

/// One magnetic band: values with absolute magnitude below `below_nt`
/// score `points`. Bands are evaluated in ascending `below_nt` order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MagneticBand {
    /// Exclusive upper bound on |value| in nanotesla
    pub below_nt: f64,
    /// Points awarded inside the band
    pub points: f64,
}

/// Tunable tables for the scoring dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Active profile: `full` (all dimensions, cap 100) or `reduced`
    /// (no seismic dimension, cap 75)
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Magnetic band table, ascending by threshold
    #[serde(default = "default_magnetic_bands")]
    pub magnetic_bands: Vec<MagneticBand>,
    /// Physical-effects keyword vocabulary
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Points per distinct keyword hit
    #[serde(default = "default_keyword_points")]
    pub keyword_points: f64,
    /// Cap on the physical-effects dimension
    #[serde(default = "default_physical_max")]
    pub physical_max: f64,
    /// Cap on the seismic-proximity dimension
    #[serde(default = "default_seismic_max")]
    pub seismic_max: f64,
    /// Total cap for the full profile
    #[serde(default = "default_full_cap")]
    pub full_cap: f64,
    /// Total cap for the reduced profile
    #[serde(default = "default_reduced_cap")]
    pub reduced_cap: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            magnetic_bands: default_magnetic_bands(),
            keywords: default_keywords(),
            keyword_points: default_keyword_points(),
            physical_max: default_physical_max(),
            seismic_max: default_seismic_max(),
            full_cap: default_full_cap(),
            reduced_cap: default_reduced_cap(),
        }
    }
}

fn default_profile() -> String { "full".to_string() }

fn default_magnetic_bands() -> Vec<MagneticBand> {
    vec![
        MagneticBand { below_nt: 50.0, points: 30.0 },
        MagneticBand { below_nt: 100.0, points: 20.0 },
        MagneticBand { below_nt: 200.0, points: 10.0 },
    ]
}

fn default_keywords() -> Vec<String> {
    [
        "earthquake", "tremor", "shaking", "rumbling",
        "static", "electrical", "tingling", "hair standing",
        "compass", "magnetic", "interference", "radio",
        "car stopped", "engine died", "lights flickered",
        "ground shook", "seismic",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_keyword_points() -> f64 { 5.0 }
fn default_physical_max() -> f64 { 25.0 }
fn default_seismic_max() -> f64 { 25.0 }
fn default_full_cap() -> f64 { 100.0 }
fn default_reduced_cap() -> f64 { 75.0 }

// ============================================================================
// 5. AnalysisConfig — Correlation analysis parameters
// ============================================================================

/// Parameters for observed-vs-baseline comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Family-wise significance level
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Baseline sample size per invocation
    #[serde(default = "default_baseline_samples")]
    pub baseline_samples: usize,
    /// Distance bands in kilometers, ascending
    #[serde(default = "default_distance_bands")]
    pub distance_bands_km: Vec<f64>,
    /// How long computed results stay cached
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Fixed seed for the baseline generator; unset draws fresh entropy
    #[serde(default)]
    pub baseline_seed: Option<u64>,
    /// Region the baseline is drawn from
    #[serde(default)]
    pub region: BoundingRegion,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            baseline_samples: default_baseline_samples(),
            distance_bands_km: default_distance_bands(),
            cache_ttl_secs: default_cache_ttl_secs(),
            baseline_seed: None,
            region: BoundingRegion::default(),
        }
    }
}

fn default_alpha() -> f64 { 0.05 }
fn default_baseline_samples() -> usize { 4000 }
fn default_distance_bands() -> Vec<f64> { vec![50.0, 100.0, 150.0] }
fn default_cache_ttl_secs() -> u64 { 300 }

// ============================================================================
// 6. ReferenceConfig — Static reference points
// ============================================================================

/// Where the reference point set comes from: an external TOML file, inline
/// entries, or both (file entries are appended after inline ones).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// External TOML file with a `points` array
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Inline reference points
    #[serde(default)]
    pub points: Vec<ReferencePoint>,
}

// ============================================================================
// 7. Parsing
// ============================================================================

impl EngineConfig {
    /// Load an EngineConfig from a TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }
}
