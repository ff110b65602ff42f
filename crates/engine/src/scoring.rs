//! # Composite Scoring
//!
//! Turns one sighting report into a per-dimension [`ScoreBreakdown`]. Each
//! dimension is an independently configurable table inside a
//! [`ScoringProfile`]; the two shipped profiles are `full` (all four
//! dimensions, cap 100) and `reduced` (no seismic proximity, cap 75).
//!
//! Scoring never fails: a dimension that cannot be evaluated (grid source
//! down, unclassified shape, no context events) contributes zero.
//!
//! ## Table of Contents
//! 1. Dimension weight tables
//! 2. ScoringProfile — enabled dimensions + caps
//! 3. ScoringEngine

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::{MagneticBand, ScoringConfig, WatchConfig};
use crate::coords::haversine_km;
use crate::grid::GridGate;
use crate::types::{EarthquakeEvent, ScoreBreakdown, Shape, SightingReport};

// ============================================================================
// 1. Dimension weight tables
// ============================================================================

/// Banded scoring on the absolute grid value: lower anomaly, higher score.
#[derive(Debug, Clone)]
pub struct MagneticWeights {
    /// Bands ascending by threshold; |value| past the last band scores 0
    pub bands: Vec<MagneticBand>,
}

impl MagneticWeights {
    /// Score a grid value against the band table.
    pub fn score(&self, value_nt: f64) -> f64 {
        let magnitude = value_nt.abs();
        for band in &self.bands {
            if magnitude < band.below_nt {
                return band.points;
            }
        }
        0.0
    }
}

/// Categorical shape table. Shapes missing from the table score 0.
#[derive(Debug, Clone)]
pub struct ShapeWeights {
    /// Points per shape
    pub table: HashMap<Shape, f64>,
}

impl Default for ShapeWeights {
    fn default() -> Self {
        let table = [
            (Shape::Orb, 20.0),
            (Shape::Sphere, 20.0),
            (Shape::Fireball, 18.0),
            (Shape::Light, 16.0),
            (Shape::Flash, 16.0),
            (Shape::Oval, 14.0),
            (Shape::Egg, 14.0),
            (Shape::Disc, 12.0),
        ]
        .into_iter()
        .collect();
        Self { table }
    }
}

impl ShapeWeights {
    /// Score a shape; unlisted shapes (including `Other`) score 0.
    pub fn score(&self, shape: Shape) -> f64 {
        self.table.get(&shape).copied().unwrap_or(0.0)
    }
}

/// Keyword matching against the free text: each distinct vocabulary hit
/// adds `per_hit`, capped at `max`.
#[derive(Debug, Clone)]
pub struct PhysicalWeights {
    /// Lowercased vocabulary
    pub keywords: Vec<String>,
    /// Points per distinct hit
    pub per_hit: f64,
    /// Dimension cap
    pub max: f64,
}

impl PhysicalWeights {
    /// Score free text by distinct keyword hits.
    pub fn score(&self, free_text: &str) -> f64 {
        if free_text.is_empty() {
            return 0.0;
        }
        let text = free_text.to_lowercase();
        let hits = self.keywords.iter().filter(|k| text.contains(k.as_str())).count();
        (hits as f64 * self.per_hit).min(self.max)
    }
}

/// Decay on distance and time offset to the nearest qualifying event:
/// maximal at zero distance/offset, zero beyond the radius or window.
#[derive(Debug, Clone)]
pub struct SeismicWeights {
    /// Dimension cap, awarded at zero distance/offset for a strong event
    pub max_points: f64,
    /// Distance cutoff (km)
    pub radius_km: f64,
    /// Time-offset cutoff (hours)
    pub window_hours: f64,
    /// Events below this magnitude do not count
    pub min_magnitude: f64,
    /// Magnitude at or above which the magnitude factor saturates at 1
    pub saturating_magnitude: f64,
}

impl SeismicWeights {
    /// Best decayed score over the qualifying context events.
    pub fn score(&self, report: &SightingReport, events: &[Arc<EarthquakeEvent>]) -> f64 {
        let mut best: f64 = 0.0;
        for event in events {
            if event.magnitude < self.min_magnitude {
                continue;
            }
            let distance =
                haversine_km(report.latitude, report.longitude, event.latitude, event.longitude);
            let offset_hours =
                (report.reported_at - event.occurred_at).num_seconds().abs() as f64 / 3600.0;
            if distance > self.radius_km || offset_hours > self.window_hours {
                continue;
            }
            let dist_factor = 1.0 - distance / self.radius_km;
            let time_factor = 1.0 - offset_hours / self.window_hours;
            let mag_factor = (event.magnitude / self.saturating_magnitude).clamp(0.0, 1.0);
            best = best.max(self.max_points * dist_factor * time_factor * mag_factor);
        }
        best
    }
}

// ============================================================================
// 2. ScoringProfile — enabled dimensions + caps
// ============================================================================

/// A scoring profile: one optional weight table per dimension plus the
/// total cap. Disabling a dimension is expressed by leaving its table out,
/// so the profile itself documents what was excluded.
#[derive(Debug, Clone)]
pub struct ScoringProfile {
    /// Profile name, recorded on every breakdown
    pub name: String,
    /// Magnetic band table
    pub magnetic: Option<MagneticWeights>,
    /// Shape table
    pub shape: Option<ShapeWeights>,
    /// Keyword table
    pub physical: Option<PhysicalWeights>,
    /// Seismic decay table
    pub seismic: Option<SeismicWeights>,
    /// Cap on the summed total
    pub cap: f64,
}

impl ScoringProfile {
    /// Full profile: all four dimensions, cap 100.
    pub fn full() -> Self {
        Self::from_config(
            &ScoringConfig { profile: "full".to_string(), ..ScoringConfig::default() },
            &WatchConfig::default(),
        )
    }

    /// Reduced profile: no seismic dimension, cap 75.
    pub fn reduced() -> Self {
        Self::from_config(
            &ScoringConfig { profile: "reduced".to_string(), ..ScoringConfig::default() },
            &WatchConfig::default(),
        )
    }

    /// Build the profile named by the config from its tables. The seismic
    /// cutoffs reuse the watch radius and duration, so scoring and watch
    /// matching agree on what "near a recent event" means. Any profile name
    /// other than `reduced` selects the full profile.
    pub fn from_config(config: &ScoringConfig, watch: &WatchConfig) -> Self {
        let physical = PhysicalWeights {
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
            per_hit: config.keyword_points,
            max: config.physical_max,
        };
        let magnetic = MagneticWeights { bands: config.magnetic_bands.clone() };

        if config.profile == "reduced" {
            Self {
                name: "reduced".to_string(),
                magnetic: Some(magnetic),
                shape: Some(ShapeWeights::default()),
                physical: Some(physical),
                seismic: None,
                cap: config.reduced_cap,
            }
        } else {
            Self {
                name: "full".to_string(),
                magnetic: Some(magnetic),
                shape: Some(ShapeWeights::default()),
                physical: Some(physical),
                seismic: Some(SeismicWeights {
                    max_points: config.seismic_max,
                    radius_km: watch.radius_km,
                    window_hours: watch.duration_hours,
                    min_magnitude: watch.min_magnitude,
                    saturating_magnitude: 5.0,
                }),
                cap: config.full_cap,
            }
        }
    }
}

// ============================================================================
// 3. ScoringEngine
// ============================================================================

/// Scores reports against one profile. Stateless apart from the shared
/// grid gate, whose lookups are deterministic once loaded.
pub struct ScoringEngine {
    grid: Arc<GridGate>,
    profile: ScoringProfile,
}

impl ScoringEngine {
    /// Create an engine over a grid gate and profile.
    pub fn new(grid: Arc<GridGate>, profile: ScoringProfile) -> Self {
        Self { grid, profile }
    }

    /// The active profile
    pub fn profile(&self) -> &ScoringProfile {
        &self.profile
    }

    /// Score one report. `context` carries the event view for the seismic
    /// dimension; pass an empty slice when none is available. Never fails:
    /// an unavailable grid zeroes the magnetic dimension.
    pub async fn score(
        &self,
        report: &SightingReport,
        context: &[Arc<EarthquakeEvent>],
    ) -> ScoreBreakdown {
        let magnetic = match &self.profile.magnetic {
            Some(weights) => match self.grid.acquire().await {
                Ok(grid) => weights.score(grid.value_at(report.latitude, report.longitude)),
                Err(_) => 0.0,
            },
            None => 0.0,
        };
        let shape = self.profile.shape.as_ref().map_or(0.0, |w| w.score(report.shape));
        let physical_effects =
            self.profile.physical.as_ref().map_or(0.0, |w| w.score(&report.free_text));
        let seismic = self.profile.seismic.as_ref().map_or(0.0, |w| w.score(report, context));

        let total = (magnetic + shape + physical_effects + seismic).min(self.profile.cap);
        debug!(
            report = %report.external_id,
            magnetic,
            shape,
            physical_effects,
            seismic,
            total,
            "scored report"
        );

        ScoreBreakdown {
            magnetic,
            shape,
            physical_effects,
            seismic,
            total,
            profile: self.profile.name.clone(),
        }
    }
}
