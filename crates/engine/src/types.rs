//! # Core Entities
//!
//! Typed records flowing through the engine: inbound feed records, the
//! deduplicated entities built from them, score breakdowns, watch matches,
//! and aggregate correlation results.
//!
//! ## Table of Contents
//! 1. Shape — closed sighting-shape classification
//! 2. Inbound records
//! 3. Entities
//! 4. Scoring output
//! 5. Watch matches
//! 6. Correlation results
//! 7. Ingestion outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// 1. Shape — closed sighting-shape classification
// ============================================================================

/// Reported object shape, normalized to a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Orb,
    Sphere,
    Light,
    Fireball,
    Flash,
    Oval,
    Egg,
    Triangle,
    Cigar,
    Disc,
    Other,
}

/// Substring patterns checked in order; first hit wins. "fireball" and
/// "flash" precede "light" so composite phrasings resolve to the more
/// specific shape.
const SHAPE_PATTERNS: &[(&str, Shape)] = &[
    ("orb", Shape::Orb),
    ("sphere", Shape::Sphere),
    ("fireball", Shape::Fireball),
    ("flash", Shape::Flash),
    ("light", Shape::Light),
    ("oval", Shape::Oval),
    ("egg", Shape::Egg),
    ("triangle", Shape::Triangle),
    ("cigar", Shape::Cigar),
    ("disc", Shape::Disc),
    ("disk", Shape::Disc),
];

impl Shape {
    /// Tolerant mapping from free shape text; unrecognized text is `Other`.
    pub fn from_text(text: &str) -> Self {
        let t = text.trim().to_lowercase();
        if t.is_empty() {
            return Shape::Other;
        }
        for (pattern, shape) in SHAPE_PATTERNS {
            if t.contains(pattern) {
                return *shape;
            }
        }
        Shape::Other
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Shape::Orb => "orb",
            Shape::Sphere => "sphere",
            Shape::Light => "light",
            Shape::Fireball => "fireball",
            Shape::Flash => "flash",
            Shape::Oval => "oval",
            Shape::Egg => "egg",
            Shape::Triangle => "triangle",
            Shape::Cigar => "cigar",
            Shape::Disc => "disc",
            Shape::Other => "other",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// 2. Inbound records
// ============================================================================

/// Raw earthquake record handed over by the feed collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarthquakeRecord {
    /// Natural key assigned by the upstream feed
    pub external_id: String,
    /// Event magnitude
    pub magnitude: f64,
    /// Epicenter latitude (degrees)
    pub latitude: f64,
    /// Epicenter longitude (degrees)
    pub longitude: f64,
    /// Event time (UTC)
    pub occurred_at: DateTime<Utc>,
}

/// Raw sighting record handed over by the scraper collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SightingRecord {
    /// Natural key assigned by the upstream index
    pub external_id: String,
    /// Resolved latitude (degrees)
    pub latitude: f64,
    /// Resolved longitude (degrees)
    pub longitude: f64,
    /// When the sighting occurred (UTC)
    pub reported_at: DateTime<Utc>,
    /// Free shape text, mapped to [`Shape`] on ingestion
    pub shape_text: String,
    /// Narrative description
    pub free_text: String,
}

// ============================================================================
// 3. Entities
// ============================================================================

/// Deduplicated earthquake event. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarthquakeEvent {
    /// Internal id
    pub id: Uuid,
    /// Upstream natural key (unique)
    pub external_id: String,
    /// Event magnitude
    pub magnitude: f64,
    /// Epicenter latitude (degrees)
    pub latitude: f64,
    /// Epicenter longitude (degrees)
    pub longitude: f64,
    /// Event time (UTC)
    pub occurred_at: DateTime<Utc>,
}

/// Deduplicated sighting report. `score` and `matched_watch_ids` are the
/// only fields mutated after creation, always under the per-entity lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SightingReport {
    /// Internal id
    pub id: Uuid,
    /// Upstream natural key (unique)
    pub external_id: String,
    /// Resolved latitude (degrees)
    pub latitude: f64,
    /// Resolved longitude (degrees)
    pub longitude: f64,
    /// When the sighting occurred (UTC)
    pub reported_at: DateTime<Utc>,
    /// Normalized shape
    pub shape: Shape,
    /// Narrative description
    pub free_text: String,
    /// Composite score, attached by the scoring engine
    pub score: Option<ScoreBreakdown>,
    /// Watch zones this report has matched
    pub matched_watch_ids: Vec<Uuid>,
}

/// Static named reference point (e.g. an installation), loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencePoint {
    /// Display name
    pub name: String,
    /// Latitude (degrees)
    pub latitude: f64,
    /// Longitude (degrees)
    pub longitude: f64,
    /// Free-form category label
    pub category: String,
}

// ============================================================================
// 4. Scoring output
// ============================================================================

/// Per-dimension score breakdown. Retained alongside the total for
/// auditability; the total is the capped sum of the sub-scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Geomagnetic-band sub-score
    pub magnetic: f64,
    /// Shape-category sub-score
    pub shape: f64,
    /// Keyword-derived physical-effects sub-score
    pub physical_effects: f64,
    /// Seismic-proximity sub-score (0 in the reduced profile)
    pub seismic: f64,
    /// Capped total
    pub total: f64,
    /// Name of the profile that produced this breakdown
    pub profile: String,
}

// ============================================================================
// 5. Watch matches
// ============================================================================

/// A report falling inside a watch zone's radius and time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchMatch {
    /// Matched zone
    pub zone_id: Uuid,
    /// Matched report (internal id)
    pub report_id: Uuid,
    /// Matched report (upstream key)
    pub report_external_id: String,
    /// Great-circle distance from the zone center (km)
    pub distance_km: f64,
    /// Hours between the zone opening and the report
    pub time_offset_hours: f64,
}

// ============================================================================
// 6. Correlation results
// ============================================================================

/// One aggregate statistical comparison. Transient: computed on demand and
/// cached only for a bounded TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// Metric label (e.g. `proximity_le_50km`)
    pub metric: String,
    /// Observed statistic (band fraction, or rho for rank correlation)
    pub observed_statistic: f64,
    /// Baseline statistic for the same metric
    pub baseline_statistic: f64,
    /// Observed / baseline ratio; `None` when the baseline fraction is
    /// exactly zero (undefined, never inf or NaN)
    pub ratio: Option<f64>,
    /// Raw two-sided p-value
    pub p_value: f64,
    /// Family-wise correction applied
    pub correction_method: String,
    /// Corrected p-value (always >= `p_value`)
    pub corrected_p: f64,
    /// Whether the corrected p clears the configured alpha
    pub survives_correction: bool,
    /// Observed sample size
    pub observed_n: usize,
    /// Baseline sample size
    pub baseline_n: usize,
}

// ============================================================================
// 7. Ingestion outcomes
// ============================================================================

/// Per-record ingestion outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new entity was created
    Created,
    /// The external id was already known; silent no-op
    Duplicate,
    /// The record failed validation and was dropped
    Rejected,
}

/// Tally for a batch intake call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Newly created entities
    pub created: usize,
    /// Records already known by external id
    pub duplicates: usize,
    /// Records rejected at validation
    pub rejected: usize,
}

impl BatchSummary {
    /// Fold one outcome into the tally.
    pub fn record(&mut self, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Created => self.created += 1,
            IngestOutcome::Duplicate => self.duplicates += 1,
            IngestOutcome::Rejected => self.rejected += 1,
        }
    }
}
