//! # Reference Point Proximity
//!
//! A small fixed set of named reference points with great-circle distance
//! lookups. Loaded once at startup, read-only thereafter, shared without
//! locking. The set is a handful of entries, so queries are a linear scan.

use std::path::Path;

use serde::Deserialize;

use crate::config::ReferenceConfig;
use crate::coords::haversine_km;
use crate::error::{EngineError, Result};
use crate::types::ReferencePoint;

/// Static proximity index over the reference point set.
pub struct ProximityIndex {
    points: Vec<ReferencePoint>,
}

#[derive(Deserialize)]
struct ReferenceFile {
    #[serde(default)]
    points: Vec<ReferencePoint>,
}

impl ProximityIndex {
    /// Build from an explicit point list.
    pub fn new(points: Vec<ReferencePoint>) -> Self {
        Self { points }
    }

    /// Build from config: inline points plus an optional TOML file whose
    /// `points` array is appended after them.
    pub fn from_config(config: &ReferenceConfig) -> Result<Self> {
        let mut points = config.points.clone();
        if let Some(path) = &config.path {
            points.extend(Self::load_file(path)?);
        }
        Ok(Self::new(points))
    }

    fn load_file(path: &Path) -> Result<Vec<ReferencePoint>> {
        let content = std::fs::read_to_string(path)?;
        let file: ReferenceFile = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(file.points)
    }

    /// Number of reference points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All points
    pub fn points(&self) -> &[ReferencePoint] {
        &self.points
    }

    /// Nearest reference point and its distance in km.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<(&ReferencePoint, f64)> {
        self.points
            .iter()
            .map(|p| (p, haversine_km(lat, lon, p.latitude, p.longitude)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Distance to the nearest reference point, if any exist.
    pub fn min_distance_km(&self, lat: f64, lon: f64) -> Option<f64> {
        self.nearest(lat, lon).map(|(_, d)| d)
    }

    /// Reference points within `radius_km` (inclusive), with distances.
    pub fn within_km(&self, lat: f64, lon: f64, radius_km: f64) -> Vec<(&ReferencePoint, f64)> {
        self.points
            .iter()
            .map(|p| (p, haversine_km(lat, lon, p.latitude, p.longitude)))
            .filter(|(_, d)| *d <= radius_km)
            .collect()
    }
}
