//! # Geographic Math
//!
//! Great-circle distances and the unit-sphere mapping used by the grid
//! index. All public distances are kilometers on a spherical Earth.
//!
//! ## Table of Contents
//! 1. Constants
//! 2. Great-circle distance
//! 3. Unit-sphere mapping
//! 4. BoundingRegion — analysis extent

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

// ============================================================================
// 1. Constants
// ============================================================================

/// Earth radius in kilometers (mean spherical)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// ============================================================================
// 2. Great-circle distance
// ============================================================================

/// Haversine distance in kilometers between two WGS84 points.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

// ============================================================================
// 3. Unit-sphere mapping
// ============================================================================

/// Map lat/lon degrees onto a point on the unit sphere.
///
/// Euclidean (chord) distance between two such points is strictly monotone
/// in their great-circle distance, so nearest-neighbor in chord space is
/// nearest-neighbor in great-circle space.
pub fn to_unit_sphere(lat_deg: f64, lon_deg: f64) -> [f64; 3] {
    let (lat, lon) = (lat_deg.to_radians(), lon_deg.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// Convert a unit-sphere chord length back to arc kilometers.
pub fn chord_to_arc_km(chord: f64) -> f64 {
    2.0 * EARTH_RADIUS_KM * (chord / 2.0).clamp(-1.0, 1.0).asin()
}

// ============================================================================
// 4. BoundingRegion — analysis extent
// ============================================================================

/// Rectangular lat/lon extent used for baseline sampling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingRegion {
    /// Southern edge (degrees)
    pub lat_min: f64,
    /// Northern edge (degrees)
    pub lat_max: f64,
    /// Western edge (degrees)
    pub lon_min: f64,
    /// Eastern edge (degrees)
    pub lon_max: f64,
}

impl BoundingRegion {
    /// Construct a region without validating it; call [`validate`](Self::validate)
    /// before sampling from it.
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self { lat_min, lat_max, lon_min, lon_max }
    }

    /// Reject degenerate regions: inverted or zero-area boxes, or edges
    /// outside valid coordinates.
    pub fn validate(&self) -> Result<()> {
        let in_lat = (-90.0..=90.0).contains(&self.lat_min) && (-90.0..=90.0).contains(&self.lat_max);
        let in_lon =
            (-180.0..=180.0).contains(&self.lon_min) && (-180.0..=180.0).contains(&self.lon_max);
        if !in_lat || !in_lon {
            return Err(EngineError::InvalidRegion(format!(
                "edges out of range: lat [{}, {}], lon [{}, {}]",
                self.lat_min, self.lat_max, self.lon_min, self.lon_max
            )));
        }
        if self.lat_min >= self.lat_max || self.lon_min >= self.lon_max {
            return Err(EngineError::InvalidRegion(format!(
                "zero-area region: lat [{}, {}], lon [{}, {}]",
                self.lat_min, self.lat_max, self.lon_min, self.lon_max
            )));
        }
        Ok(())
    }

    /// Whether a point falls inside the region (edges inclusive).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&lat) && (self.lon_min..=self.lon_max).contains(&lon)
    }
}

impl Default for BoundingRegion {
    /// Continental US extent
    fn default() -> Self {
        Self { lat_min: 24.0, lat_max: 50.0, lon_min: -125.0, lon_max: -66.0 }
    }
}
