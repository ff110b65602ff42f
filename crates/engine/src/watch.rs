//! # Watch Zone Lifecycle
//!
//! Time-boxed circular zones anchored to qualifying earthquake events, and
//! the matching of incoming reports against them. A zone's state is derived
//! lazily from the query time — ACTIVE strictly before `expires_at`,
//! EXPIRED from that instant on, never reversed. Match lists are
//! append-only and survive expiry as the historical record.
//!
//! Boundary contract (tested): the radius is inclusive
//! (`distance <= radius_km` matches) and the expiry instant is exclusive
//! (`reported_at < expires_at` is required; at `expires_at` the zone is
//! already EXPIRED).
//!
//! ## Table of Contents
//! 1. WatchZone + WatchState
//! 2. WatchManager — open / match / query / sweep

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::WatchConfig;
use crate::coords::haversine_km;
use crate::types::{EarthquakeEvent, SightingReport, WatchMatch};

// ============================================================================
// 1. WatchZone + WatchState
// ============================================================================

/// Derived zone state. EXPIRED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// The zone accepts matches
    Active,
    /// The window has elapsed; the match history remains queryable
    Expired,
}

/// One time-boxed spatial zone anchored to an earthquake event.
pub struct WatchZone {
    /// Zone id
    pub id: Uuid,
    /// External id of the anchoring event
    pub origin_event_id: String,
    /// Zone center latitude (epicenter)
    pub center_lat: f64,
    /// Zone center longitude (epicenter)
    pub center_lon: f64,
    /// Zone radius (km), shared configuration
    pub radius_km: f64,
    /// Window start (the event time)
    pub opens_at: DateTime<Utc>,
    /// Window end
    pub expires_at: DateTime<Utc>,
    /// Append-only match records
    matches: RwLock<Vec<WatchMatch>>,
}

impl WatchZone {
    /// State at a query instant, recomputed from time alone.
    pub fn state_at(&self, now: DateTime<Utc>) -> WatchState {
        if now < self.expires_at {
            WatchState::Active
        } else {
            WatchState::Expired
        }
    }

    /// Snapshot of the recorded matches.
    pub fn matches(&self) -> Vec<WatchMatch> {
        self.matches.read().clone()
    }

    /// Number of recorded matches.
    pub fn match_count(&self) -> usize {
        self.matches.read().len()
    }
}

// ============================================================================
// 2. WatchManager — open / match / query / sweep
// ============================================================================

/// Owns all zones and their lifecycle. Zones live in a concurrent map;
/// match appends are serialized per-zone by the zone's own lock, so
/// unrelated zones never contend.
pub struct WatchManager {
    config: WatchConfig,
    zones: DashMap<Uuid, Arc<WatchZone>>,
    by_event: DashMap<String, Uuid>,
}

impl WatchManager {
    /// Create a manager with the shared zone parameters.
    pub fn new(config: WatchConfig) -> Self {
        Self { config, zones: DashMap::new(), by_event: DashMap::new() }
    }

    /// The shared zone parameters
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Open a zone for a newly-ingested event, if it qualifies.
    ///
    /// Returns `None` for sub-threshold magnitudes and for events whose
    /// window has already fully elapsed at ingestion time. Calling again
    /// for the same event returns the existing zone.
    pub fn open_for(&self, event: &EarthquakeEvent, now: DateTime<Utc>) -> Option<Arc<WatchZone>> {
        if event.magnitude < self.config.min_magnitude {
            return None;
        }

        let duration = Duration::seconds((self.config.duration_hours * 3600.0) as i64);
        let expires_at = event.occurred_at + duration;
        if expires_at <= now {
            debug!(event = %event.external_id, "event window already elapsed; no zone opened");
            return None;
        }

        use dashmap::mapref::entry::Entry;
        match self.by_event.entry(event.external_id.clone()) {
            Entry::Occupied(existing) => self.zones.get(existing.get()).map(|z| z.clone()),
            Entry::Vacant(slot) => {
                let zone = Arc::new(WatchZone {
                    id: Uuid::new_v4(),
                    origin_event_id: event.external_id.clone(),
                    center_lat: event.latitude,
                    center_lon: event.longitude,
                    radius_km: self.config.radius_km,
                    opens_at: event.occurred_at,
                    expires_at,
                    matches: RwLock::new(Vec::new()),
                });
                info!(
                    zone = %zone.id,
                    event = %event.external_id,
                    magnitude = event.magnitude,
                    radius_km = zone.radius_km,
                    expires_at = %zone.expires_at,
                    "watch zone opened"
                );
                self.zones.insert(zone.id, zone.clone());
                slot.insert(zone.id);
                Some(zone)
            }
        }
    }

    /// Match a report against every zone that is ACTIVE at `now`, within
    /// radius (inclusive), and whose window contains `reported_at`
    /// (expiry-exclusive). Returns the report's matches across all zones;
    /// re-matching an already-matched report+zone pair records nothing new.
    pub fn match_report(&self, report: &SightingReport, now: DateTime<Utc>) -> Vec<WatchMatch> {
        let mut results = Vec::new();

        for entry in self.zones.iter() {
            let zone = entry.value();
            if zone.state_at(now) != WatchState::Active {
                continue;
            }
            let distance =
                haversine_km(report.latitude, report.longitude, zone.center_lat, zone.center_lon);
            if distance > zone.radius_km {
                continue;
            }
            if report.reported_at < zone.opens_at || report.reported_at >= zone.expires_at {
                continue;
            }

            let mut matches = zone.matches.write();
            if let Some(existing) = matches.iter().find(|m| m.report_id == report.id) {
                results.push(existing.clone());
                continue;
            }
            let offset_hours =
                (report.reported_at - zone.opens_at).num_seconds() as f64 / 3600.0;
            let record = WatchMatch {
                zone_id: zone.id,
                report_id: report.id,
                report_external_id: report.external_id.clone(),
                distance_km: distance,
                time_offset_hours: offset_hours,
            };
            debug!(
                zone = %zone.id,
                report = %report.external_id,
                distance_km = distance,
                offset_hours,
                "report matched watch zone"
            );
            matches.push(record.clone());
            results.push(record);
        }

        results
    }

    /// Zones ACTIVE at the query instant.
    pub fn open_watches(&self, now: DateTime<Utc>) -> Vec<Arc<WatchZone>> {
        self.zones
            .iter()
            .filter(|entry| entry.value().state_at(now) == WatchState::Active)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Look up a zone by id (any state).
    pub fn watch(&self, id: Uuid) -> Option<Arc<WatchZone>> {
        self.zones.get(&id).map(|z| z.clone())
    }

    /// All recorded matches for a report, across zones of any state.
    pub fn matches_for_report(&self, report_id: Uuid) -> Vec<WatchMatch> {
        self.zones
            .iter()
            .flat_map(|entry| {
                entry.value().matches.read().iter().filter(|m| m.report_id == report_id).cloned().collect::<Vec<_>>()
            })
            .collect()
    }

    /// Number of zones currently held (any state).
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Housekeeping: drop zones expired longer than the retention window.
    /// Correctness never depends on this running.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let retention = Duration::seconds((self.config.retention_hours * 3600.0) as i64);
        let before = self.zones.len();
        self.zones.retain(|_, zone| now < zone.expires_at + retention);
        self.by_event.retain(|_, zone_id| self.zones.contains_key(zone_id));
        let removed = before - self.zones.len();
        if removed > 0 {
            info!(removed, remaining = self.zones.len(), "swept expired watch zones");
        }
        removed
    }
}
