//! # Ingestion Coordinator
//!
//! The external-facing intake: accepts validated earthquake and sighting
//! records from the feed collaborators, deduplicates by natural key, and
//! fans them into the watch manager and the scoring engine. Also the
//! outbound query surface for the serving layer.
//!
//! Two independent producers call intake concurrently; entities live in
//! concurrent maps keyed by external id, and the only post-creation
//! mutation (a report's score and match list) happens under that report's
//! own lock.
//!
//! ## Table of Contents
//! 1. IngestionCoordinator — construction
//! 2. Intake — validate / dedup / fan-out
//! 3. Outbound query surface

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{CorrelationAnalyzer, ScoredPoint, UniformBaseline};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::grid::GridGate;
use crate::proximity::ProximityIndex;
use crate::scoring::{ScoringEngine, ScoringProfile};
use crate::types::{
    BatchSummary, CorrelationResult, EarthquakeEvent, EarthquakeRecord, IngestOutcome,
    ScoreBreakdown, Shape, SightingRecord, SightingReport, WatchMatch,
};
use crate::watch::{WatchManager, WatchZone};

// ============================================================================
// 1. IngestionCoordinator — construction
// ============================================================================

/// Owns the entity collections and the fan-out to scoring and watching.
pub struct IngestionCoordinator {
    events: DashMap<String, Arc<EarthquakeEvent>>,
    reports: DashMap<String, Arc<RwLock<SightingReport>>>,
    watches: Arc<WatchManager>,
    scorer: Arc<ScoringEngine>,
    analyzer: Arc<CorrelationAnalyzer>,
    config: EngineConfig,
}

impl IngestionCoordinator {
    /// Wire the coordinator from config and the shared static layers.
    pub fn new(
        config: EngineConfig,
        grid: Arc<GridGate>,
        reference: Arc<ProximityIndex>,
    ) -> Self {
        let profile = ScoringProfile::from_config(&config.scoring, &config.watch);
        let watches = Arc::new(WatchManager::new(config.watch.clone()));
        let scorer = Arc::new(ScoringEngine::new(grid.clone(), profile));
        let analyzer =
            Arc::new(CorrelationAnalyzer::new(reference, grid, config.analysis.clone()));
        Self {
            events: DashMap::new(),
            reports: DashMap::new(),
            watches,
            scorer,
            analyzer,
            config,
        }
    }

    /// The watch manager (shared with housekeeping tasks)
    pub fn watches(&self) -> &Arc<WatchManager> {
        &self.watches
    }

    // ------------------------------------------------------------------------
    // 2. Intake — validate / dedup / fan-out
    // ------------------------------------------------------------------------

    /// Ingest one earthquake record. Malformed records are rejected with a
    /// logged warning; an already-known external id is a silent no-op. A
    /// first-seen qualifying event opens a watch zone.
    pub fn ingest_earthquake(&self, record: EarthquakeRecord, now: DateTime<Utc>) -> IngestOutcome {
        if let Err(e) = validate_earthquake(&record) {
            warn!(external_id = %record.external_id, error = %e, "rejected earthquake record");
            return IngestOutcome::Rejected;
        }

        let event = Arc::new(EarthquakeEvent {
            id: Uuid::new_v4(),
            external_id: record.external_id.clone(),
            magnitude: record.magnitude,
            latitude: record.latitude,
            longitude: record.longitude,
            occurred_at: record.occurred_at,
        });

        use dashmap::mapref::entry::Entry;
        let created = match self.events.entry(record.external_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(event.clone());
                true
            }
        };
        if !created {
            return IngestOutcome::Duplicate;
        }

        self.watches.open_for(&event, now);
        info!(
            external_id = %event.external_id,
            magnitude = event.magnitude,
            "earthquake ingested"
        );
        IngestOutcome::Created
    }

    /// Ingest one sighting record: validate, dedup, then score and match.
    /// The score and matched zone ids land on the stored report under its
    /// per-entity lock.
    pub async fn ingest_report(&self, record: SightingRecord, now: DateTime<Utc>) -> IngestOutcome {
        if let Err(e) = validate_sighting(&record) {
            warn!(external_id = %record.external_id, error = %e, "rejected sighting record");
            return IngestOutcome::Rejected;
        }

        let report = SightingReport {
            id: Uuid::new_v4(),
            external_id: record.external_id.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            reported_at: record.reported_at,
            shape: Shape::from_text(&record.shape_text),
            free_text: record.free_text,
            score: None,
            matched_watch_ids: Vec::new(),
        };
        let stored = Arc::new(RwLock::new(report));

        use dashmap::mapref::entry::Entry;
        let created = match self.reports.entry(record.external_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(stored.clone());
                true
            }
        };
        if !created {
            return IngestOutcome::Duplicate;
        }

        // score and match against a snapshot; write back under the lock
        let snapshot = stored.read().clone();
        let context: Vec<Arc<EarthquakeEvent>> =
            self.events.iter().map(|entry| entry.value().clone()).collect();
        let breakdown = self.scorer.score(&snapshot, &context).await;
        let matches = self.watches.match_report(&snapshot, now);

        {
            let mut report = stored.write();
            report.matched_watch_ids = matches.iter().map(|m| m.zone_id).collect();
            report.score = Some(breakdown);
        }
        info!(
            external_id = %snapshot.external_id,
            matches = matches.len(),
            "sighting ingested"
        );
        IngestOutcome::Created
    }

    /// Batch earthquake intake; one bad record never aborts the batch.
    pub fn ingest_earthquakes(
        &self,
        records: Vec<EarthquakeRecord>,
        now: DateTime<Utc>,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for record in records {
            summary.record(self.ingest_earthquake(record, now));
        }
        info!(
            created = summary.created,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            "earthquake batch complete"
        );
        summary
    }

    /// Batch sighting intake; one bad record never aborts the batch.
    pub async fn ingest_reports(
        &self,
        records: Vec<SightingRecord>,
        now: DateTime<Utc>,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for record in records {
            summary.record(self.ingest_report(record, now).await);
        }
        info!(
            created = summary.created,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            "sighting batch complete"
        );
        summary
    }

    // ------------------------------------------------------------------------
    // 3. Outbound query surface
    // ------------------------------------------------------------------------

    /// Stored event count
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Stored report count
    pub fn report_count(&self) -> usize {
        self.reports.len()
    }

    /// Snapshot of one report by external id
    pub fn report(&self, external_id: &str) -> Option<SightingReport> {
        self.reports.get(external_id).map(|entry| entry.value().read().clone())
    }

    /// Score breakdown of one report by external id
    pub fn score_of(&self, external_id: &str) -> Option<ScoreBreakdown> {
        self.reports.get(external_id).and_then(|entry| entry.value().read().score.clone())
    }

    /// All recorded watch matches for a report by external id
    pub fn watches_for(&self, external_id: &str) -> Vec<WatchMatch> {
        match self.reports.get(external_id) {
            Some(entry) => {
                let id = entry.value().read().id;
                self.watches.matches_for_report(id)
            }
            None => Vec::new(),
        }
    }

    /// Zones ACTIVE at the query instant
    pub fn open_watches(&self, now: DateTime<Utc>) -> Vec<Arc<WatchZone>> {
        self.watches.open_watches(now)
    }

    /// Zone lookup by id (any state)
    pub fn watch(&self, id: Uuid) -> Option<Arc<WatchZone>> {
        self.watches.watch(id)
    }

    /// Housekeeping sweep of long-expired zones
    pub fn sweep_watches(&self, now: DateTime<Utc>) -> usize {
        self.watches.sweep(now)
    }

    /// Observed-vs-baseline proximity comparison over a point-in-time
    /// snapshot of the report set. `bands` defaults to the configured
    /// distance bands; results are cached for the configured TTL.
    pub fn proximity_stats(&self, bands: Option<&[f64]>) -> Result<Vec<CorrelationResult>> {
        let bands = match bands {
            Some(bands) => bands.to_vec(),
            None => self.config.analysis.distance_bands_km.clone(),
        };
        let observed: Vec<(f64, f64)> = self
            .reports
            .iter()
            .map(|entry| {
                let report = entry.value().read();
                (report.latitude, report.longitude)
            })
            .collect();
        let baseline = UniformBaseline::from_config(&self.config.analysis);
        self.analyzer.proximity_stats(&observed, &bands, &baseline)
    }

    /// Grid-value rank correlation over the scored reports, cached for the
    /// configured TTL.
    pub async fn grid_correlation(&self) -> Result<CorrelationResult> {
        let scored: Vec<ScoredPoint> = self
            .reports
            .iter()
            .filter_map(|entry| {
                let report = entry.value().read();
                report.score.as_ref().map(|s| ScoredPoint {
                    latitude: report.latitude,
                    longitude: report.longitude,
                    score: s.total,
                })
            })
            .collect();
        self.analyzer.grid_correlation_cached(&scored).await
    }
}

fn valid_coords(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

fn validate_earthquake(record: &EarthquakeRecord) -> Result<()> {
    if record.external_id.trim().is_empty() {
        return Err(EngineError::malformed("empty external id"));
    }
    if !valid_coords(record.latitude, record.longitude) {
        return Err(EngineError::malformed(format!(
            "coordinates out of range: {}, {}",
            record.latitude, record.longitude
        )));
    }
    if !record.magnitude.is_finite() {
        return Err(EngineError::malformed("non-finite magnitude"));
    }
    Ok(())
}

fn validate_sighting(record: &SightingRecord) -> Result<()> {
    if record.external_id.trim().is_empty() {
        return Err(EngineError::malformed("empty external id"));
    }
    if !valid_coords(record.latitude, record.longitude) {
        return Err(EngineError::malformed(format!(
            "coordinates out of range: {}, {}",
            record.latitude, record.longitude
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;
    use crate::coords::EARTH_RADIUS_KM;
    use crate::grid::FileGridSource;
    use crate::watch::WatchState;
    use chrono::{Duration, TimeZone};
    use std::io::Write;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    fn coordinator_with_grid(lines: &str) -> (IngestionCoordinator, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
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
        let config = EngineConfig::default();
        (IngestionCoordinator::new(config, gate, reference), file)
    }

    fn quake_record(external_id: &str, magnitude: f64) -> EarthquakeRecord {
        EarthquakeRecord {
            external_id: external_id.to_string(),
            magnitude,
            latitude: 37.7,
            longitude: -122.4,
            occurred_at: t0(),
        }
    }

    fn sighting_record(
        external_id: &str,
        lat: f64,
        lon: f64,
        at: DateTime<Utc>,
    ) -> SightingRecord {
        SightingRecord {
            external_id: external_id.to_string(),
            latitude: lat,
            longitude: lon,
            reported_at: at,
            shape_text: "orb".to_string(),
            free_text: String::new(),
        }
    }

    fn north_of(lat: f64, lon: f64, km: f64) -> (f64, f64) {
        (lat + (km / EARTH_RADIUS_KM).to_degrees(), lon)
    }

    #[test]
    fn test_earthquake_ingestion_is_idempotent() {
        let (coordinator, _file) = coordinator_with_grid("-122.4 37.7 30.0\n");
        assert_eq!(
            coordinator.ingest_earthquake(quake_record("eq-1", 4.2), t0()),
            IngestOutcome::Created
        );
        assert_eq!(
            coordinator.ingest_earthquake(quake_record("eq-1", 4.2), t0()),
            IngestOutcome::Duplicate
        );
        assert_eq!(coordinator.event_count(), 1);
        assert_eq!(coordinator.watches().zone_count(), 1);
    }

    #[tokio::test]
    async fn test_report_ingestion_is_idempotent() {
        let (coordinator, _file) = coordinator_with_grid("-122.4 37.7 30.0\n");
        let record = sighting_record("r-1", 37.7, -122.4, t0());
        assert_eq!(coordinator.ingest_report(record.clone(), t0()).await, IngestOutcome::Created);
        assert_eq!(coordinator.ingest_report(record, t0()).await, IngestOutcome::Duplicate);
        assert_eq!(coordinator.report_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_records_rejected_without_aborting_batch() {
        let (coordinator, _file) = coordinator_with_grid("-122.4 37.7 30.0\n");

        let summary = coordinator.ingest_earthquakes(
            vec![
                quake_record("eq-1", 4.2),
                EarthquakeRecord { latitude: 200.0, ..quake_record("eq-bad", 4.0) },
                EarthquakeRecord { external_id: "  ".to_string(), ..quake_record("x", 4.0) },
                quake_record("eq-2", 3.5),
            ],
            t0(),
        );
        assert_eq!(summary, BatchSummary { created: 2, duplicates: 0, rejected: 2 });

        let summary = coordinator
            .ingest_reports(
                vec![
                    sighting_record("r-1", 37.7, -122.4, t0()),
                    SightingRecord {
                        longitude: f64::NAN,
                        ..sighting_record("r-bad", 37.7, -122.4, t0())
                    },
                ],
                t0(),
            )
            .await;
        assert_eq!(summary, BatchSummary { created: 1, duplicates: 0, rejected: 1 });
    }

    #[tokio::test]
    async fn test_end_to_end_watch_scenario() {
        let (coordinator, _file) = coordinator_with_grid("-122.4 37.7 30.0\n");

        // one qualifying earthquake -> exactly one ACTIVE zone
        coordinator.ingest_earthquake(quake_record("eq-1", 4.2), t0());
        let open = coordinator.open_watches(t0());
        assert_eq!(open.len(), 1);
        let zone = &open[0];
        assert_eq!(zone.radius_km, 150.0);
        assert_eq!(zone.expires_at, t0() + Duration::hours(72));

        // a report 80 km away, 10 hours in -> one match
        let (lat, lon) = north_of(37.7, -122.4, 80.0);
        let near = sighting_record("r-near", lat, lon, t0() + Duration::hours(10));
        coordinator.ingest_report(near, t0() + Duration::hours(10)).await;
        let matches = coordinator.watches_for("r-near");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].zone_id, zone.id);
        assert!((matches[0].distance_km - 80.0).abs() < 0.1);
        assert!((matches[0].time_offset_hours - 10.0).abs() < 0.01);

        // a report 200 km away -> no match
        let (lat, lon) = north_of(37.7, -122.4, 200.0);
        let far = sighting_record("r-far", lat, lon, t0() + Duration::hours(10));
        coordinator.ingest_report(far, t0() + Duration::hours(10)).await;
        assert!(coordinator.watches_for("r-far").is_empty());

        // past expiry: the zone reports EXPIRED, the match history stays
        let later = t0() + Duration::hours(73);
        assert!(coordinator.open_watches(later).is_empty());
        let zone = coordinator.watch(zone.id).unwrap();
        assert_eq!(zone.state_at(later), WatchState::Expired);
        assert_eq!(coordinator.watches_for("r-near").len(), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_scoring_scenario() {
        let (coordinator, _file) = coordinator_with_grid("-122.4 37.7 30.0\n");
        let record = SightingRecord {
            shape_text: "orb".to_string(),
            free_text: "an earthquake rumble and static on the radio".to_string(),
            ..sighting_record("r-1", 37.7, -122.4, t0())
        };
        coordinator.ingest_report(record, t0()).await;

        let breakdown = coordinator.score_of("r-1").unwrap();
        assert_eq!(breakdown.magnetic, 30.0);
        assert_eq!(breakdown.shape, 20.0);
        // "earthquake", "static", "radio" -> three distinct hits
        assert_eq!(breakdown.physical_effects, 15.0);
        assert_eq!(
            breakdown.total,
            breakdown.magnetic + breakdown.shape + breakdown.physical_effects + breakdown.seismic
        );
        assert!(breakdown.total <= 100.0);
    }

    #[tokio::test]
    async fn test_report_scored_near_quake_gets_seismic_points() {
        let (coordinator, _file) = coordinator_with_grid("-122.4 37.7 30.0\n");
        coordinator.ingest_earthquake(quake_record("eq-1", 4.2), t0());

        let record = sighting_record("r-1", 37.7, -122.4, t0() + Duration::hours(1));
        coordinator.ingest_report(record, t0() + Duration::hours(1)).await;

        let breakdown = coordinator.score_of("r-1").unwrap();
        assert!(breakdown.seismic > 0.0);
        let report = coordinator.report("r-1").unwrap();
        assert_eq!(report.matched_watch_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ingestion_of_same_key_creates_one_entity() {
        let (coordinator, _file) = coordinator_with_grid("-122.4 37.7 30.0\n");
        let coordinator = Arc::new(coordinator);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.ingest_earthquake(quake_record("eq-race", 4.2), t0())
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() == IngestOutcome::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(coordinator.event_count(), 1);
        assert_eq!(coordinator.watches().zone_count(), 1);
    }

    #[tokio::test]
    async fn test_grid_correlation_over_ingested_reports() {
        let (coordinator, _file) =
            coordinator_with_grid("-122.4 37.7 30.0\n-119.0 40.0 250.0\n");

        // varied shapes and texts produce varied scores at both grid cells
        let records = vec![
            SightingRecord {
                shape_text: "orb".into(),
                free_text: "static and tremor".into(),
                ..sighting_record("r-1", 37.7, -122.4, t0())
            },
            SightingRecord {
                shape_text: "triangle".into(),
                free_text: String::new(),
                ..sighting_record("r-2", 37.8, -122.3, t0())
            },
            SightingRecord {
                shape_text: "light".into(),
                free_text: String::new(),
                ..sighting_record("r-3", 40.0, -119.0, t0())
            },
            SightingRecord {
                shape_text: "oval".into(),
                free_text: "compass went wild".into(),
                ..sighting_record("r-4", 40.1, -119.1, t0())
            },
        ];
        coordinator.ingest_reports(records, t0()).await;

        let result = coordinator.grid_correlation().await.unwrap();
        assert_eq!(result.observed_n, 4);
        assert!(result.p_value.is_finite());
    }
}
