//! # Skyquake Engine — Correlation & Scoring Core
//!
//! Ingests two independent real-world event streams — an earthquake feed
//! and a sighting-report feed — and computes spatial/temporal correlation
//! signals between them and a set of static geographic reference layers
//! (a geomagnetic anomaly grid and a list of named reference points).
//!
//! The engine produces three things:
//! - a per-report composite score with a retained per-dimension breakdown,
//! - time-boxed spatial watch zones anchored to qualifying earthquakes,
//!   with append-only report matching,
//! - aggregate observed-vs-baseline statistics with rank-based significance
//!   testing and family-wise correction.
//!
//! The serving layer, persistence, and the feeds' HTTP/scraping internals
//! live outside this crate; they talk to the core through
//! [`IngestionCoordinator`] and the feed traits in [`tasks`]. Every
//! aggregate number ships with its confidence metadata (p-value, correction
//! status) — the engine computes statistics, it does not claim causality.
//!
//! ## Modules
//! - `config` — TOML-backed engine configuration
//! - `coords` — great-circle math and bounding regions
//! - `error` — failure taxonomy shared by every module
//! - `types` — entities, records, breakdowns, results
//! - `grid` — geomagnetic grid with a lazy single-acquisition gate
//! - `proximity` — static reference point lookups
//! - `scoring` — profile-driven composite scoring
//! - `watch` — watch zone lifecycle and matching
//! - `stats` — rank-based statistical primitives
//! - `analysis` — observed-vs-baseline correlation analysis
//! - `ingest` — deduplicating intake and the outbound query surface
//! - `tasks` — periodic feed runners
//!
//! ## Table of Contents
//! 1. Module declarations
//! 2. Re-exports

pub mod analysis;
pub mod config;
pub mod coords;
pub mod error;
pub mod grid;
pub mod ingest;
pub mod proximity;
pub mod scoring;
pub mod stats;
pub mod tasks;
pub mod types;
pub mod watch;

pub use analysis::{BaselineGenerator, CorrelationAnalyzer, ScoredPoint, UniformBaseline};
pub use config::EngineConfig;
pub use coords::{haversine_km, BoundingRegion, EARTH_RADIUS_KM};
pub use error::{EngineError, Result};
pub use grid::{GridGate, GridSource, SpatialGrid};
pub use ingest::IngestionCoordinator;
pub use proximity::ProximityIndex;
pub use scoring::{ScoringEngine, ScoringProfile};
pub use tasks::{EarthquakeFeed, FeedRunner, ReportFeed};
pub use types::{
    CorrelationResult, EarthquakeEvent, EarthquakeRecord, ScoreBreakdown, Shape, SightingRecord,
    SightingReport, WatchMatch,
};
pub use watch::{WatchManager, WatchState, WatchZone};
