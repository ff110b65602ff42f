//! Error types for the Skyquake engine
//!
//! ## Table of Contents
//! - **EngineError**: Main error enum covering all failure modes
//! - **Result**: Type alias for `Result<T, EngineError>`

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Grid or reference source unreachable or unparseable. Fatal to the
    /// calling operation, not to the process; retried on a backoff.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Analysis bounding region is malformed (zero area, inverted, or
    /// outside valid coordinates). Surfaced to the caller, not retried.
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// Analysis input too degenerate to produce a meaningful statistic
    /// (too few points, zero-variance ranks).
    #[error("degenerate baseline: {0}")]
    DegenerateBaseline(String),

    /// Inbound record missing or carrying out-of-range fields. Rejected at
    /// the ingestion boundary without aborting the batch.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Configuration error during setup
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failure while fetching a remote source
    #[cfg(feature = "http-source")]
    #[error("http error: {0}")]
    Http(String),
}

impl EngineError {
    /// Create a data-unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::DataUnavailable(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed-record error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }
}

#[cfg(feature = "http-source")]
impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
