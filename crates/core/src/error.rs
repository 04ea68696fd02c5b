//! Error types for the corpus pipeline.

use thiserror::Error;

use crate::types::SourceId;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for corpus building.
///
/// Inference-time validation outcomes are not errors; see
/// `corpus_validation::ValidationState`.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration (mix ratios, thresholds, field mappings).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A source cannot supply its allocated record count.
    #[error(
        "Insufficient data: source '{source_id}' was allocated {requested} records \
         but only {available} are available (short by {})",
        shortfall(.requested, .available)
    )]
    InsufficientData {
        /// Offending source.
        source_id: SourceId,
        /// Records the allocator asked for.
        requested: usize,
        /// Records left after filtering, dedup and normalization.
        available: usize,
    },

    /// A single record could not be mapped into the canonical schema.
    #[error("Normalization error: {source_id}#{record_index} field '{field}': {reason}")]
    Normalization {
        /// Source the record came from.
        source_id: SourceId,
        /// Position of the record within its source.
        record_index: usize,
        /// Canonical field that failed.
        field: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Data error (inconsistent or corrupt data).
    #[error("Data error: {0}")]
    Data(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create an insufficient data error.
    pub fn insufficient_data(
        source_id: impl Into<SourceId>,
        requested: usize,
        available: usize,
    ) -> Self {
        Error::InsufficientData {
            source_id: source_id.into(),
            requested,
            available,
        }
    }

    /// Create a normalization error for one record.
    pub fn normalization(
        source_id: impl Into<SourceId>,
        record_index: usize,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Normalization {
            source_id: source_id.into(),
            record_index,
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error aborts a corpus build.
    ///
    /// Normalization errors are recovered per record; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Normalization { .. })
    }
}

fn shortfall(requested: &usize, available: &usize) -> usize {
    requested.saturating_sub(*available)
}
