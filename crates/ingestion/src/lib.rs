//! Source ingestion and cleaning for the signal-corpus system.
//!
//! This crate handles:
//! - Source registration and per-record quality assignment
//! - Text quality heuristics
//! - Quality threshold filtering
//! - Exact and near-duplicate removal
//! - Native-to-canonical normalization

pub mod catalog;
pub mod dedup;
pub mod heuristics;
pub mod normalizer;
pub mod quality_filter;

pub use catalog::{SourceCatalog, SourceEntry};
pub use dedup::{DedupOutcome, DedupReport, Deduplicator};
pub use heuristics::{TextQualityReport, TextQualityScorer};
pub use normalizer::{NormalizeOutcome, NormalizedRecord, RecordNormalizer};
pub use quality_filter::{FilterOutcome, FilterReport, QualityFilter};
