//! Core types and configuration for the signal-corpus system.
//!
//! This crate provides shared types used across all other crates:
//! - Raw and canonical record types
//! - Canonical schema constraints and invariants
//! - Mix, split and source configuration
//! - Common error types
//! - Interfaces of external collaborators (trainer, retriever)

pub mod collaborators;
pub mod config;
pub mod error;
pub mod hash;
pub mod schema;
pub mod types;

pub use collaborators::{KnowledgeRetriever, ModelArtifact, RetrievedPassage, Trainer};
pub use config::{
    Conversion, DedupConfig, FieldMapping, FieldRule, MixSpec, PipelineConfig, QualityOrigin,
    SourceDefinition, SourceMix, SourceSchema, SplitRatios,
};
pub use error::{Error, Result};
pub use schema::{fields, Violation, FORECAST_DAYS, NEUTRAL_CONFIDENCE};
pub use types::*;
