//! Inference-time validation for the signal-corpus system.
//!
//! This crate handles:
//! - Classifying generated text against the canonical record schema
//! - Duplicate-key detection
//! - Violation feedback for external retry loops

pub mod feedback;
pub mod probe;
pub mod validator;

pub use feedback::RetryPrompt;
pub use probe::{audit_keys, KeyAudit};
pub use validator::{
    strip_code_fence, SchemaValidator, ValidationReport, ValidationState, ValidatorOptions,
};
