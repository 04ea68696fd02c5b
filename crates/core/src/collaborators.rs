//! Interfaces of the external systems the corpus tooling talks to.
//!
//! Neither trait is implemented in this workspace; the fine-tuning loop and
//! the embedding store live elsewhere.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::CorpusPaths;

/// Opaque reference to a trained model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Identifier or location understood by the serving layer.
    pub reference: String,
}

/// Fine-tuning backend consuming a written corpus.
pub trait Trainer {
    /// Train on the three split files and return the resulting artifact.
    fn train(&self, corpus: &CorpusPaths) -> Result<ModelArtifact>;
}

/// A passage returned by a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Passage text.
    pub text: String,
    /// Relevance score; higher is more relevant.
    pub relevance: f64,
}

/// Knowledge store queried for grounding passages.
pub trait KnowledgeRetriever: Send + Sync {
    /// Up to `limit` passages for `query`, most relevant first.
    fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedPassage>>;
}
