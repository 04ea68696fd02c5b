//! Corpus assembly for the signal-corpus system.
//!
//! This crate handles:
//! - Largest-remainder mix allocation
//! - Seeded stratified train/validation/test splitting
//! - The end-to-end build pipeline and its manifest
//! - Writing and reading corpus files

pub mod allocator;
pub mod manifest;
pub mod pipeline;
pub mod splitter;
pub mod writer;

#[cfg(test)]
mod testutil;

pub use allocator::{largest_remainder, Allocation, MixAllocator};
pub use manifest::{BuildManifest, SourceManifest, StageCounts};
pub use pipeline::{CorpusBuild, CorpusPipeline, MixPlan};
pub use splitter::{SplitAssignment, SplitCorpus, SplitSizes, StratifiedSplitter};
pub use writer::{read_split, CorpusWriter};
