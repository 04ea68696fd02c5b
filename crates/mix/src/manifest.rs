//! Build manifest.
//!
//! Describes how a corpus was assembled: which mix revision, how many records
//! each stage removed, and where the remaining records went. It carries no
//! timestamps, so an identical build yields an identical manifest.

use corpus_core::{SourceId, SplitRatios};
use serde::{Deserialize, Serialize};

use crate::splitter::SplitSizes;

/// Record counts through each pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    /// Records registered in the catalog.
    pub registered: usize,
    /// Dropped below the quality threshold.
    pub quality_rejected: usize,
    /// Dropped as exact duplicates.
    pub exact_duplicates: usize,
    /// Dropped as near duplicates.
    pub near_duplicates: usize,
    /// Dropped by normalization.
    pub normalization_failed: usize,
    /// Kept after repair.
    pub repaired: usize,
    /// Pool size offered to the allocator.
    pub available: usize,
    /// Records drawn into the corpus.
    pub allocated: usize,
    /// Records in the training split.
    pub train: usize,
    /// Records in the validation split.
    pub validation: usize,
    /// Records in the test split.
    pub test: usize,
}

impl StageCounts {
    /// Add another set of counts into this one.
    pub fn absorb(&mut self, other: &StageCounts) {
        self.registered += other.registered;
        self.quality_rejected += other.quality_rejected;
        self.exact_duplicates += other.exact_duplicates;
        self.near_duplicates += other.near_duplicates;
        self.normalization_failed += other.normalization_failed;
        self.repaired += other.repaired;
        self.available += other.available;
        self.allocated += other.allocated;
        self.train += other.train;
        self.validation += other.validation;
        self.test += other.test;
    }

    /// Records removed before allocation.
    pub fn removed(&self) -> usize {
        self.quality_rejected + self.exact_duplicates + self.near_duplicates + self.normalization_failed
    }
}

/// Counts for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceManifest {
    /// Source id.
    pub source_id: SourceId,
    /// Mix ratio.
    pub ratio: f64,
    /// Quality threshold applied.
    pub quality_threshold: f64,
    /// Per-stage counts.
    #[serde(flatten)]
    pub counts: StageCounts,
}

/// Summary of one corpus build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Mix revision label.
    pub mix_version: String,
    /// Seed used for sampling and splitting.
    pub seed: u64,
    /// Requested corpus size.
    pub total_size: usize,
    /// Split ratios applied.
    pub split_ratios: SplitRatios,
    /// Per-source counts in declaration order.
    pub sources: Vec<SourceManifest>,
    /// Counts summed over sources.
    pub totals: StageCounts,
    /// Final split sizes.
    pub splits: SplitSizes,
}

impl BuildManifest {
    /// Assemble a manifest, computing totals from the per-source counts.
    pub fn new(
        mix_version: impl Into<String>,
        seed: u64,
        total_size: usize,
        split_ratios: SplitRatios,
        sources: Vec<SourceManifest>,
        splits: SplitSizes,
    ) -> Self {
        let mut totals = StageCounts::default();
        for source in &sources {
            totals.absorb(&source.counts);
        }
        Self {
            mix_version: mix_version.into(),
            seed,
            total_size,
            split_ratios,
            sources,
            totals,
            splits,
        }
    }

    /// Counts for one source.
    pub fn source(&self, source_id: &str) -> Option<&SourceManifest> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    /// Whether totals, per-source split counts and split sizes agree.
    pub fn is_consistent(&self) -> bool {
        let per_source_ok = self.sources.iter().all(|s| {
            let c = &s.counts;
            c.train + c.validation + c.test == c.allocated
                && c.allocated <= c.available
                && c.registered == c.removed() + c.available
        });
        per_source_ok
            && self.totals.allocated == self.total_size
            && self.splits.total() == self.total_size
            && self.splits.train == self.totals.train
            && self.splits.validation == self.totals.validation
            && self.splits.test == self.totals.test
    }
}
