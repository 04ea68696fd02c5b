//! Seeded, per-source stratified train/validation/test split.

use corpus_core::hash::derive_seed;
use corpus_core::{ContentHash, CorpusEntry, Error, Result, SourceId, SplitLabel, SplitRatios};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::allocator::largest_remainder;

/// Train/validation/test sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    /// Training records.
    pub train: usize,
    /// Validation records.
    pub validation: usize,
    /// Test records.
    pub test: usize,
}

impl SplitSizes {
    /// Size for one split.
    pub fn get(&self, label: SplitLabel) -> usize {
        match label {
            SplitLabel::Train => self.train,
            SplitLabel::Validation => self.validation,
            SplitLabel::Test => self.test,
        }
    }

    /// Sum of all three.
    pub fn total(&self) -> usize {
        self.train + self.validation + self.test
    }

    fn from_counts(counts: &[usize]) -> Self {
        Self {
            train: counts.first().copied().unwrap_or(0),
            validation: counts.get(1).copied().unwrap_or(0),
            test: counts.get(2).copied().unwrap_or(0),
        }
    }
}

/// Which split each record went to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitAssignment {
    labels: BTreeMap<ContentHash, SplitLabel>,
}

impl SplitAssignment {
    /// Record an assignment. A record can belong to one split only.
    pub fn assign(&mut self, hash: ContentHash, label: SplitLabel) -> Result<()> {
        if let Some(existing) = self.labels.get(&hash) {
            return Err(Error::data(format!(
                "record {hash} already assigned to {existing}, cannot assign to {label}"
            )));
        }
        self.labels.insert(hash, label);
        Ok(())
    }

    /// Split of a record, if assigned.
    pub fn label_of(&self, hash: &ContentHash) -> Option<SplitLabel> {
        self.labels.get(hash).copied()
    }

    /// Number of assigned records.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether nothing is assigned.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The three splits plus bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct SplitCorpus {
    /// Training split, shuffled.
    pub train: Vec<CorpusEntry>,
    /// Validation split, shuffled.
    pub validation: Vec<CorpusEntry>,
    /// Test split, shuffled.
    pub test: Vec<CorpusEntry>,
    /// Record to split mapping.
    pub assignment: SplitAssignment,
    /// Per-source split sizes.
    pub per_source: BTreeMap<SourceId, SplitSizes>,
}

impl SplitCorpus {
    /// Entries of one split.
    pub fn split(&self, label: SplitLabel) -> &[CorpusEntry] {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.validation,
            SplitLabel::Test => &self.test,
        }
    }

    fn split_mut(&mut self, label: SplitLabel) -> &mut Vec<CorpusEntry> {
        match label {
            SplitLabel::Train => &mut self.train,
            SplitLabel::Validation => &mut self.validation,
            SplitLabel::Test => &mut self.test,
        }
    }

    /// Sizes of the three splits.
    pub fn sizes(&self) -> SplitSizes {
        SplitSizes {
            train: self.train.len(),
            validation: self.validation.len(),
            test: self.test.len(),
        }
    }

    /// Total records.
    pub fn len(&self) -> usize {
        self.sizes().total()
    }

    /// Whether every split is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits each source independently so every split keeps the mix.
#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    ratios: SplitRatios,
    seed: u64,
}

impl StratifiedSplitter {
    /// Create a splitter. Ratios must be valid.
    pub fn new(ratios: SplitRatios, seed: u64) -> Result<Self> {
        ratios.validate()?;
        Ok(Self { ratios, seed })
    }

    /// Split per-source groups, given in declaration order.
    pub fn split(&self, groups: Vec<(SourceId, Vec<CorpusEntry>)>) -> Result<SplitCorpus> {
        let mut corpus = SplitCorpus::default();

        for (source_id, mut entries) in groups {
            let counts = largest_remainder(&self.ratios.as_array(), entries.len());
            let sizes = SplitSizes::from_counts(&counts);

            let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(
                self.seed,
                &format!("split-source:{source_id}"),
            ));
            entries.shuffle(&mut rng);

            let mut rest = entries.into_iter();
            for label in SplitLabel::ALL {
                for entry in rest.by_ref().take(sizes.get(label)) {
                    corpus.assignment.assign(entry.hash.clone(), label)?;
                    corpus.split_mut(label).push(entry);
                }
            }

            tracing::debug!(
                source = %source_id,
                train = sizes.train,
                validation = sizes.validation,
                test = sizes.test,
                "source split"
            );
            corpus.per_source.insert(source_id, sizes);
        }

        for label in SplitLabel::ALL {
            let mut rng =
                ChaCha8Rng::seed_from_u64(derive_seed(self.seed, &format!("split:{label}")));
            corpus.split_mut(label).shuffle(&mut rng);
        }

        Ok(corpus)
    }
}
