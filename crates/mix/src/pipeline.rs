//! Corpus build pipeline.
//!
//! Runs the stages in order over a [`SourceCatalog`]:
//! filter -> dedup -> normalize -> allocate -> select -> split -> manifest.
//! Every stage preserves input order, so a build is fully determined by the
//! catalog contents and the mix spec (including its seed).

use corpus_core::hash::derive_seed;
use corpus_core::{
    CorpusEntry, DedupConfig, Error, MixSpec, PipelineConfig, RawRecord, Result, SourceId,
};
use corpus_ingestion::{Deduplicator, QualityFilter, RecordNormalizer, SourceCatalog};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::allocator::{Allocation, MixAllocator};
use crate::manifest::{BuildManifest, SourceManifest, StageCounts};
use crate::splitter::{SplitCorpus, StratifiedSplitter};

/// Output of a successful build.
#[derive(Debug, Clone)]
pub struct CorpusBuild {
    /// The three splits.
    pub splits: SplitCorpus,
    /// Build summary.
    pub manifest: BuildManifest,
}

/// Allocation dry run: pools and counts without selecting or splitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixPlan {
    /// Mix spec version.
    pub mix_version: String,
    /// Requested corpus size.
    pub total_size: usize,
    /// Per-source counts up to allocation.
    pub sources: Vec<SourceManifest>,
    /// Allocator output.
    pub allocations: Vec<Allocation>,
}

/// Normalized per-source pools plus the counts that produced them.
struct Pools {
    pools: Vec<(SourceId, Vec<CorpusEntry>)>,
    counts: Vec<StageCounts>,
}

/// Builds a corpus from registered sources according to a [`MixSpec`].
pub struct CorpusPipeline {
    mix: MixSpec,
    dedup: Deduplicator,
}

impl CorpusPipeline {
    /// Create a pipeline, validating the mix and dedup settings up front.
    pub fn new(mix: MixSpec, dedup: DedupConfig) -> Result<Self> {
        mix.validate()?;
        Ok(Self {
            mix,
            dedup: Deduplicator::new(dedup)?,
        })
    }

    /// Create a pipeline from a full configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.mix.clone(), config.dedup.clone())
    }

    /// Mix spec in use.
    pub fn mix(&self) -> &MixSpec {
        &self.mix
    }

    /// Compute pools and allocation without producing a corpus.
    pub fn plan(&self, catalog: &SourceCatalog) -> Result<MixPlan> {
        let Pools { pools, mut counts } = self.pools(catalog)?;
        let allocations = MixAllocator::allocate(&self.mix, &pool_sizes(&pools))?;
        for (count, allocation) in counts.iter_mut().zip(&allocations) {
            count.allocated = allocation.count;
        }
        Ok(MixPlan {
            mix_version: self.mix.version.clone(),
            total_size: self.mix.total_size,
            sources: self.source_manifests(counts),
            allocations,
        })
    }

    /// Run the full build.
    pub fn run(&self, catalog: &SourceCatalog) -> Result<CorpusBuild> {
        let Pools { pools, mut counts } = self.pools(catalog)?;

        let allocations = MixAllocator::allocate(&self.mix, &pool_sizes(&pools))?;

        let selected: Vec<(SourceId, Vec<CorpusEntry>)> = pools
            .into_iter()
            .zip(&allocations)
            .map(|((source_id, pool), allocation)| {
                let seed = derive_seed(self.mix.seed, &format!("select:{source_id}"));
                let chosen = select(pool, allocation.count, seed);
                (source_id, chosen)
            })
            .collect();

        let splitter = StratifiedSplitter::new(self.mix.split, self.mix.seed)?;
        let splits = splitter.split(selected)?;

        for ((count, allocation), source) in counts.iter_mut().zip(&allocations).zip(&self.mix.sources) {
            count.allocated = allocation.count;
            if let Some(sizes) = splits.per_source.get(&source.source_id) {
                count.train = sizes.train;
                count.validation = sizes.validation;
                count.test = sizes.test;
            }
        }

        let manifest = BuildManifest::new(
            self.mix.version.clone(),
            self.mix.seed,
            self.mix.total_size,
            self.mix.split,
            self.source_manifests(counts),
            splits.sizes(),
        );

        tracing::info!(
            mix_version = %manifest.mix_version,
            total = splits.len(),
            train = manifest.splits.train,
            validation = manifest.splits.validation,
            test = manifest.splits.test,
            removed = manifest.totals.removed(),
            "corpus built"
        );

        Ok(CorpusBuild { splits, manifest })
    }

    fn pools(&self, catalog: &SourceCatalog) -> Result<Pools> {
        self.mix.validate()?;

        let mut entries = Vec::with_capacity(self.mix.sources.len());
        for source in &self.mix.sources {
            let entry = catalog.get(&source.source_id).ok_or_else(|| {
                Error::config(format!(
                    "mix references source '{}' which is not registered",
                    source.source_id
                ))
            })?;
            entries.push(entry);
        }

        let mut counts = vec![StageCounts::default(); entries.len()];

        // Quality filter, per source threshold.
        let mut filtered: Vec<&RawRecord> = Vec::new();
        for ((source, entry), count) in self.mix.sources.iter().zip(&entries).zip(counts.iter_mut()) {
            let outcome = QualityFilter::new(source.quality_threshold)?.apply(&entry.records);
            count.registered = entry.records.len();
            count.quality_rejected = outcome.report.total_rejected();
            filtered.extend(outcome.kept);
        }

        // Dedup across all mixed sources in declaration order.
        let deduped = self.dedup.apply(&filtered);
        let mut by_source: HashMap<&str, Vec<&RawRecord>> = HashMap::new();
        for record in deduped.kept {
            by_source.entry(record.source_id.as_str()).or_default().push(record);
        }

        let mut pools = Vec::with_capacity(entries.len());
        for (entry, count) in entries.iter().zip(counts.iter_mut()) {
            count.exact_duplicates = deduped.report.exact_by_source.get(&entry.id).copied().unwrap_or(0);
            count.near_duplicates = deduped.report.near_by_source.get(&entry.id).copied().unwrap_or(0);

            let records = by_source.remove(entry.id.as_str()).unwrap_or_default();
            let outcome = RecordNormalizer::new(&entry.id, &entry.schema).normalize_all(records);
            if !outcome.failures.is_empty() {
                tracing::warn!(
                    source = %entry.id,
                    dropped = outcome.failures.len(),
                    first = %outcome.failures[0],
                    "records failed normalization"
                );
            }
            count.normalization_failed = outcome.failures.len();
            count.repaired = outcome.repaired;
            count.available = outcome.entries.len();

            tracing::debug!(
                source = %entry.id,
                registered = count.registered,
                available = count.available,
                "source pool ready"
            );
            pools.push((entry.id.clone(), outcome.entries));
        }

        Ok(Pools { pools, counts })
    }

    fn source_manifests(&self, counts: Vec<StageCounts>) -> Vec<SourceManifest> {
        self.mix
            .sources
            .iter()
            .zip(counts)
            .map(|(source, counts)| SourceManifest {
                source_id: source.source_id.clone(),
                ratio: source.ratio,
                quality_threshold: source.quality_threshold,
                counts,
            })
            .collect()
    }
}

fn pool_sizes(pools: &[(SourceId, Vec<CorpusEntry>)]) -> BTreeMap<SourceId, usize> {
    pools
        .iter()
        .map(|(id, entries)| (id.clone(), entries.len()))
        .collect()
}

/// Seeded sample of `count` entries, keeping their relative order.
fn select(pool: Vec<CorpusEntry>, count: usize, seed: u64) -> Vec<CorpusEntry> {
    if count >= pool.len() {
        return pool;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut chosen = vec![false; pool.len()];
    for i in rand::seq::index::sample(&mut rng, pool.len(), count).into_vec() {
        chosen[i] = true;
    }
    pool.into_iter()
        .zip(chosen)
        .filter_map(|(entry, keep)| keep.then_some(entry))
        .collect()
}
