//! Exact and near-duplicate removal.
//!
//! Exact duplicates share a content hash. Near duplicates are detected by
//! Jaccard similarity of word 3-shingles over the payload's text, compared
//! against a bounded window of recently kept records. The first occurrence
//! in input order always wins.

use corpus_core::{DedupConfig, Payload, RawRecord, Result, SourceId};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::heuristics::normalize_text;

const SHINGLE_SIZE: usize = 3;

/// Counts from one dedup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    /// Exact duplicates dropped, per source.
    pub exact_by_source: BTreeMap<SourceId, usize>,
    /// Near duplicates dropped, per source.
    pub near_by_source: BTreeMap<SourceId, usize>,
}

impl DedupReport {
    /// Total exact duplicates.
    pub fn exact_total(&self) -> usize {
        self.exact_by_source.values().sum()
    }

    /// Total near duplicates.
    pub fn near_total(&self) -> usize {
        self.near_by_source.values().sum()
    }

    /// Duplicates of either kind dropped from one source.
    pub fn removed_for(&self, source_id: &str) -> usize {
        self.exact_by_source.get(source_id).copied().unwrap_or(0)
            + self.near_by_source.get(source_id).copied().unwrap_or(0)
    }
}

/// Surviving records plus the report.
#[derive(Debug)]
pub struct DedupOutcome<'a> {
    /// Kept records, in input order.
    pub kept: Vec<&'a RawRecord>,
    /// Counts.
    pub report: DedupReport,
}

/// Removes duplicate records.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    /// Create a deduplicator.
    pub fn new(config: DedupConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Exact-only deduplicator.
    pub fn exact() -> Self {
        Self {
            config: DedupConfig::default(),
        }
    }

    /// Drop duplicates, keeping the first occurrence.
    pub fn apply<'a>(&self, records: &[&'a RawRecord]) -> DedupOutcome<'a> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut report = DedupReport::default();
        let mut unique = Vec::with_capacity(records.len());

        for &record in records {
            if seen.insert(&record.hash) {
                unique.push(record);
            } else {
                *report
                    .exact_by_source
                    .entry(record.source_id.clone())
                    .or_insert(0) += 1;
            }
        }

        let kept = match self.config.near_duplicate_threshold {
            Some(threshold) => self.drop_near(unique, threshold, &mut report),
            None => unique,
        };

        if report.exact_total() + report.near_total() > 0 {
            tracing::debug!(
                exact = report.exact_total(),
                near = report.near_total(),
                "duplicates removed"
            );
        }

        DedupOutcome { kept, report }
    }

    fn drop_near<'a>(
        &self,
        records: Vec<&'a RawRecord>,
        threshold: f64,
        report: &mut DedupReport,
    ) -> Vec<&'a RawRecord> {
        let shingle_sets: Vec<HashSet<String>> = records
            .par_iter()
            .map(|r| shingles(&payload_text(&r.payload)))
            .collect();

        let mut window: VecDeque<usize> = VecDeque::with_capacity(self.config.window);
        let mut kept = Vec::with_capacity(records.len());

        for (i, record) in records.into_iter().enumerate() {
            let current = &shingle_sets[i];
            let is_near = !current.is_empty()
                && window
                    .iter()
                    .any(|&j| jaccard(current, &shingle_sets[j]) >= threshold);

            if is_near {
                *report
                    .near_by_source
                    .entry(record.source_id.clone())
                    .or_insert(0) += 1;
                continue;
            }

            if window.len() == self.config.window {
                window.pop_front();
            }
            window.push_back(i);
            kept.push(record);
        }
        kept
    }
}

/// Concatenate every string value of a payload in sorted-key order.
pub fn payload_text(payload: &Payload) -> String {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.push(normalize_text(s)),
            Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    collect(&map[key], out);
                }
            }
            _ => {}
        }
    }

    let mut parts = Vec::new();
    let mut keys: Vec<&String> = payload.keys().collect();
    keys.sort();
    for key in keys {
        collect(&payload[key], &mut parts);
    }
    parts.retain(|p| !p.is_empty());
    parts.join(" ")
}

/// Word shingles of normalized text; unigrams when fewer than three words.
pub fn shingles(text: &str) -> HashSet<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < SHINGLE_SIZE {
        return words.into_iter().map(str::to_string).collect();
    }
    words.windows(SHINGLE_SIZE).map(|w| w.join(" ")).collect()
}

/// Jaccard similarity of two sets; 0.0 when both are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_core::QualityScore;
    use serde_json::json;

    fn record(source: &str, index: usize, value: Value) -> RawRecord {
        RawRecord::new(
            source,
            index,
            value.as_object().cloned().unwrap(),
            QualityScore::MAX,
        )
    }

    #[test]
    fn test_exact_duplicates_first_wins() {
        let a = record("a", 0, json!({"analysis": "x", "n": 1}));
        let b = record("b", 0, json!({"n": 1, "analysis": "x"}));
        let c = record("b", 1, json!({"analysis": "y"}));
        let outcome = Deduplicator::exact().apply(&[&a, &b, &c]);
        assert_eq!(outcome.kept.len(), 2);
        assert_eq!(outcome.kept[0].source_id, "a");
        assert_eq!(outcome.report.exact_by_source.get("b"), Some(&1));
        assert_eq!(outcome.report.removed_for("a"), 0);
    }

    #[test]
    fn test_idempotent() {
        let a = record("a", 0, json!({"v": 1}));
        let b = record("a", 1, json!({"v": 1}));
        let c = record("a", 2, json!({"v": 2}));
        let dedup = Deduplicator::exact();
        let once = dedup.apply(&[&a, &b, &c]);
        let twice = dedup.apply(&once.kept);
        assert_eq!(once.kept.len(), twice.kept.len());
        assert_eq!(twice.report, DedupReport::default());
    }

    #[test]
    fn test_near_dedup_idempotent_with_small_window() {
        let texts = [
            "bitcoin broke above the weekly range high on heavy spot volume",
            "bitcoin broke above the weekly range high on heavy spot volume today",
            "ether lagged while funding turned negative across major venues",
            "solana reclaimed the prior breakdown level after a liquidity sweep",
            "ether lagged while funding turned negative across major venues again",
            "dollar strength capped risk assets into the close on friday",
        ];
        let records: Vec<RawRecord> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| record("a", i, json!({"analysis": t, "n": i})))
            .collect();
        let refs: Vec<&RawRecord> = records.iter().collect();

        let dedup = Deduplicator::new(DedupConfig {
            near_duplicate_threshold: Some(0.7),
            window: 2,
        })
        .unwrap();
        let once = dedup.apply(&refs);
        let twice = dedup.apply(&once.kept);
        assert!(once.report.near_total() > 0);
        assert_eq!(once.kept.len(), twice.kept.len());
        assert_eq!(twice.report, DedupReport::default());
    }

    #[test]
    fn test_near_duplicates() {
        let base = "bitcoin broke above the weekly range high on heavy spot volume today";
        let a = record("a", 0, json!({"analysis": base, "price": 1}));
        let b = record("a", 1, json!({"analysis": format!("{base}!"), "price": 2}));
        let c = record("a", 2, json!({"analysis": "ether lagged while funding turned negative across venues", "price": 3}));

        let dedup = Deduplicator::new(DedupConfig {
            near_duplicate_threshold: Some(0.8),
            window: 16,
        })
        .unwrap();
        let outcome = dedup.apply(&[&a, &b, &c]);
        assert_eq!(outcome.kept.len(), 2);
        assert_eq!(outcome.kept[1].index, 2);
        assert_eq!(outcome.report.near_total(), 1);
        assert_eq!(outcome.report.exact_total(), 0);
    }

    #[test]
    fn test_textless_records_never_near_duplicates() {
        let a = record("a", 0, json!({"price": 1}));
        let b = record("a", 1, json!({"price": 2}));
        let dedup = Deduplicator::new(DedupConfig {
            near_duplicate_threshold: Some(0.5),
            window: 4,
        })
        .unwrap();
        assert_eq!(dedup.apply(&[&a, &b]).kept.len(), 2);
    }

    #[test]
    fn test_window_bounds_comparison() {
        let text = "the same analysis text repeated over and over";
        let a = record("a", 0, json!({"analysis": text, "n": 0}));
        let filler = record("a", 1, json!({"analysis": "completely different words entirely here", "n": 1}));
        let b = record("a", 2, json!({"analysis": text, "n": 2}));
        let dedup = Deduplicator::new(DedupConfig {
            near_duplicate_threshold: Some(0.9),
            window: 1,
        })
        .unwrap();
        // `a` has left the window by the time `b` arrives.
        assert_eq!(dedup.apply(&[&a, &filler, &b]).kept.len(), 3);
    }

    #[test]
    fn test_shingles_and_jaccard() {
        let s = shingles("a b c d");
        assert_eq!(s.len(), 2);
        assert_eq!(shingles("one two").len(), 2);
        assert_eq!(jaccard(&HashSet::new(), &HashSet::new()), 0.0);
        assert_eq!(jaccard(&s, &s), 1.0);
    }

    #[test]
    fn test_payload_text_sorted_keys() {
        let p = json!({"z": "Last", "a": "First", "m": {"k": "Mid"}, "n": 3});
        assert_eq!(payload_text(p.as_object().unwrap()), "first mid last");
    }
}
