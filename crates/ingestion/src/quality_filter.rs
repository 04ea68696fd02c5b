//! Threshold filter on record quality.

use corpus_core::config::validate_threshold;
use corpus_core::{RawRecord, Result, SourceId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts from one filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    /// Records that passed.
    pub kept: usize,
    /// Rejections per source.
    pub rejected_by_source: BTreeMap<SourceId, usize>,
}

impl FilterReport {
    /// Total rejections.
    pub fn total_rejected(&self) -> usize {
        self.rejected_by_source.values().sum()
    }

    /// Rejections for one source.
    pub fn rejected_for(&self, source_id: &str) -> usize {
        self.rejected_by_source.get(source_id).copied().unwrap_or(0)
    }
}

/// Records that passed plus the report.
#[derive(Debug)]
pub struct FilterOutcome<'a> {
    /// Kept records, in input order.
    pub kept: Vec<&'a RawRecord>,
    /// Counts.
    pub report: FilterReport,
}

/// Keeps records whose quality is at or above a threshold.
#[derive(Debug, Clone, Copy)]
pub struct QualityFilter {
    threshold: f64,
}

impl QualityFilter {
    /// Create a filter. The threshold must lie in `[0, 1]`.
    pub fn new(threshold: f64) -> Result<Self> {
        validate_threshold(threshold)?;
        Ok(Self { threshold })
    }

    /// Threshold in use.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether a single record passes.
    #[inline]
    pub fn accepts(&self, record: &RawRecord) -> bool {
        record.quality.meets(self.threshold)
    }

    /// Filter records, preserving order.
    pub fn apply<'a, I>(&self, records: I) -> FilterOutcome<'a>
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        let mut kept = Vec::new();
        let mut report = FilterReport::default();
        for record in records {
            if self.accepts(record) {
                kept.push(record);
            } else {
                *report
                    .rejected_by_source
                    .entry(record.source_id.clone())
                    .or_insert(0) += 1;
            }
        }
        report.kept = kept.len();
        FilterOutcome { kept, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_core::QualityScore;
    use serde_json::json;

    fn record(source: &str, index: usize, quality: f64) -> RawRecord {
        RawRecord::new(
            source,
            index,
            json!({"i": index}).as_object().cloned().unwrap(),
            QualityScore::new(quality).unwrap(),
        )
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let records = vec![record("a", 0, 0.5), record("a", 1, 0.49), record("b", 2, 0.9)];
        let outcome = QualityFilter::new(0.5).unwrap().apply(&records);
        assert_eq!(outcome.kept.len(), 2);
        assert_eq!(outcome.kept[0].index, 0);
        assert_eq!(outcome.report.rejected_for("a"), 1);
        assert_eq!(outcome.report.rejected_for("b"), 0);
        assert_eq!(outcome.report.total_rejected(), 1);
    }

    #[test]
    fn test_zero_threshold_keeps_everything() {
        let records = vec![record("a", 0, 0.0), record("a", 1, 1.0)];
        let outcome = QualityFilter::new(0.0).unwrap().apply(&records);
        assert_eq!(outcome.report.kept, 2);
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(QualityFilter::new(1.01).is_err());
        assert!(QualityFilter::new(-0.5).is_err());
    }
}
