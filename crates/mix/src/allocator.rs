//! Largest-remainder allocation of integer counts.
//!
//! Used twice: to turn mix ratios into per-source counts, and to turn split
//! ratios into per-source train/validation/test counts.

use corpus_core::{Error, MixSpec, Result, SourceId};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Distance to an integer below which a product is treated as exact.
const SNAP_EPSILON: f64 = 1e-9;

/// Split `total` into integer parts proportional to `weights`.
///
/// Weights are renormalized by their sum. Each part gets `floor(w * total)`;
/// leftover units go one at a time to the largest fractional remainders,
/// ties going to the earlier weight. The result always sums to `total`
/// and each part is within 1 of its ideal.
pub fn largest_remainder(weights: &[f64], total: usize) -> Vec<usize> {
    let sum: f64 = weights.iter().sum();
    if weights.is_empty() || !(sum > 0.0) {
        return vec![0; weights.len()];
    }

    let ideals: Vec<f64> = weights
        .iter()
        .map(|w| snap(w / sum * total as f64))
        .collect();
    let mut counts: Vec<usize> = ideals.iter().map(|x| x.floor() as usize).collect();

    // Floored parts can overshoot `usize` when `total as f64` rounds up.
    let assigned: u128 = counts.iter().map(|&c| c as u128).sum();
    let remainder = (total as u128)
        .saturating_sub(assigned)
        .min(weights.len() as u128) as usize;

    let mut order: Vec<usize> = (0..weights.len()).collect();
    // Stable sort keeps declaration order among equal remainders.
    order.sort_by_key(|&i| Reverse(OrderedFloat(ideals[i] - ideals[i].floor())));
    for &i in order.iter().take(remainder) {
        counts[i] += 1;
    }
    counts
}

fn snap(x: f64) -> f64 {
    let rounded = x.round();
    if (x - rounded).abs() < SNAP_EPSILON {
        rounded
    } else {
        x
    }
}

/// Count drawn from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Source id.
    pub source_id: SourceId,
    /// Mix ratio of the source.
    pub ratio: f64,
    /// Exact share `ratio * total`.
    pub ideal: f64,
    /// Integer count.
    pub count: usize,
}

/// Turns a [`MixSpec`] into per-source counts.
pub struct MixAllocator;

impl MixAllocator {
    /// Allocate `spec.total_size` across sources.
    ///
    /// `available` holds each source's pool size; missing sources count as
    /// empty. Fails if any source is asked for more than it has.
    pub fn allocate(spec: &MixSpec, available: &BTreeMap<SourceId, usize>) -> Result<Vec<Allocation>> {
        spec.validate()?;

        let ratios: Vec<f64> = spec.sources.iter().map(|s| s.ratio).collect();
        let counts = largest_remainder(&ratios, spec.total_size);

        let allocations: Vec<Allocation> = spec
            .sources
            .iter()
            .zip(counts)
            .map(|(source, count)| Allocation {
                source_id: source.source_id.clone(),
                ratio: source.ratio,
                ideal: source.ratio * spec.total_size as f64,
                count,
            })
            .collect();

        for allocation in &allocations {
            let pool = available.get(&allocation.source_id).copied().unwrap_or(0);
            if allocation.count > pool {
                return Err(Error::insufficient_data(
                    allocation.source_id.clone(),
                    allocation.count,
                    pool,
                ));
            }
        }

        Ok(allocations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_core::{SourceMix, SplitRatios};

    fn spec(ratios: &[f64], total: usize) -> MixSpec {
        MixSpec {
            version: "test".to_string(),
            sources: ratios
                .iter()
                .enumerate()
                .map(|(i, r)| SourceMix::new(format!("s{i}"), *r, 0.0))
                .collect(),
            total_size: total,
            split: SplitRatios::new(0.8, 0.1, 0.1),
            seed: 0,
        }
    }

    fn plenty(n: usize) -> BTreeMap<SourceId, usize> {
        (0..n).map(|i| (format!("s{i}"), usize::MAX)).collect()
    }

    fn assert_consistent(allocations: &[Allocation], total: usize) {
        let sum: usize = allocations.iter().map(|a| a.count).sum();
        assert_eq!(sum, total);
        for a in allocations {
            assert!((a.count as f64 - a.ideal).abs() < 1.0, "{a:?}");
        }
    }

    #[test]
    fn test_documented_mixes_differ() {
        for total in [1, 7, 100, 997, 3_001, 52_000] {
            let a = MixAllocator::allocate(&spec(&[0.85, 0.10, 0.05], total), &plenty(3)).unwrap();
            let b = MixAllocator::allocate(&spec(&[0.90, 0.07, 0.03], total), &plenty(3)).unwrap();
            assert_consistent(&a, total);
            assert_consistent(&b, total);
            if total >= 100 {
                assert_ne!(
                    a.iter().map(|x| x.count).collect::<Vec<_>>(),
                    b.iter().map(|x| x.count).collect::<Vec<_>>()
                );
            }
        }

        let a = MixAllocator::allocate(&spec(&[0.85, 0.10, 0.05], 100), &plenty(3)).unwrap();
        assert_eq!(a.iter().map(|x| x.count).collect::<Vec<_>>(), vec![85, 10, 5]);
        let b = MixAllocator::allocate(&spec(&[0.90, 0.07, 0.03], 100), &plenty(3)).unwrap();
        assert_eq!(b.iter().map(|x| x.count).collect::<Vec<_>>(), vec![90, 7, 3]);
    }

    #[test]
    fn test_remainder_to_largest_fraction() {
        assert_eq!(largest_remainder(&[0.5, 0.3, 0.2], 12), vec![6, 4, 2]);
    }

    #[test]
    fn test_ties_go_to_first_declared() {
        assert_eq!(largest_remainder(&[0.5, 0.5], 3), vec![2, 1]);
        assert_eq!(largest_remainder(&[1.0 / 3.0; 3], 4), vec![2, 1, 1]);
    }

    #[test]
    fn test_drifted_ratios_never_over_allocate() {
        let counts = largest_remainder(&[0.3333334, 0.3333334, 0.3333334], 9);
        assert_eq!(counts.iter().sum::<usize>(), 9);
        assert_eq!(counts, vec![3, 3, 3]);
    }

    #[test]
    fn test_huge_total_does_not_overflow() {
        let counts = largest_remainder(&[0.5, 0.5], usize::MAX);
        assert_eq!(counts.len(), 2);

        let mut available = BTreeMap::new();
        available.insert("s0".to_string(), 10);
        available.insert("s1".to_string(), 10);
        let err = MixAllocator::allocate(&spec(&[0.5, 0.5], usize::MAX), &available).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_total() {
        assert_eq!(largest_remainder(&[0.7, 0.3], 0), vec![0, 0]);
    }

    #[test]
    fn test_insufficient_data() {
        let mut available = plenty(3);
        available.insert("s1".to_string(), 3);
        let err = MixAllocator::allocate(&spec(&[0.5, 0.3, 0.2], 12), &available).unwrap_err();
        match err {
            Error::InsufficientData {
                source_id,
                requested,
                available,
            } => {
                assert_eq!(source_id, "s1");
                assert_eq!(requested, 4);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_pool_counts_as_empty() {
        let err = MixAllocator::allocate(&spec(&[1.0], 1), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { available: 0, .. }));
    }
}
