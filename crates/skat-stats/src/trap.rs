//! Prior/posterior comparisons: traps, stagnation and win-rate thresholds.

use serde::Serialize;
use skat_core::signature::{Signature, TrumpSignature};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::aggregate::{Aggregation, Bucket};

/// A signature that looks strong before the skat and weak after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trap<K> {
    pub signature: K,
    pub prior_mean: f64,
    pub posterior_mean: f64,
    pub prior_count: u64,
    pub posterior_count: u64,
    pub drop: f64,
    /// One-sided p-value that the posterior mean is lower than the prior
    /// mean. `None` when either side has no spread.
    pub p_value: Option<f64>,
}

/// Signatures whose prior mean reaches `threshold` while the mean of hands
/// ending in the same signature falls below it. Both buckets must hold at
/// least `floor` samples. Sorted by drop, largest first.
pub fn detect_traps<K: Ord + Clone>(
    prior: &Aggregation<K>,
    posterior: &Aggregation<K>,
    threshold: f64,
    floor: u64,
) -> Vec<Trap<K>> {
    let mut traps: Vec<Trap<K>> = prior
        .iter()
        .filter_map(|(signature, before)| {
            let after = posterior.get(signature)?;
            if before.count() < floor || after.count() < floor {
                return None;
            }
            if !before.mean_at_least(threshold) || after.mean_at_least(threshold) {
                return None;
            }
            let prior_mean = before.mean()?;
            let posterior_mean = after.mean()?;
            Some(Trap {
                signature: signature.clone(),
                prior_mean,
                posterior_mean,
                prior_count: before.count(),
                posterior_count: after.count(),
                drop: prior_mean - posterior_mean,
                p_value: drop_p_value(before, after),
            })
        })
        .collect();
    traps.sort_by(|a, b| {
        b.drop
            .total_cmp(&a.drop)
            .then_with(|| a.signature.cmp(&b.signature))
    });
    traps
}

fn drop_p_value(before: &Bucket, after: &Bucket) -> Option<f64> {
    let std_error = (before.variance()? / before.count() as f64
        + after.variance()? / after.count() as f64)
        .sqrt();
    if std_error <= 0.0 {
        return None;
    }
    let z = (before.mean()? - after.mean()?) / std_error;
    let normal = Normal::new(0.0, 1.0).ok()?;
    Some((1.0 - normal.cdf(z)).clamp(0.0, 1.0))
}

/// Share of hands whose skat exchange did not improve trump length or safe
/// fulls, with the mean outcome on each side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagnationReport {
    pub records: u64,
    pub stagnant: u64,
    pub stagnant_share: Option<f64>,
    pub stagnant_mean: Option<f64>,
    pub improved_mean: Option<f64>,
}

pub fn is_stagnant(prior: &TrumpSignature, posterior: &TrumpSignature) -> bool {
    posterior.trump_length <= prior.trump_length && posterior.safe_fulls <= prior.safe_fulls
}

/// Splits `(prior, posterior, outcome)` triples into stagnant and improved
/// hands. Invalid outcomes are ignored.
pub fn stagnation(
    pairs: impl IntoIterator<Item = (TrumpSignature, TrumpSignature, f64)>,
) -> StagnationReport {
    let mut stagnant = Bucket::default();
    let mut improved = Bucket::default();
    for (prior, posterior, outcome) in pairs {
        let bucket = if is_stagnant(&prior, &posterior) {
            &mut stagnant
        } else {
            &mut improved
        };
        // Rejections are already logged during ingestion.
        let _ = bucket.push(outcome);
    }
    let records = stagnant.count() + improved.count();
    StagnationReport {
        records,
        stagnant: stagnant.count(),
        stagnant_share: (records > 0).then(|| stagnant.count() as f64 / records as f64),
        stagnant_mean: stagnant.mean(),
        improved_mean: improved.mean(),
    }
}

/// For one `(trump_length, jacks)` group, the fewest safe fulls whose bucket
/// mean reaches the target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdRow {
    pub trump_length: u8,
    pub jacks: u8,
    pub min_safe_fulls: Option<u8>,
    pub mean: Option<f64>,
    pub count: u64,
}

/// Builds the threshold table from trump signatures, skipping buckets below
/// `min_count`. Groups where no bucket reaches `target` report `None`.
pub fn threshold_table(
    aggregation: &Aggregation<Signature>,
    target: f64,
    min_count: u64,
) -> Vec<ThresholdRow> {
    let mut rows: Vec<ThresholdRow> = Vec::new();
    // Keys iterate ascending, so safe fulls rise within each group.
    for (signature, bucket) in aggregation.iter() {
        let Signature::Trump(sig) = signature else {
            continue;
        };
        if bucket.count() < min_count {
            continue;
        }
        let same_group = rows
            .last()
            .is_some_and(|row| row.trump_length == sig.trump_length && row.jacks == sig.jacks);
        if !same_group {
            rows.push(ThresholdRow {
                trump_length: sig.trump_length,
                jacks: sig.jacks,
                min_safe_fulls: None,
                mean: None,
                count: 0,
            });
        }
        let Some(row) = rows.last_mut() else {
            continue;
        };
        if row.min_safe_fulls.is_some() {
            continue;
        }
        if bucket.mean_at_least(target) {
            row.min_safe_fulls = Some(sig.safe_fulls);
            row.mean = bucket.mean();
            row.count = bucket.count();
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;

    fn repeated<K: Clone>(key: K, outcomes: &[(f64, usize)]) -> Vec<(K, f64)> {
        outcomes
            .iter()
            .flat_map(|(outcome, times)| std::iter::repeat_n((key.clone(), *outcome), *times))
            .collect()
    }

    fn trump(trump_length: u8, jacks: u8, safe_fulls: u8) -> TrumpSignature {
        TrumpSignature {
            trump_length,
            jacks,
            safe_fulls,
        }
    }

    #[test]
    fn trap_detected_with_drop() {
        let prior = aggregate(repeated("S", &[(1.0, 70), (0.0, 30)]));
        let posterior = aggregate(repeated("S", &[(1.0, 60), (0.0, 40)]));
        let traps = detect_traps(&prior, &posterior, 0.66, 50);
        assert_eq!(traps.len(), 1);
        assert!((traps[0].drop - 0.10).abs() < 1e-9);
        assert_eq!(traps[0].prior_count, 100);
    }

    #[test]
    fn trap_below_floor_is_excluded() {
        let prior = aggregate(repeated("S", &[(1.0, 7), (0.0, 3)]));
        let posterior = aggregate(repeated("S", &[(1.0, 6), (0.0, 4)]));
        assert!(detect_traps(&prior, &posterior, 0.66, 50).is_empty());
    }

    #[test]
    fn traps_sorted_by_drop() {
        let mut prior = repeated("small", &[(1.0, 7), (0.0, 3)]);
        prior.extend(repeated("large", &[(1.0, 9), (0.0, 1)]));
        let mut posterior = repeated("small", &[(1.0, 6), (0.0, 4)]);
        posterior.extend(repeated("large", &[(1.0, 2), (0.0, 8)]));
        posterior.extend(repeated("orphan", &[(0.0, 10)]));
        let traps = detect_traps(&aggregate(prior), &aggregate(posterior), 0.66, 5);
        let order: Vec<&str> = traps.iter().map(|t| t.signature).collect();
        assert_eq!(order, ["large", "small"]);
    }

    #[test]
    fn posterior_at_threshold_is_not_a_trap() {
        let prior = aggregate(repeated("S", &[(1.0, 3), (0.0, 1)]));
        let posterior = aggregate(repeated("S", &[(0.5, 4)]));
        assert!(detect_traps(&prior, &posterior, 0.5, 1).is_empty());
    }

    #[test]
    fn stagnation_splits_hands() {
        let report = stagnation([
            (trump(5, 2, 1), trump(5, 2, 1), 0.4),
            (trump(5, 2, 1), trump(6, 2, 1), 0.9),
            (trump(6, 2, 2), trump(5, 2, 2), 0.2),
        ]);
        assert_eq!(report.records, 3);
        assert_eq!(report.stagnant, 2);
        assert!((report.stagnant_mean.unwrap_or_default() - 0.3).abs() < 1e-9);
        assert_eq!(report.improved_mean, Some(0.9));
    }

    #[test]
    fn empty_stagnation_has_no_means() {
        let report = stagnation(Vec::new());
        assert_eq!(report.records, 0);
        assert_eq!(report.stagnant_share, None);
    }

    #[test]
    fn threshold_picks_first_safe_fulls_reaching_target() {
        let mut samples = Vec::new();
        samples.extend(repeated(Signature::Trump(trump(5, 2, 0)), &[(0.5, 4)]));
        samples.extend(repeated(Signature::Trump(trump(5, 2, 1)), &[(0.8, 4)]));
        samples.extend(repeated(Signature::Trump(trump(5, 2, 2)), &[(0.9, 4)]));
        samples.extend(repeated(Signature::Trump(trump(4, 1, 3)), &[(0.6, 4)]));
        let table = threshold_table(&aggregate(samples), 0.70, 2);
        assert_eq!(table.len(), 2);
        assert_eq!((table[0].trump_length, table[0].min_safe_fulls), (4, None));
        assert_eq!((table[1].trump_length, table[1].min_safe_fulls), (5, Some(1)));
        assert_eq!(table[1].count, 4);
    }

    #[test]
    fn posterior_at_decimal_threshold_is_not_a_trap() {
        let prior = aggregate(vec![("S", 0.9); 60]);
        let posterior = aggregate(vec![("S", 0.66); 60]);
        assert!(detect_traps(&prior, &posterior, 0.66, 50).is_empty());
    }

    #[test]
    fn prior_at_decimal_threshold_can_be_a_trap() {
        let prior = aggregate(vec![("S", 0.66); 60]);
        let posterior = aggregate(repeated("S", &[(1.0, 30), (0.0, 30)]));
        let traps = detect_traps(&prior, &posterior, 0.66, 50);
        assert_eq!(traps.len(), 1);
        assert!((traps[0].drop - 0.16).abs() < 1e-6);
        assert!(traps[0].p_value.is_some_and(|p| p < 0.05));
    }

    #[test]
    fn trap_p_value_needs_spread() {
        let prior = aggregate(vec![("S", 0.9); 10]);
        let posterior = aggregate(vec![("S", 0.1); 10]);
        let traps = detect_traps(&prior, &posterior, 0.66, 5);
        assert_eq!(traps.len(), 1);
        assert_eq!(traps[0].p_value, None);
    }

    #[test]
    fn threshold_reached_at_decimal_target() {
        let samples = vec![(Signature::Trump(trump(5, 2, 1)), 0.70); 10];
        let table = threshold_table(&aggregate(samples), 0.70, 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].min_safe_fulls, Some(1));
        assert_eq!(table[0].count, 10);
    }
}
