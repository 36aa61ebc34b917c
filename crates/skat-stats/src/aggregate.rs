//! Count and mean win rate per signature.
//!
//! Outcomes are accumulated as exact integers in 32-bit fixed point, so the
//! result of an aggregation does not depend on record order or on how the
//! records were split across threads.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const FIXED_ONE: f64 = 4_294_967_296.0; // 2^32
const CONFIDENCE_Z: f64 = 1.96; // 95% CI

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("outcome {0} is not a probability in [0, 1]")]
pub struct OutcomeError(pub f64);

/// Count, sum and sum of squares of the outcomes that share one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Bucket {
    count: u64,
    sum: u128,
    sum_sq: u128,
}

impl Bucket {
    pub fn push(&mut self, outcome: f64) -> Result<(), OutcomeError> {
        if !outcome.is_finite() || !(0.0..=1.0).contains(&outcome) {
            return Err(OutcomeError(outcome));
        }
        let fixed = (outcome * FIXED_ONE).round() as u128;
        self.count += 1;
        self.sum += fixed;
        self.sum_sq += fixed * fixed;
        Ok(())
    }

    pub fn merge(&mut self, other: &Bucket) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean of the outcomes; `None` for an empty bucket.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum as f64 / (FIXED_ONE * self.count as f64))
    }

    /// Whether the mean reaches `threshold`. The threshold is rounded to the
    /// fixed point the outcomes were stored in and compared as integers, so a
    /// bucket of outcomes equal to `threshold` always reaches it.
    pub fn mean_at_least(&self, threshold: f64) -> bool {
        if self.count == 0 || threshold.is_nan() || threshold > 1.0 {
            return false;
        }
        if threshold <= 0.0 {
            return true;
        }
        let fixed = (threshold * FIXED_ONE).round() as u128;
        self.sum >= fixed * u128::from(self.count)
    }

    /// Sample variance of the outcomes; `None` below two samples. Identical
    /// outcomes give exactly zero.
    pub fn variance(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        let n = u128::from(self.count);
        let spread = n
            .checked_mul(self.sum_sq)?
            .saturating_sub(self.sum.checked_mul(self.sum)?);
        let scale = FIXED_ONE * FIXED_ONE * (n * (n - 1)) as f64;
        Some(spread as f64 / scale)
    }

    /// Normal-approximation 95% interval on the mean.
    pub fn confidence_interval(&self) -> Option<(f64, f64)> {
        let mean = self.mean()?;
        let Some(variance) = self.variance() else {
            return Some((mean, mean));
        };
        let margin = CONFIDENCE_Z * (variance / self.count as f64).sqrt();
        Some((mean - margin, mean + margin))
    }
}

/// Buckets keyed by signature. Keys iterate in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation<K: Ord> {
    buckets: BTreeMap<K, Bucket>,
    rejected: u64,
}

impl<K: Ord> Default for Aggregation<K> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            rejected: 0,
        }
    }
}

impl<K: Ord> Aggregation<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one outcome. Invalid outcomes are counted as rejected and leave
    /// the buckets untouched.
    pub fn push(&mut self, key: K, outcome: f64) -> Result<(), OutcomeError> {
        let mut sample = Bucket::default();
        if let Err(err) = sample.push(outcome) {
            self.rejected += 1;
            return Err(err);
        }
        self.buckets.entry(key).or_default().merge(&sample);
        Ok(())
    }

    pub fn merge(mut self, other: Aggregation<K>) -> Self {
        self.rejected += other.rejected;
        for (key, bucket) in other.buckets {
            self.buckets.entry(key).or_default().merge(&bucket);
        }
        self
    }

    pub fn get(&self, key: &K) -> Option<&Bucket> {
        self.buckets.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Bucket)> {
        self.buckets.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.buckets.keys()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of outcomes that were refused as malformed.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn total_count(&self) -> u64 {
        self.buckets.values().map(Bucket::count).sum()
    }
}

impl<K: Ord + Clone> Aggregation<K> {
    /// Buckets holding at least `min_count` samples.
    pub fn significant(&self, min_count: u64) -> Aggregation<K> {
        Aggregation {
            buckets: self
                .buckets
                .iter()
                .filter(|(_, bucket)| bucket.count >= min_count)
                .map(|(key, bucket)| (key.clone(), *bucket))
                .collect(),
            rejected: self.rejected,
        }
    }

    /// Report rows ordered by `sort`. Ties fall back to key order.
    pub fn ranked(&self, sort: SortKey) -> Vec<BucketRow<K>> {
        let mut rows: Vec<BucketRow<K>> = self
            .buckets
            .iter()
            .filter_map(|(key, bucket)| BucketRow::new(key.clone(), bucket))
            .collect();
        rows.sort_by(|a, b| match sort {
            SortKey::Count => b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)),
            SortKey::Mean => b
                .mean
                .total_cmp(&a.mean)
                .then_with(|| a.key.cmp(&b.key)),
            SortKey::Key => a.key.cmp(&b.key),
        });
        rows
    }
}

impl<K: Ord> FromIterator<(K, f64)> for Aggregation<K> {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        aggregate(iter)
    }
}

/// Aggregates `(key, outcome)` pairs. Outcomes outside [0, 1] are skipped,
/// counted in [`Aggregation::rejected`] and logged.
pub fn aggregate<K: Ord>(records: impl IntoIterator<Item = (K, f64)>) -> Aggregation<K> {
    let mut aggregation = Aggregation::new();
    for (key, outcome) in records {
        if let Err(err) = aggregation.push(key, outcome) {
            warn!(target: "skat_stats::aggregate", reason = %err, "outcome rejected");
        }
    }
    aggregation
}

/// Parallel form of [`aggregate`]: `extract` maps each item to an optional
/// `(key, outcome)` pair and per-thread buckets are merged at the end.
pub fn aggregate_parallel<T, K, F>(items: &[T], extract: F) -> Aggregation<K>
where
    T: Sync,
    K: Ord + Send,
    F: Fn(&T) -> Option<(K, f64)> + Sync,
{
    items
        .par_iter()
        .fold(Aggregation::new, |mut acc, item| {
            if let Some((key, outcome)) = extract(item) {
                if let Err(err) = acc.push(key, outcome) {
                    warn!(target: "skat_stats::aggregate", reason = %err, "outcome rejected");
                }
            }
            acc
        })
        .reduce(Aggregation::new, Aggregation::merge)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Count,
    #[default]
    Mean,
    Key,
}

/// One line of a ranked report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketRow<K> {
    pub key: K,
    pub count: u64,
    pub mean: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

impl<K> BucketRow<K> {
    fn new(key: K, bucket: &Bucket) -> Option<Self> {
        let mean = bucket.mean()?;
        let (ci_low, ci_high) = bucket.confidence_interval()?;
        Some(Self {
            key,
            count: bucket.count,
            mean,
            ci_low,
            ci_high,
        })
    }
}
