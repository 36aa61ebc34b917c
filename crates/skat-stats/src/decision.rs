//! Expected-value contract choice per signature.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregation;

/// Game-value units won and lost by a contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Payoff {
    pub win: f64,
    pub loss: f64,
}

impl Payoff {
    pub const fn new(win: f64, loss: f64) -> Self {
        Self { win, loss }
    }

    /// `p·win − (1−p)·loss`.
    pub fn expected_value(&self, probability: f64) -> f64 {
        probability * self.win - (1.0 - probability) * self.loss
    }
}

impl From<[f64; 2]> for Payoff {
    fn from([win, loss]: [f64; 2]) -> Self {
        Self::new(win, loss)
    }
}

impl From<Payoff> for [f64; 2] {
    fn from(payoff: Payoff) -> Self {
        [payoff.win, payoff.loss]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub contract: String,
    pub probability: f64,
    pub expected_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Play(Candidate),
    /// No contract has a positive expectation. `best` is the least bad
    /// candidate, if any contract could be evaluated at all.
    NoPositiveExpectation { best: Option<Candidate> },
}

impl Decision {
    pub fn contract(&self) -> Option<&str> {
        match self {
            Decision::Play(candidate) => Some(candidate.contract.as_str()),
            Decision::NoPositiveExpectation { .. } => None,
        }
    }
}

/// Picks the contract with the highest expected value.
///
/// Only contracts present in both `probabilities` and `values` compete.
/// Equal values go to the contract listed first in `priority`; unlisted
/// contracts rank after listed ones, by name.
pub fn decide(
    probabilities: &BTreeMap<String, f64>,
    values: &BTreeMap<String, Payoff>,
    priority: &[String],
) -> Decision {
    let rank = |contract: &str| {
        priority
            .iter()
            .position(|p| p == contract)
            .unwrap_or(priority.len())
    };

    let best = probabilities
        .iter()
        .filter_map(|(contract, probability)| {
            let payoff = values.get(contract)?;
            Some(Candidate {
                contract: contract.clone(),
                probability: *probability,
                expected_value: payoff.expected_value(*probability),
            })
        })
        .min_by(|a, b| {
            b.expected_value
                .total_cmp(&a.expected_value)
                .then_with(|| rank(&a.contract).cmp(&rank(&b.contract)))
                .then_with(|| a.contract.cmp(&b.contract))
        });

    match best {
        Some(candidate) if candidate.expected_value > 0.0 => Decision::Play(candidate),
        best => Decision::NoPositiveExpectation { best },
    }
}

/// One signature of the decision map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRow<K> {
    pub key: K,
    /// Smallest sample count among the joined contracts.
    pub count: u64,
    pub probabilities: BTreeMap<String, f64>,
    pub decision: Decision,
}

/// Joins per-contract aggregations on their shared keys and decides each.
/// Keys missing from any contract, or below `min_count` in any contract,
/// are left out.
pub fn decision_map<K: Ord + Clone>(
    by_contract: &BTreeMap<String, Aggregation<K>>,
    values: &BTreeMap<String, Payoff>,
    priority: &[String],
    min_count: u64,
) -> Vec<DecisionRow<K>> {
    let Some((_, first)) = by_contract.iter().next() else {
        return Vec::new();
    };

    first
        .keys()
        .filter_map(|key| {
            let mut probabilities = BTreeMap::new();
            let mut count = u64::MAX;
            for (contract, aggregation) in by_contract {
                let bucket = aggregation.get(key)?;
                if bucket.count() < min_count {
                    return None;
                }
                probabilities.insert(contract.clone(), bucket.mean()?);
                count = count.min(bucket.count());
            }
            let decision = decide(&probabilities, values, priority);
            Some(DecisionRow {
                key: key.clone(),
                count,
                probabilities,
                decision,
            })
        })
        .collect()
}

/// How often each contract wins the map, in descending order.
pub fn recommendation_counts<K>(rows: &[DecisionRow<K>]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in rows {
        let label = row.decision.contract().unwrap_or("pass").to_string();
        *counts.entry(label).or_default() += 1;
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| match b.1.cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;

    fn map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn even_values() -> BTreeMap<String, Payoff> {
        BTreeMap::from([
            ("A".to_string(), Payoff::new(1.0, 1.0)),
            ("B".to_string(), Payoff::new(1.0, 1.0)),
        ])
    }

    #[test]
    fn highest_expected_value_wins() {
        let decision = decide(&map(&[("A", 0.7), ("B", 0.5)]), &even_values(), &[]);
        let Decision::Play(candidate) = decision else {
            panic!("expected a positive decision");
        };
        assert_eq!(candidate.contract, "A");
        assert!((candidate.expected_value - 0.4).abs() < 1e-12);
    }

    #[test]
    fn ties_follow_priority_then_name() {
        let probs = map(&[("A", 0.6), ("B", 0.6)]);
        let priority = vec!["B".to_string()];
        assert_eq!(decide(&probs, &even_values(), &priority).contract(), Some("B"));
        assert_eq!(decide(&probs, &even_values(), &[]).contract(), Some("A"));
    }

    #[test]
    fn non_positive_maximum_is_a_sentinel() {
        let decision = decide(&map(&[("A", 0.5), ("B", 0.3)]), &even_values(), &[]);
        match decision {
            Decision::NoPositiveExpectation { best: Some(best) } => {
                assert_eq!(best.contract, "A");
                assert_eq!(best.expected_value, 0.0);
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn contracts_without_values_are_ignored() {
        let decision = decide(&map(&[("Z", 0.99)]), &even_values(), &[]);
        assert_eq!(decision, Decision::NoPositiveExpectation { best: None });
    }

    #[test]
    fn research_value_table_boundaries() {
        let pickup = Payoff::new(1.0, 2.0);
        let suit_hand = Payoff::new(1.0, 1.0);
        let grand_hand = Payoff::new(1.33, 1.33);
        assert!((pickup.expected_value(0.8) - (3.0 * 0.8 - 2.0)).abs() < 1e-12);
        assert!((suit_hand.expected_value(0.8) - (2.0 * 0.8 - 1.0)).abs() < 1e-12);
        assert!((grand_hand.expected_value(0.8) - (2.66 * 0.8 - 1.33)).abs() < 1e-12);
    }

    #[test]
    fn pickup_beats_break_even_grand() {
        let values = BTreeMap::from([
            ("A".to_string(), Payoff::new(1.0, 2.0)),
            ("B".to_string(), Payoff::new(1.333, 1.333)),
        ]);
        let probs = map(&[("A", 0.8), ("B", 0.5)]);
        let Decision::Play(candidate) = decide(&probs, &values, &[]) else {
            panic!("expected a positive decision");
        };
        assert_eq!(candidate.contract, "A");
        assert!((candidate.expected_value - 0.4).abs() < 1e-12);
        let grand_ev = values["B"].expected_value(0.5);
        assert_eq!(grand_ev, 0.0);
        assert!(grand_ev <= 0.0);
    }

    #[test]
    fn payoff_reads_win_loss_pairs() {
        let payoff: Payoff = serde_json::from_str("[1.0, 2.0]").expect("pair");
        assert_eq!(payoff, Payoff::new(1.0, 2.0));
    }

    #[test]
    fn decision_map_joins_on_shared_keys() {
        let by_contract = BTreeMap::from([
            (
                "A".to_string(),
                aggregate([(1u8, 0.9), (1, 0.9), (2, 0.2), (2, 0.2), (3, 0.5), (3, 0.5)]),
            ),
            (
                "B".to_string(),
                aggregate([(1u8, 0.5), (1, 0.5), (2, 0.8), (2, 0.8), (3, 0.5)]),
            ),
        ]);
        let rows = decision_map(&by_contract, &even_values(), &[], 2);
        let keys: Vec<u8> = rows.iter().map(|row| row.key).collect();
        assert_eq!(keys, [1, 2]);
        assert_eq!(rows[0].decision.contract(), Some("A"));
        assert_eq!(rows[1].decision.contract(), Some("B"));
        assert_eq!(
            recommendation_counts(&rows),
            [("A".to_string(), 1), ("B".to_string(), 1)]
        );
    }
}
