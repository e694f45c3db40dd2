//! Signal conflict resolution.
//!
//! Merges or ranks overlapping strategy signals into one actionable primary
//! signal. Signals are grouped per symbol; opposing-direction groups resolve
//! by priority then confidence, same-direction groups merge when their
//! confidences are close enough, and everything demoted is reported as a
//! conflict with a reason.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::StrategySignal;

/// Maximum pairwise confidence spread (points) for same-direction merging.
const MERGE_CONFIDENCE_SPREAD: f64 = 20.0;

/// How a set of signals was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Same-direction signals merged into one.
    Merge,
    /// Opposing or competing signals resolved by rank.
    Priority,
    /// Nothing actionable.
    Cancel,
    /// Same-direction signals too far apart to merge; best kept, rest deferred.
    Defer,
}

/// A demoted signal with the reason it lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConflict {
    /// The demoted signal.
    pub signal: StrategySignal,
    /// Why it was demoted.
    pub reason: String,
}

/// Outcome of conflict resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResolution {
    /// The winning signal, `None` when resolution is `Cancel`.
    pub primary: Option<StrategySignal>,
    /// Every demoted signal with its reason.
    pub conflicts: Vec<SignalConflict>,
    /// How the set was resolved.
    pub resolution: ConflictResolution,
}

/// Stateless conflict resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalConflictResolver;

impl SignalConflictResolver {
    /// Resolve a set of possibly overlapping signals.
    #[must_use]
    pub fn resolve(&self, signals: &[StrategySignal]) -> SignalResolution {
        if signals.is_empty() {
            return SignalResolution {
                primary: None,
                conflicts: vec![],
                resolution: ConflictResolution::Cancel,
            };
        }

        let mut groups: BTreeMap<String, Vec<StrategySignal>> = BTreeMap::new();
        for signal in signals {
            groups
                .entry(signal.symbol.clone())
                .or_default()
                .push(signal.clone());
        }

        let mut winners: Vec<(StrategySignal, ConflictResolution)> = Vec::new();
        let mut conflicts: Vec<SignalConflict> = Vec::new();

        for group in groups.into_values() {
            let outcome = Self::resolve_group(group);
            winners.push((outcome.winner, outcome.resolution));
            conflicts.extend(outcome.demoted);
        }

        // Symbol groups compete on the same rank rules as opposing signals.
        winners.sort_by(|a, b| {
            b.0.priority
                .rank()
                .cmp(&a.0.priority.rank())
                .then(b.0.confidence.total_cmp(&a.0.confidence))
        });
        let (primary, resolution) = winners.remove(0);
        for (loser, _) in winners {
            conflicts.push(SignalConflict {
                signal: loser,
                reason: "competing symbol, lower priority/confidence".to_string(),
            });
        }

        SignalResolution {
            primary: Some(primary),
            conflicts,
            resolution,
        }
    }

    fn resolve_group(mut group: Vec<StrategySignal>) -> GroupOutcome {
        if group.len() == 1 {
            return GroupOutcome {
                winner: group.remove(0),
                demoted: vec![],
                resolution: ConflictResolution::Priority,
            };
        }

        let opposing = group
            .iter()
            .any(|s| s.action.opposes(&group[0].action));
        if opposing {
            group.sort_by(|a, b| {
                b.priority
                    .rank()
                    .cmp(&a.priority.rank())
                    .then(b.confidence.total_cmp(&a.confidence))
            });
            let winner = group.remove(0);
            let demoted = group
                .into_iter()
                .map(|signal| SignalConflict {
                    signal,
                    reason: "opposing signal, lower priority/confidence".to_string(),
                })
                .collect();
            return GroupOutcome {
                winner,
                demoted,
                resolution: ConflictResolution::Priority,
            };
        }

        // Same direction: merge when all share the kind and confidences sit
        // within the merge spread.
        let same_kind = group.iter().all(|s| s.kind == group[0].kind);
        let max_conf = group.iter().map(|s| s.confidence).fold(f64::MIN, f64::max);
        let min_conf = group.iter().map(|s| s.confidence).fold(f64::MAX, f64::min);

        if same_kind && (max_conf - min_conf) <= MERGE_CONFIDENCE_SPREAD {
            let winner = Self::merge(&group);
            return GroupOutcome {
                winner,
                demoted: vec![],
                resolution: ConflictResolution::Merge,
            };
        }

        group.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let winner = group.remove(0);
        let demoted = group
            .into_iter()
            .map(|signal| SignalConflict {
                signal,
                reason: "confidence spread exceeds merge threshold".to_string(),
            })
            .collect();
        GroupOutcome {
            winner,
            demoted,
            resolution: ConflictResolution::Defer,
        }
    }

    /// Merge same-direction signals: confidence-weighted average quantity,
    /// capped mean confidence. The merged signal inherits identity from the
    /// most confident member.
    fn merge(group: &[StrategySignal]) -> StrategySignal {
        let mut weighted_qty = Decimal::ZERO;
        let mut total_weight = Decimal::ZERO;
        let mut confidence_sum = 0.0;
        let mut best = &group[0];

        for signal in group {
            let weight = Decimal::from_f64(signal.confidence).unwrap_or(Decimal::ONE);
            weighted_qty += signal.quantity * weight;
            total_weight += weight;
            confidence_sum += signal.confidence;
            if signal.confidence > best.confidence {
                best = signal;
            }
        }

        let quantity = if total_weight.is_zero() {
            best.quantity
        } else {
            weighted_qty / total_weight
        };
        let confidence = (confidence_sum / group.len() as f64).min(100.0);

        StrategySignal {
            quantity,
            confidence,
            ..best.clone()
        }
    }
}

struct GroupOutcome {
    winner: StrategySignal,
    demoted: Vec<SignalConflict>,
    resolution: ConflictResolution,
}
