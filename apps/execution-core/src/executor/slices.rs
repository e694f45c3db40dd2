//! Slice planning and per-plan slice bookkeeping.
//!
//! Quantities are split evenly with the rounding remainder folded into the
//! last slice, so the slice quantities always sum exactly to the parent
//! quantity. Slice groups are tracked per plan and must be removed when the
//! plan finishes, successfully or not.

use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::SlicingParams;

/// Progress of one sliced execution.
#[derive(Debug, Clone)]
pub struct SliceGroup {
    /// Planned slice quantities, in execution order.
    pub quantities: Vec<Decimal>,
    /// Indices of slices that reached a terminal state.
    pub completed: usize,
    /// Child order ids, filled in as slices are submitted.
    pub child_ids: Vec<String>,
}

impl SliceGroup {
    /// Whether every slice has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.completed >= self.quantities.len()
    }
}

/// Tracks in-flight slice groups keyed by plan id.
#[derive(Debug, Default)]
pub struct OrderSliceManager {
    groups: RwLock<HashMap<String, SliceGroup>>,
}

impl OrderSliceManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a quantity per the slicing parameters. The remainder from even
    /// division lands on the last slice; every slice quantity is positive and
    /// the slice quantities sum exactly to `quantity`.
    #[must_use]
    pub fn compute_slices(params: &SlicingParams, quantity: Decimal) -> Vec<Decimal> {
        let slices = params.slices.max(1);
        if slices == 1 {
            return vec![quantity];
        }
        // Floor at 8 dp so the remainder on the last slice stays positive.
        let per_slice = (quantity / Decimal::from(slices))
            .round_dp_with_strategy(8, RoundingStrategy::ToZero);
        if per_slice <= Decimal::ZERO {
            return vec![quantity];
        }
        let mut out = vec![per_slice; slices as usize - 1];
        let remainder = quantity - per_slice * Decimal::from(slices - 1);
        out.push(remainder);
        out
    }

    /// Register a new slice group for a plan.
    pub fn register(&self, plan_id: &str, quantities: Vec<Decimal>) {
        if let Ok(mut groups) = self.groups.write() {
            groups.insert(
                plan_id.to_string(),
                SliceGroup {
                    quantities,
                    completed: 0,
                    child_ids: Vec::new(),
                },
            );
        }
    }

    /// Record a submitted child order for a plan's group.
    pub fn record_child(&self, plan_id: &str, order_id: &str) {
        if let Ok(mut groups) = self.groups.write()
            && let Some(group) = groups.get_mut(plan_id)
        {
            group.child_ids.push(order_id.to_string());
        }
    }

    /// Mark one slice of a plan finished.
    pub fn complete_slice(&self, plan_id: &str) {
        if let Ok(mut groups) = self.groups.write()
            && let Some(group) = groups.get_mut(plan_id)
        {
            group.completed += 1;
        }
    }

    /// Snapshot of a plan's group.
    #[must_use]
    pub fn group(&self, plan_id: &str) -> Option<SliceGroup> {
        self.groups
            .read()
            .ok()
            .and_then(|g| g.get(plan_id).cloned())
    }

    /// Remove a plan's group. Callers must invoke this on every exit path of
    /// a sliced execution; a leftover group is a leak.
    pub fn remove(&self, plan_id: &str) -> Option<SliceGroup> {
        self.groups.write().ok().and_then(|mut g| g.remove(plan_id))
    }

    /// Number of tracked groups.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.groups.read().map(|g| g.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn params(slices: u32) -> SlicingParams {
        SlicingParams {
            slices,
            interval_ms: 1_000,
            min_slice_qty: Decimal::ZERO,
            max_slice_qty: Decimal::MAX,
        }
    }

    #[test]
    fn remainder_goes_to_last_slice() {
        let slices = OrderSliceManager::compute_slices(&params(3), dec!(10));
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0], slices[1]);
        assert_eq!(slices.iter().sum::<Decimal>(), dec!(10));
    }

    #[test]
    fn single_slice_keeps_full_quantity() {
        let slices = OrderSliceManager::compute_slices(&params(1), dec!(7.5));
        assert_eq!(slices, vec![dec!(7.5)]);
    }

    #[test]
    fn tiny_quantity_collapses_to_one_slice() {
        let slices = OrderSliceManager::compute_slices(&params(50), dec!(0.000000001));
        assert_eq!(slices.iter().sum::<Decimal>(), dec!(0.000000001));
    }

    #[test]
    fn group_lifecycle() {
        let mgr = OrderSliceManager::new();
        mgr.register("p1", vec![dec!(5), dec!(5)]);
        mgr.record_child("p1", "o1");
        mgr.complete_slice("p1");
        assert!(!mgr.group("p1").unwrap().is_done());
        mgr.complete_slice("p1");
        assert!(mgr.group("p1").unwrap().is_done());
        mgr.remove("p1");
        assert_eq!(mgr.tracked(), 0);
    }

    proptest! {
        #[test]
        fn slice_quantities_sum_to_total(
            qty in 1u64..10_000_000,
            scale in 0u32..6,
            slices in 1u32..64,
        ) {
            let quantity = Decimal::new(qty as i64, scale);
            let out = OrderSliceManager::compute_slices(&params(slices), quantity);
            prop_assert_eq!(out.iter().sum::<Decimal>(), quantity);
            prop_assert!(out.iter().all(|q| *q > Decimal::ZERO));
        }
    }
}
