//! Order execution state.
//!
//! Active orders live in one map, terminal orders in another. An order moves
//! between them exactly once, under a single write lock, when a terminal
//! status is applied.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::models::{Order, OrderStatus, is_valid_transition};

/// In-memory store of active and historical orders.
#[derive(Debug, Default)]
pub struct OrderStore {
    active: RwLock<HashMap<String, Order>>,
    history: RwLock<HashMap<String, Order>>,
}

impl OrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new active order.
    pub fn insert(&self, order: Order) {
        if let Ok(mut active) = self.active.write() {
            active.insert(order.id.clone(), order);
        }
    }

    /// Look up an order by id, active first, then history.
    #[must_use]
    pub fn get(&self, order_id: &str) -> Option<Order> {
        if let Some(order) = self
            .active
            .read()
            .ok()
            .and_then(|a| a.get(order_id).cloned())
        {
            return Some(order);
        }
        self.history
            .read()
            .ok()
            .and_then(|h| h.get(order_id).cloned())
    }

    /// Transition an active order to a new status. Invalid transitions are
    /// ignored with a warning. A terminal status moves the order to history
    /// under the same write lock, so the move happens exactly once even under
    /// concurrent callers.
    pub fn transition(&self, order_id: &str, status: OrderStatus) -> Option<Order> {
        let Ok(mut active) = self.active.write() else {
            return None;
        };
        let order = active.get_mut(order_id)?;
        if !is_valid_transition(order.status, status) {
            tracing::warn!(
                order_id = %order_id,
                from = %order.status,
                to = %status,
                "invalid order status transition ignored"
            );
            return Some(order.clone());
        }
        order.status = status;
        order.updated_at = Utc::now();

        if status.is_terminal() {
            let finished = active.remove(order_id)?;
            drop(active);
            if let Ok(mut history) = self.history.write() {
                history.insert(finished.id.clone(), finished.clone());
            }
            return Some(finished);
        }
        Some(order.clone())
    }

    /// Apply a mutation to an active order in place.
    pub fn update<F>(&self, order_id: &str, f: F) -> Option<Order>
    where
        F: FnOnce(&mut Order),
    {
        let mut active = self.active.write().ok()?;
        let order = active.get_mut(order_id)?;
        f(order);
        order.updated_at = Utc::now();
        Some(order.clone())
    }

    /// Snapshot of all active orders.
    #[must_use]
    pub fn active_orders(&self) -> Vec<Order> {
        self.active
            .read()
            .map(|a| a.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids of active orders older than the given age in milliseconds.
    #[must_use]
    pub fn active_older_than(&self, max_age_ms: u64) -> Vec<String> {
        let now = Utc::now();
        self.active
            .read()
            .map(|a| {
                a.values()
                    .filter(|o| o.age_ms(now) > max_age_ms as i64)
                    .map(|o| o.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of active orders.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Number of historical orders.
    #[must_use]
    pub fn history_count(&self) -> usize {
        self.history.read().map(|h| h.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, OrderSpec, OrderType, TimeInForce};
    use rust_decimal_macros::dec;

    fn order(id: &str) -> Order {
        Order::new(
            id.to_string(),
            "plan_1".to_string(),
            OrderSpec {
                symbol: "BTC-USD".to_string(),
                side: OrderSide::Buy,
                order_type: OrderType::Market,
                quantity: dec!(10),
                limit_price: None,
                time_in_force: TimeInForce::Gtc,
            },
        )
    }

    #[test]
    fn terminal_transition_moves_to_history_once() {
        let store = OrderStore::new();
        store.insert(order("o1"));
        store.transition("o1", OrderStatus::Submitted);
        let finished = store.transition("o1", OrderStatus::Filled).unwrap();

        assert_eq!(finished.status, OrderStatus::Filled);
        assert_eq!(store.active_count(), 0);
        assert_eq!(store.history_count(), 1);
        // A second terminal transition finds nothing active.
        assert!(store.transition("o1", OrderStatus::Cancelled).is_none());
        assert_eq!(store.get("o1").unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn invalid_transition_is_ignored() {
        let store = OrderStore::new();
        store.insert(order("o1"));
        store.transition("o1", OrderStatus::Submitted);
        store.transition("o1", OrderStatus::Filled);

        // Filled is terminal and already in history.
        assert_eq!(store.get("o1").unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn pending_to_filled_is_rejected() {
        let store = OrderStore::new();
        store.insert(order("o1"));
        let after = store.transition("o1", OrderStatus::Filled).unwrap();
        // Pending cannot jump straight to Filled.
        assert_eq!(after.status, OrderStatus::Pending);
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn update_mutates_active_order() {
        let store = OrderStore::new();
        store.insert(order("o1"));
        let updated = store
            .update("o1", |o| o.filled_quantity = dec!(4))
            .unwrap();
        assert_eq!(updated.filled_quantity, dec!(4));
    }

    #[test]
    fn active_older_than_filters_by_age() {
        let store = OrderStore::new();
        store.insert(order("o1"));
        assert!(store.active_older_than(60_000).is_empty());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(store.active_older_than(1).len(), 1);
    }
}
