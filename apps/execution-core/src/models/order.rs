//! Orders, fills, and execution results.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ExecutionMode;

use super::TradeAction;

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy side.
    Buy,
    /// Sell side.
    Sell,
}

impl From<TradeAction> for OrderSide {
    fn from(action: TradeAction) -> Self {
        match action {
            TradeAction::Buy => Self::Buy,
            TradeAction::Sell => Self::Sell,
        }
    }
}

/// Venue order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Execute at the prevailing price.
    Market,
    /// Execute at the limit price or better.
    Limit,
}

/// Venue instruction on how long an order remains eligible for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Immediate-or-cancel.
    Ioc,
    /// Fill-or-kill.
    Fok,
    /// Good-till-cancelled.
    Gtc,
    /// Good for the trading day.
    Day,
}

/// Order status lifecycle.
///
/// `pending → submitted → {partially_filled → filled | filled | cancelled |
/// rejected | expired | error}`; the last five are terminal and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, not yet dispatched.
    Pending,
    /// Dispatched to a mode executor / venue.
    Submitted,
    /// Some quantity filled, more outstanding.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Cancelled locally (remote cancel is best effort).
    Cancelled,
    /// Rejected by validation or the venue.
    Rejected,
    /// Timed out waiting for completion.
    Expired,
    /// Finalized by the outer error guard after an unexpected failure.
    Error,
}

impl OrderStatus {
    /// Returns true if the status is terminal; terminal statuses are final.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired | Self::Error
        )
    }

    /// Returns true if the order is still active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Submitted => write!(f, "submitted"),
            Self::PartiallyFilled => write!(f, "partially_filled"),
            Self::Filled => write!(f, "filled"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Check whether a status transition is allowed.
#[must_use]
pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    matches!(
        (from, to),
        (OrderStatus::Pending, OrderStatus::Submitted)
            | (
                OrderStatus::Pending,
                OrderStatus::Cancelled
                    | OrderStatus::Rejected
                    | OrderStatus::Expired
                    | OrderStatus::Error
            )
            | (
                OrderStatus::Submitted,
                OrderStatus::PartiallyFilled
                    | OrderStatus::Filled
                    | OrderStatus::Cancelled
                    | OrderStatus::Rejected
                    | OrderStatus::Expired
                    | OrderStatus::Error
            )
            | (
                OrderStatus::PartiallyFilled,
                OrderStatus::PartiallyFilled
                    | OrderStatus::Filled
                    | OrderStatus::Cancelled
                    | OrderStatus::Expired
                    | OrderStatus::Error
            )
    )
}

/// The venue-facing description of an order, derived from an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Market or limit.
    pub order_type: OrderType,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Limit price, `None` for market orders.
    pub limit_price: Option<Decimal>,
    /// Time-in-force instruction.
    pub time_in_force: TimeInForce,
}

/// A live order tracked by the order executor.
///
/// Mutated only by the executor; moved from the active map to the history map
/// exactly once upon reaching a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order id (`<parent>_slice_<n>` for child slices).
    pub id: String,
    /// Originating plan id.
    pub plan_id: String,
    /// Venue-facing spec.
    pub spec: OrderSpec,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Filled quantity, never exceeds `spec.quantity`.
    pub filled_quantity: Decimal,
    /// Volume-weighted average fill price.
    pub average_price: Option<Decimal>,
    /// Accumulated fees.
    pub fees: Decimal,
    /// Venue-assigned order id once placed on a live venue.
    pub venue_order_id: Option<String>,
    /// Placement retry counter.
    pub retry_count: u32,
    /// Child slice ids, populated on sliced parents.
    pub child_ids: Vec<String>,
    /// Parent order id, set on slices.
    pub parent_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a fresh pending order from a plan's spec.
    #[must_use]
    pub fn new(id: impl Into<String>, plan_id: impl Into<String>, spec: OrderSpec) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            plan_id: plan_id.into(),
            spec,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            average_price: None,
            fees: Decimal::ZERO,
            venue_order_id: None,
            retry_count: 0,
            child_ids: Vec::new(),
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Age of the order relative to `now`, in milliseconds.
    #[must_use]
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds().max(0)
    }
}

/// Metadata attached to an execution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Execution mode that produced the result.
    pub mode: ExecutionMode,
    /// Venue name.
    pub exchange: String,
    /// Observed venue latency in milliseconds.
    pub latency_ms: u64,
    /// `single` or `sliced`.
    pub execution_path: String,
}

/// Outcome of executing a plan (or one slice of it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderExecutionResult {
    /// Whether any quantity filled.
    pub success: bool,
    /// Order id.
    pub order_id: String,
    /// Average fill price, `None` when nothing filled.
    pub fill_price: Option<Decimal>,
    /// Total filled quantity.
    pub fill_quantity: Decimal,
    /// Slippage percentage against the reference price.
    pub slippage_pct: f64,
    /// Total fees.
    pub fees: Decimal,
    /// Failure description when `success` is false.
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
    /// Execution metadata.
    pub metadata: ResultMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TERMINAL: [OrderStatus; 5] = [
        OrderStatus::Filled,
        OrderStatus::Cancelled,
        OrderStatus::Rejected,
        OrderStatus::Expired,
        OrderStatus::Error,
    ];

    #[test]
    fn terminal_statuses_are_final() {
        for from in TERMINAL {
            assert!(from.is_terminal());
            for to in [
                OrderStatus::Pending,
                OrderStatus::Submitted,
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Cancelled,
            ] {
                assert!(!is_valid_transition(from, to), "{from} -> {to} must be final");
            }
        }
    }

    #[test]
    fn pending_submits_before_filling() {
        assert!(is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Submitted
        ));
        assert!(!is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Filled
        ));
    }

    #[test]
    fn submitted_reaches_every_terminal_state() {
        for to in TERMINAL {
            assert!(is_valid_transition(OrderStatus::Submitted, to));
        }
    }

    #[test]
    fn partial_fill_can_accumulate() {
        assert!(is_valid_transition(
            OrderStatus::PartiallyFilled,
            OrderStatus::PartiallyFilled
        ));
        assert!(is_valid_transition(
            OrderStatus::PartiallyFilled,
            OrderStatus::Filled
        ));
    }

    #[test]
    fn new_order_starts_pending_and_unfilled() {
        let spec = OrderSpec {
            symbol: "BTC-USD".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: Decimal::new(100, 0),
            limit_price: None,
            time_in_force: TimeInForce::Gtc,
        };
        let order = Order::new("o1", "p1", spec);

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.filled_quantity, Decimal::ZERO);
        assert!(order.child_ids.is_empty());
    }
}
