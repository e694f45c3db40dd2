//! Execution strategy selection and slicing parameters.
//!
//! A small ordered rule table picks the execution algorithm; slicing
//! parameters are a deterministic function of strategy and quantity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::models::{
    ExecutionStrategy, LiquidityTier, MarketContext, OrderType, SlicingParams, TimeInForce,
    TradeDecision, VolatilityTier,
};

/// Priority at and above which orders execute immediately.
const IMMEDIATE_PRIORITY: u8 = 3;
/// Expiry horizon below which orders execute immediately, milliseconds.
const IMMEDIATE_EXPIRY_MS: i64 = 60_000;
/// Quantity above which volume-spreading strategies apply.
const LARGE_QUANTITY: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
/// Quantity above which iceberg slicing applies.
const MEDIUM_QUANTITY: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);
/// Confidence below which adaptive execution applies.
const ADAPTIVE_CONFIDENCE: f64 = 70.0;

/// A chosen strategy with its slicing parameters.
#[derive(Debug, Clone)]
pub struct StrategySelection {
    /// Chosen execution algorithm.
    pub strategy: ExecutionStrategy,
    /// Deterministic slicing parameters.
    pub slicing: SlicingParams,
}

/// Stateless strategy selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionStrategySelector;

impl ExecutionStrategySelector {
    /// Select the execution strategy for a decision. Rules are ordered; the
    /// first match wins.
    #[must_use]
    pub fn select(
        &self,
        decision: &TradeDecision,
        market: &MarketContext,
        now: DateTime<Utc>,
    ) -> StrategySelection {
        let strategy = Self::pick(decision, market, now);
        StrategySelection {
            strategy,
            slicing: slicing_params(strategy, decision.quantity),
        }
    }

    fn pick(
        decision: &TradeDecision,
        market: &MarketContext,
        now: DateTime<Utc>,
    ) -> ExecutionStrategy {
        if decision.priority >= IMMEDIATE_PRIORITY
            || decision.time_to_expiry_ms(now) < IMMEDIATE_EXPIRY_MS
        {
            return ExecutionStrategy::Immediate;
        }

        if decision.quantity > LARGE_QUANTITY {
            return if market.liquidity == LiquidityTier::Low {
                ExecutionStrategy::Twap
            } else {
                ExecutionStrategy::Vwap
            };
        }

        if decision.quantity > MEDIUM_QUANTITY && market.volatility != VolatilityTier::High {
            return ExecutionStrategy::Iceberg;
        }

        if decision.confidence < ADAPTIVE_CONFIDENCE || market.volatility == VolatilityTier::High {
            return ExecutionStrategy::Adaptive;
        }

        ExecutionStrategy::Immediate
    }
}

/// Per-strategy slicing table: (min slices, max slices, interval ms, slice
/// basis quantity, min fraction, max fraction).
const fn slicing_table(strategy: ExecutionStrategy) -> (u32, u32, u64, i64, f64, f64) {
    match strategy {
        ExecutionStrategy::Immediate => (1, 1, 0, 1, 1.0, 1.0),
        ExecutionStrategy::Twap => (2, 10, 30_000, 2_000, 0.05, 0.5),
        ExecutionStrategy::Vwap => (3, 20, 15_000, 1_000, 0.02, 0.3),
        ExecutionStrategy::Iceberg => (5, 50, 5_000, 500, 0.01, 0.1),
        ExecutionStrategy::Adaptive => (2, 15, 20_000, 1_500, 0.03, 0.4),
    }
}

/// Deterministic slicing parameters for a strategy and total quantity.
#[must_use]
pub fn slicing_params(strategy: ExecutionStrategy, quantity: Decimal) -> SlicingParams {
    let (min_slices, max_slices, interval_ms, basis, min_frac, max_frac) = slicing_table(strategy);

    let slices = if min_slices == max_slices {
        min_slices
    } else {
        let raw = (quantity / Decimal::from(basis))
            .ceil()
            .to_u32()
            .unwrap_or(max_slices);
        raw.clamp(min_slices, max_slices)
    };

    let qty_f = quantity.to_f64().unwrap_or(0.0);
    let min_slice_qty = Decimal::try_from(qty_f * min_frac).unwrap_or(Decimal::ZERO);
    let max_slice_qty = Decimal::try_from(qty_f * max_frac).unwrap_or(quantity);

    SlicingParams {
        slices,
        interval_ms,
        min_slice_qty,
        max_slice_qty,
    }
}

/// Derive the venue order type from strategy and priority.
#[must_use]
pub const fn derive_order_type(strategy: ExecutionStrategy, priority: u8) -> OrderType {
    match strategy {
        ExecutionStrategy::Immediate => OrderType::Market,
        ExecutionStrategy::Twap | ExecutionStrategy::Vwap | ExecutionStrategy::Iceberg => {
            OrderType::Limit
        }
        ExecutionStrategy::Adaptive => {
            if priority >= IMMEDIATE_PRIORITY {
                OrderType::Market
            } else {
                OrderType::Limit
            }
        }
    }
}

/// Derive time-in-force from strategy and time to expiry.
#[must_use]
pub fn derive_time_in_force(
    strategy: ExecutionStrategy,
    decision: &TradeDecision,
    now: DateTime<Utc>,
) -> TimeInForce {
    let ttl_ms = decision.time_to_expiry_ms(now);
    if ttl_ms < IMMEDIATE_EXPIRY_MS {
        return TimeInForce::Ioc;
    }
    if strategy == ExecutionStrategy::Immediate {
        return TimeInForce::Fok;
    }
    if ttl_ms < 3_600_000 {
        return TimeInForce::Ioc;
    }
    TimeInForce::Gtc
}
