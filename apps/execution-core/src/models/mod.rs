//! Core data model for the execution core.
//!
//! Entities flow in one direction: a [`TradeDecision`] produced upstream is
//! orchestrated into an immutable [`ExecutionPlan`], which the order executor
//! turns into one or more [`Order`]s and finally an [`OrderExecutionResult`].

mod decision;
mod order;
mod plan;

pub use decision::{
    MarketContext, LiquidityTier, SignalKind, SignalPriority, StrategySignal, TradeAction,
    TradeDecision, VolatilityTier,
};
pub use order::{
    Order, OrderExecutionResult, OrderSide, OrderSpec, OrderStatus, OrderType,
    ResultMetadata, TimeInForce, is_valid_transition,
};
pub use plan::{
    ExecutionPlan, ExecutionStrategy, PlanMetadata, ProtectionOutcome, ResourceAllocation,
    RiskOutcome, SlicingParams,
};
