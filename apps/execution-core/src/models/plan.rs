//! Execution plans produced by the orchestrator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::OrderSpec;

/// Execution algorithm chosen for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// Single aggressive submission.
    Immediate,
    /// Time-weighted slicing.
    Twap,
    /// Volume-weighted slicing.
    Vwap,
    /// Hidden-quantity slicing.
    Iceberg,
    /// Volatility-aware slicing.
    Adaptive,
}

impl ExecutionStrategy {
    /// Complexity weight contributed by the strategy itself.
    #[must_use]
    pub const fn weight(&self) -> u32 {
        match self {
            Self::Immediate => 1,
            Self::Twap => 3,
            Self::Vwap | Self::Adaptive => 4,
            Self::Iceberg => 5,
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Twap => write!(f, "twap"),
            Self::Vwap => write!(f, "vwap"),
            Self::Iceberg => write!(f, "iceberg"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Deterministic slicing parameters for a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicingParams {
    /// Number of sequential child slices; 1 means no slicing.
    pub slices: u32,
    /// Wait between consecutive slices, milliseconds.
    pub interval_ms: u64,
    /// Smallest allowed slice quantity (fixed fraction of the total).
    pub min_slice_qty: Decimal,
    /// Largest allowed slice quantity (fixed fraction of the total).
    pub max_slice_qty: Decimal,
}

/// Capacity and latency envelope reserved for a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAllocation {
    /// Decision priority carried through for downstream scheduling.
    pub priority: u8,
    /// Latency budget in milliseconds.
    pub max_latency_ms: u64,
    /// Capacity units reserved from the execution pool.
    pub reserved_capacity: u32,
}

/// Outcome of the risk check recorded on the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskOutcome {
    /// Composite risk score 0-100; above 80 rejects.
    pub score: f64,
    /// Whether the check passed.
    pub approved: bool,
}

/// Outcome of the protection check recorded on the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionOutcome {
    /// Whether protection allowed the decision.
    pub allowed: bool,
    /// Protection reasons, empty when clean.
    pub reasons: Vec<String>,
    /// Protection level label (e.g. `standard`, `elevated`).
    pub protection_level: String,
}

/// Plan metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMetadata {
    /// Plan creation time.
    pub created_at: DateTime<Utc>,
    /// Expected total execution duration, milliseconds; also the capacity TTL.
    pub expected_duration_ms: u64,
    /// Decision confidence carried through.
    pub confidence: f64,
    /// `strategy weight + min(10, slices / 5)`.
    pub complexity: u32,
}

/// An approved, immutable execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Plan id.
    pub id: String,
    /// Originating decision id.
    pub decision_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Chosen execution strategy.
    pub strategy: ExecutionStrategy,
    /// Slicing parameters.
    pub slicing: SlicingParams,
    /// Reserved resources.
    pub allocation: ResourceAllocation,
    /// Risk check outcome.
    pub risk: RiskOutcome,
    /// Protection check outcome.
    pub protection: ProtectionOutcome,
    /// Venue-facing order spec for the parent order.
    pub order: OrderSpec,
    /// Plan metadata.
    pub metadata: PlanMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_weights_rank_by_complexity() {
        assert!(ExecutionStrategy::Immediate.weight() < ExecutionStrategy::Twap.weight());
        assert!(ExecutionStrategy::Twap.weight() < ExecutionStrategy::Iceberg.weight());
        assert_eq!(ExecutionStrategy::Vwap.weight(), 4);
        assert_eq!(ExecutionStrategy::Adaptive.weight(), 4);
    }

    #[test]
    fn strategy_display_is_lowercase() {
        assert_eq!(ExecutionStrategy::Twap.to_string(), "twap");
        assert_eq!(ExecutionStrategy::Immediate.to_string(), "immediate");
    }
}
