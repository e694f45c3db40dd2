//! Driven ports for external collaborators.
//!
//! Risk analytics and protection mechanisms live outside the execution core;
//! the orchestrator consumes them through these interfaces. Permissive
//! implementations are provided for paper trading and tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{MarketContext, TradeDecision};

/// Portfolio risk metrics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Composite portfolio risk score 0-100.
    pub risk_score: f64,
    /// Current gross exposure.
    pub exposure: Decimal,
    /// Number of open positions.
    pub open_positions: u32,
}

/// Port onto the portfolio risk controller.
#[async_trait]
pub trait RiskController: Send + Sync {
    /// Current portfolio-level risk metrics.
    async fn current_risk_metrics(&self) -> RiskMetrics;

    /// Risk score 0-100 for taking this decision; above 80 rejects.
    async fn position_risk(&self, decision: &TradeDecision) -> f64;
}

/// Verdict returned by the protection layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionVerdict {
    /// Whether the decision may proceed.
    pub allowed: bool,
    /// Reasons when blocked or adjusted.
    pub reasons: Vec<String>,
    /// Optional reduced quantity the protection layer imposes.
    pub adjusted_quantity: Option<Decimal>,
    /// Protection level label.
    pub protection_level: String,
}

/// Port onto the protection mechanisms (circuit-breaker style pre-trade gates).
#[async_trait]
pub trait ProtectionMechanisms: Send + Sync {
    /// Evaluate a decision against the protection gates.
    async fn evaluate_signal(
        &self,
        decision: &TradeDecision,
        context: &MarketContext,
    ) -> ProtectionVerdict;
}

/// Risk controller that approves everything with a zero score.
#[derive(Debug, Clone, Default)]
pub struct PermissiveRiskController;

#[async_trait]
impl RiskController for PermissiveRiskController {
    async fn current_risk_metrics(&self) -> RiskMetrics {
        RiskMetrics {
            risk_score: 0.0,
            exposure: Decimal::ZERO,
            open_positions: 0,
        }
    }

    async fn position_risk(&self, _decision: &TradeDecision) -> f64 {
        0.0
    }
}

/// Risk controller that returns a fixed score, for tests.
#[derive(Debug, Clone)]
pub struct StaticRiskController {
    /// Score returned for every decision.
    pub score: f64,
}

#[async_trait]
impl RiskController for StaticRiskController {
    async fn current_risk_metrics(&self) -> RiskMetrics {
        RiskMetrics {
            risk_score: self.score,
            exposure: Decimal::ZERO,
            open_positions: 0,
        }
    }

    async fn position_risk(&self, _decision: &TradeDecision) -> f64 {
        self.score
    }
}

/// Protection layer that allows everything.
#[derive(Debug, Clone, Default)]
pub struct PassthroughProtection;

#[async_trait]
impl ProtectionMechanisms for PassthroughProtection {
    async fn evaluate_signal(
        &self,
        _decision: &TradeDecision,
        _context: &MarketContext,
    ) -> ProtectionVerdict {
        ProtectionVerdict {
            allowed: true,
            reasons: vec![],
            adjusted_quantity: None,
            protection_level: "standard".to_string(),
        }
    }
}

/// Protection layer that blocks everything, for tests.
#[derive(Debug, Clone)]
pub struct BlockingProtection {
    /// Reason reported for the block.
    pub reason: String,
}

#[async_trait]
impl ProtectionMechanisms for BlockingProtection {
    async fn evaluate_signal(
        &self,
        _decision: &TradeDecision,
        _context: &MarketContext,
    ) -> ProtectionVerdict {
        ProtectionVerdict {
            allowed: false,
            reasons: vec![self.reason.clone()],
            adjusted_quantity: None,
            protection_level: "elevated".to_string(),
        }
    }
}
