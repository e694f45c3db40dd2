//! Execution orchestration.
//!
//! Turns a [`TradeDecision`] into an approved [`ExecutionPlan`] or a rejection
//! with reasons and suggested alternatives. Each attempt walks a sequential,
//! short-circuiting pipeline:
//!
//! `validating → {decision validation, capacity check, risk, protection,
//! conflict resolution, strategy selection, plan generation} → rejected |
//! completed`
//!
//! Capacity is reserved last. All other checks may pass and the reservation
//! can still fail under concurrent orchestration; the attempt is then
//! rejected (optimistic reservation, documented race).

mod conflict;
mod resources;
mod strategy;

pub use conflict::{ConflictResolution, SignalConflict, SignalConflictResolver, SignalResolution};
pub use resources::{ReserveError, ResourceMonitor};
pub use strategy::{
    ExecutionStrategySelector, StrategySelection, derive_order_type, derive_time_in_force,
    slicing_params,
};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::models::{
    ExecutionPlan, MarketContext, OrderSpec, PlanMetadata, ProtectionOutcome, ResourceAllocation,
    RiskOutcome, TradeDecision,
};
use crate::ports::{ProtectionMechanisms, RiskController};

/// Risk score above which decisions are rejected.
const MAX_RISK_SCORE: f64 = 80.0;
/// How long completed attempt records stay around for introspection.
const ATTEMPT_RETENTION: Duration = Duration::from_secs(60);

/// Pipeline stage at which an attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    /// Decision shape validation.
    Validation,
    /// Early capacity check.
    ResourceCheck,
    /// Risk scoring.
    Risk,
    /// Protection gates.
    Protection,
    /// Signal conflict resolution.
    ConflictResolution,
    /// Final capacity reservation.
    CapacityReservation,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::ResourceCheck => write!(f, "resource_check"),
            Self::Risk => write!(f, "risk"),
            Self::Protection => write!(f, "protection"),
            Self::ConflictResolution => write!(f, "conflict_resolution"),
            Self::CapacityReservation => write!(f, "capacity_reservation"),
        }
    }
}

/// A rejected orchestration attempt.
#[derive(Debug, Clone, Error)]
#[error("execution rejected at {stage}: {}", reasons.join("; "))]
pub struct PlanRejection {
    /// Stage that rejected the attempt.
    pub stage: ValidationStage,
    /// Rejection reasons.
    pub reasons: Vec<String>,
    /// Suggested alternatives for the caller.
    pub alternatives: Vec<String>,
}

impl PlanRejection {
    fn new(stage: ValidationStage, reason: impl Into<String>, alternatives: &[&str]) -> Self {
        Self {
            stage,
            reasons: vec![reason.into()],
            alternatives: alternatives.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Terminal state of an orchestration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptState {
    Validating,
    Completed,
    Rejected,
}

#[derive(Debug, Clone)]
struct AttemptRecord {
    state: AttemptState,
    finished_at: Option<Instant>,
}

/// Execution orchestrator: risk/protection checks plus the conflict resolver,
/// strategy selector, and capacity pool.
pub struct ExecutionOrchestrator {
    config: ExecutionConfig,
    resources: Arc<ResourceMonitor>,
    risk: Arc<dyn RiskController>,
    protection: Arc<dyn ProtectionMechanisms>,
    resolver: SignalConflictResolver,
    selector: ExecutionStrategySelector,
    attempts: RwLock<HashMap<String, AttemptRecord>>,
    daily_volume: RwLock<(NaiveDate, Decimal)>,
}

impl ExecutionOrchestrator {
    /// Create an orchestrator over the given ports and a fresh capacity pool.
    #[must_use]
    pub fn new(
        config: ExecutionConfig,
        risk: Arc<dyn RiskController>,
        protection: Arc<dyn ProtectionMechanisms>,
    ) -> Self {
        let resources = Arc::new(ResourceMonitor::new(config.execution_capacity));
        Self::with_resources(config, risk, protection, resources)
    }

    /// Create an orchestrator sharing an existing capacity pool.
    #[must_use]
    pub fn with_resources(
        config: ExecutionConfig,
        risk: Arc<dyn RiskController>,
        protection: Arc<dyn ProtectionMechanisms>,
        resources: Arc<ResourceMonitor>,
    ) -> Self {
        Self {
            config,
            resources,
            risk,
            protection,
            resolver: SignalConflictResolver,
            selector: ExecutionStrategySelector,
            attempts: RwLock::new(HashMap::new()),
            daily_volume: RwLock::new((Utc::now().date_naive(), Decimal::ZERO)),
        }
    }

    /// The shared capacity pool.
    #[must_use]
    pub fn resources(&self) -> Arc<ResourceMonitor> {
        Arc::clone(&self.resources)
    }

    /// Number of attempt bookkeeping entries currently retained.
    #[must_use]
    pub fn tracked_attempts(&self) -> usize {
        self.attempts.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Orchestrate one decision into a plan or a rejection.
    pub async fn orchestrate(
        &self,
        decision: &TradeDecision,
        market: &MarketContext,
    ) -> Result<ExecutionPlan, PlanRejection> {
        let attempt_id = Uuid::new_v4().to_string();
        self.begin_attempt(&attempt_id);

        let result = self.run_pipeline(decision, market).await;

        match &result {
            Ok(plan) => {
                tracing::info!(
                    decision_id = %decision.id,
                    plan_id = %plan.id,
                    strategy = %plan.strategy,
                    slices = plan.slicing.slices,
                    reserved_capacity = plan.allocation.reserved_capacity,
                    "execution plan approved"
                );
                self.finish_attempt(&attempt_id, AttemptState::Completed);
            }
            Err(rejection) => {
                tracing::warn!(
                    decision_id = %decision.id,
                    stage = %rejection.stage,
                    reasons = ?rejection.reasons,
                    "execution rejected"
                );
                self.finish_attempt(&attempt_id, AttemptState::Rejected);
            }
        }
        result
    }

    async fn run_pipeline(
        &self,
        decision: &TradeDecision,
        market: &MarketContext,
    ) -> Result<ExecutionPlan, PlanRejection> {
        let now = Utc::now();
        let mut quantity = decision.quantity;

        // Decision validation.
        if decision.symbol.trim().is_empty() {
            return Err(PlanRejection::new(
                ValidationStage::Validation,
                "empty symbol",
                &[],
            ));
        }
        if quantity <= Decimal::ZERO {
            return Err(PlanRejection::new(
                ValidationStage::Validation,
                format!("non-positive quantity {quantity}"),
                &[],
            ));
        }
        if decision.expires_at <= now {
            return Err(PlanRejection::new(
                ValidationStage::Validation,
                "decision already expired",
                &["retry later"],
            ));
        }
        if self.config.enable_position_limits {
            if quantity > self.config.max_order_size {
                return Err(PlanRejection::new(
                    ValidationStage::Validation,
                    format!(
                        "quantity {quantity} exceeds max order size {}",
                        self.config.max_order_size
                    ),
                    &["reduce size"],
                ));
            }
            let projected = self.projected_daily_volume(quantity);
            if projected > self.config.max_daily_volume {
                return Err(PlanRejection::new(
                    ValidationStage::Validation,
                    format!(
                        "daily volume {projected} would exceed limit {}",
                        self.config.max_daily_volume
                    ),
                    &["retry later"],
                ));
            }
        }

        // Early capacity check. Reservation itself happens last.
        if self.resources.available() == 0 {
            return Err(PlanRejection::new(
                ValidationStage::ResourceCheck,
                "no execution capacity available",
                &["retry later"],
            ));
        }

        // Risk.
        let risk_score = self.risk.position_risk(decision).await;
        if risk_score > MAX_RISK_SCORE {
            return Err(PlanRejection::new(
                ValidationStage::Risk,
                format!("risk score {risk_score:.1} exceeds limit {MAX_RISK_SCORE:.0}"),
                &["retry later", "reduce size"],
            ));
        }
        let risk = RiskOutcome {
            score: risk_score,
            approved: true,
        };

        // Protection.
        let verdict = self.protection.evaluate_signal(decision, market).await;
        if !verdict.allowed {
            return Err(PlanRejection {
                stage: ValidationStage::Protection,
                reasons: verdict.reasons,
                alternatives: vec!["retry later".to_string(), "reduce size".to_string()],
            });
        }
        if let Some(adjusted) = verdict.adjusted_quantity {
            tracing::debug!(
                decision_id = %decision.id,
                original = %quantity,
                adjusted = %adjusted,
                "protection adjusted quantity"
            );
            quantity = adjusted.min(quantity);
        }
        let protection = ProtectionOutcome {
            allowed: true,
            reasons: vec![],
            protection_level: verdict.protection_level,
        };

        // Conflict resolution over the decision's attached signals. The
        // resolved primary carries the actionable (possibly merged) quantity;
        // the decision quantity, already validated and protection-adjusted,
        // stays an upper bound.
        if !decision.signals.is_empty() {
            let resolution = self.resolver.resolve(&decision.signals);
            let Some(primary) = resolution.primary else {
                return Err(PlanRejection::new(
                    ValidationStage::ConflictResolution,
                    "signal conflicts resolved to cancel",
                    &["retry later"],
                ));
            };
            if !resolution.conflicts.is_empty() {
                tracing::debug!(
                    decision_id = %decision.id,
                    demoted = resolution.conflicts.len(),
                    resolution = ?resolution.resolution,
                    "signal conflicts resolved"
                );
            }
            if primary.quantity > Decimal::ZERO && primary.quantity < quantity {
                tracing::debug!(
                    decision_id = %decision.id,
                    original = %quantity,
                    resolved = %primary.quantity,
                    "using resolved signal quantity"
                );
                quantity = primary.quantity;
            }
        }

        // Strategy selection and plan generation.
        let mut working = decision.clone();
        working.quantity = quantity;
        let selection = self.selector.select(&working, market, now);
        let complexity = selection.strategy.weight() + (selection.slicing.slices / 5).min(10);
        let expected_duration_ms = u64::from(selection.slicing.slices.saturating_sub(1))
            * selection.slicing.interval_ms
            + self.config.max_latency_ms * u64::from(selection.slicing.slices);

        let order = OrderSpec {
            symbol: decision.symbol.clone(),
            side: decision.action.into(),
            order_type: derive_order_type(selection.strategy, decision.priority),
            quantity,
            limit_price: None,
            time_in_force: derive_time_in_force(selection.strategy, decision, now),
        };

        let plan = ExecutionPlan {
            id: format!("plan_{}", Uuid::new_v4()),
            decision_id: decision.id.clone(),
            symbol: decision.symbol.clone(),
            strategy: selection.strategy,
            slicing: selection.slicing,
            allocation: ResourceAllocation {
                priority: decision.priority,
                max_latency_ms: self.config.max_latency_ms,
                reserved_capacity: complexity,
            },
            risk,
            protection,
            order,
            metadata: PlanMetadata {
                created_at: now,
                expected_duration_ms,
                confidence: decision.confidence,
                complexity,
            },
        };

        // Capacity reservation, last. Every earlier check may have passed and
        // this can still fail under concurrent orchestration.
        self.resources
            .reserve(
                &plan.id,
                complexity,
                Duration::from_millis(expected_duration_ms.max(1_000)),
            )
            .map_err(|e| {
                PlanRejection::new(
                    ValidationStage::CapacityReservation,
                    e.to_string(),
                    &["retry later"],
                )
            })?;

        if self.config.enable_position_limits {
            self.commit_daily_volume(quantity);
        }

        Ok(plan)
    }

    fn projected_daily_volume(&self, quantity: Decimal) -> Decimal {
        let today = Utc::now().date_naive();
        self.daily_volume
            .read()
            .map(|guard| {
                if guard.0 == today {
                    guard.1 + quantity
                } else {
                    quantity
                }
            })
            .unwrap_or(quantity)
    }

    fn commit_daily_volume(&self, quantity: Decimal) {
        if let Ok(mut guard) = self.daily_volume.write() {
            let today = Utc::now().date_naive();
            if guard.0 == today {
                guard.1 += quantity;
            } else {
                *guard = (today, quantity);
            }
        }
    }

    fn begin_attempt(&self, id: &str) {
        if let Ok(mut attempts) = self.attempts.write() {
            Self::purge_attempts(&mut attempts);
            attempts.insert(
                id.to_string(),
                AttemptRecord {
                    state: AttemptState::Validating,
                    finished_at: None,
                },
            );
        }
    }

    fn finish_attempt(&self, id: &str, state: AttemptState) {
        if let Ok(mut attempts) = self.attempts.write() {
            if let Some(record) = attempts.get_mut(id) {
                record.state = state;
                record.finished_at = Some(Instant::now());
            }
        }
    }

    // Completed entries are introspection-only; drop them after a minute.
    fn purge_attempts(attempts: &mut HashMap<String, AttemptRecord>) {
        let now = Instant::now();
        attempts.retain(|_, record| match (record.state, record.finished_at) {
            (AttemptState::Validating, _) | (_, None) => true,
            (_, Some(finished)) => now.duration_since(finished) < ATTEMPT_RETENTION,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::models::{LiquidityTier, TradeAction, VolatilityTier};
    use crate::ports::{
        BlockingProtection, PassthroughProtection, PermissiveRiskController, StaticRiskController,
    };
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    fn decision(quantity: Decimal) -> TradeDecision {
        TradeDecision {
            id: "d1".to_string(),
            symbol: "BTC-USD".to_string(),
            action: TradeAction::Buy,
            quantity,
            confidence: 90.0,
            priority: 1,
            signals: vec![],
            expires_at: Utc::now() + TimeDelta::hours(1),
            reasoning: "test".to_string(),
        }
    }

    fn market() -> MarketContext {
        MarketContext {
            liquidity: LiquidityTier::Low,
            volatility: VolatilityTier::Normal,
        }
    }

    fn orchestrator(config: ExecutionConfig) -> ExecutionOrchestrator {
        ExecutionOrchestrator::new(
            config,
            Arc::new(PermissiveRiskController),
            Arc::new(PassthroughProtection),
        )
    }

    #[tokio::test]
    async fn approves_large_low_liquidity_decision_as_twap() {
        let orch = orchestrator(ExecutionConfig::default());
        let plan = orch.orchestrate(&decision(dec!(12_000)), &market()).await.unwrap();

        assert_eq!(plan.strategy.to_string(), "twap");
        assert!((2..=10).contains(&plan.slicing.slices));
        assert_eq!(
            plan.metadata.complexity,
            plan.strategy.weight() + (plan.slicing.slices / 5).min(10)
        );
        assert_eq!(plan.allocation.reserved_capacity, plan.metadata.complexity);
    }

    #[tokio::test]
    async fn plan_reserves_capacity() {
        let orch = orchestrator(ExecutionConfig::default());
        let before = orch.resources().available();
        let plan = orch.orchestrate(&decision(dec!(12_000)), &market()).await.unwrap();

        assert_eq!(
            orch.resources().available(),
            before - plan.allocation.reserved_capacity
        );
    }

    #[tokio::test]
    async fn merged_signal_quantity_drives_the_plan() {
        use crate::models::{SignalKind, SignalPriority, StrategySignal};

        let signal = |id: &str, confidence: f64, quantity: Decimal| StrategySignal {
            id: id.to_string(),
            strategy_id: format!("strat-{id}"),
            symbol: "BTC-USD".to_string(),
            kind: SignalKind::Momentum,
            action: TradeAction::Buy,
            confidence,
            priority: SignalPriority::High,
            quantity,
            conditions: std::collections::HashMap::new(),
        };

        let orch = orchestrator(ExecutionConfig::default());
        let mut d = decision(dec!(500));
        d.signals = vec![signal("a", 80.0, dec!(100)), signal("b", 70.0, dec!(200))];

        let plan = orch.orchestrate(&d, &market()).await.unwrap();

        // Confidence-weighted merge of 100@80 and 200@70, not the raw 500.
        assert!(plan.order.quantity > dec!(146) && plan.order.quantity < dec!(147));
    }

    #[tokio::test]
    async fn rejects_high_risk_with_alternatives() {
        let orch = ExecutionOrchestrator::new(
            ExecutionConfig::default(),
            Arc::new(StaticRiskController { score: 95.0 }),
            Arc::new(PassthroughProtection),
        );

        let rejection = orch
            .orchestrate(&decision(dec!(100)), &market())
            .await
            .unwrap_err();
        assert_eq!(rejection.stage, ValidationStage::Risk);
        assert!(rejection.alternatives.contains(&"reduce size".to_string()));
    }

    #[tokio::test]
    async fn rejects_blocked_protection() {
        let orch = ExecutionOrchestrator::new(
            ExecutionConfig::default(),
            Arc::new(PermissiveRiskController),
            Arc::new(BlockingProtection {
                reason: "drawdown circuit open".to_string(),
            }),
        );

        let rejection = orch
            .orchestrate(&decision(dec!(100)), &market())
            .await
            .unwrap_err();
        assert_eq!(rejection.stage, ValidationStage::Protection);
        assert_eq!(rejection.reasons, vec!["drawdown circuit open".to_string()]);
    }

    #[tokio::test]
    async fn rejects_expired_decision() {
        let orch = orchestrator(ExecutionConfig::default());
        let mut d = decision(dec!(100));
        d.expires_at = Utc::now() - TimeDelta::seconds(1);

        let rejection = orch.orchestrate(&d, &market()).await.unwrap_err();
        assert_eq!(rejection.stage, ValidationStage::Validation);
    }

    #[tokio::test]
    async fn rejects_oversized_order() {
        let config = ExecutionConfig {
            max_order_size: dec!(1_000),
            ..Default::default()
        };
        let orch = orchestrator(config);

        let rejection = orch
            .orchestrate(&decision(dec!(5_000)), &market())
            .await
            .unwrap_err();
        assert_eq!(rejection.stage, ValidationStage::Validation);
        assert!(rejection.alternatives.contains(&"reduce size".to_string()));
    }

    #[tokio::test]
    async fn rejects_when_capacity_reservation_fails() {
        let config = ExecutionConfig {
            execution_capacity: 1,
            ..Default::default()
        };
        let orch = orchestrator(config);

        // Complexity of a twap plan exceeds a pool of one unit, so every
        // earlier check passes and the final reservation still fails.
        let rejection = orch
            .orchestrate(&decision(dec!(12_000)), &market())
            .await
            .unwrap_err();
        assert_eq!(rejection.stage, ValidationStage::CapacityReservation);
        assert!(rejection.alternatives.contains(&"retry later".to_string()));
    }

    #[tokio::test]
    async fn daily_volume_accumulates_until_limit() {
        let config = ExecutionConfig {
            max_order_size: dec!(60_000),
            max_daily_volume: dec!(100_000),
            ..Default::default()
        };
        let orch = orchestrator(config);

        orch.orchestrate(&decision(dec!(60_000)), &market()).await.unwrap();
        let rejection = orch
            .orchestrate(&decision(dec!(60_000)), &market())
            .await
            .unwrap_err();

        assert_eq!(rejection.stage, ValidationStage::Validation);
        assert!(rejection.reasons[0].contains("daily volume"));
    }

    #[tokio::test]
    async fn attempt_records_are_tracked() {
        let orch = orchestrator(ExecutionConfig::default());
        orch.orchestrate(&decision(dec!(100)), &market()).await.unwrap();
        assert_eq!(orch.tracked_attempts(), 1);
    }
}
