//! Order execution.
//!
//! [`OrderExecutor`] turns an approved [`ExecutionPlan`] into tracked orders
//! and an [`OrderExecutionResult`]. Single-slice plans run one order through
//! the mode backend; multi-slice plans run children sequentially with
//! inter-slice waits and aggregate the fills onto the parent. Every failure
//! path finalizes the order exactly once; `execute_plan` itself never errors.

mod metrics;
mod modes;
mod slices;
mod state;

pub use metrics::{ExecutionMetrics, MetricsSnapshot};
pub use modes::{
    BacktestExecutor, FillOutcome, LiveExecutor, ModeExecutor, PaperExecutor, pseudo_price,
};
pub use slices::{OrderSliceManager, SliceGroup};
pub use state::OrderStore;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::{ExecutionConfig, ExecutionMode};
use crate::error::ExecutionError;
use crate::events::{EventPublisher, ExecutionEvent};
use crate::models::{
    ExecutionPlan, Order, OrderExecutionResult, OrderStatus, ResultMetadata,
};
use crate::venue::{MockVenueConnector, VenueConnector};

/// Drives order execution for one mode.
pub struct OrderExecutor {
    config: ExecutionConfig,
    backend: Arc<dyn ModeExecutor>,
    venue_name: String,
    store: Arc<OrderStore>,
    slices: Arc<OrderSliceManager>,
    metrics: Arc<ExecutionMetrics>,
    events: Arc<dyn EventPublisher>,
}

impl OrderExecutor {
    /// Create an executor around an explicit backend.
    #[must_use]
    pub fn new(
        config: ExecutionConfig,
        backend: Arc<dyn ModeExecutor>,
        venue_name: impl Into<String>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            config,
            backend,
            venue_name: venue_name.into(),
            store: Arc::new(OrderStore::new()),
            slices: Arc::new(OrderSliceManager::new()),
            metrics: Arc::new(ExecutionMetrics::new()),
            events,
        }
    }

    /// Create an executor with the backend implied by the configured mode.
    /// Live mode without a connector falls back to the in-memory mock venue.
    #[must_use]
    pub fn for_mode(
        config: ExecutionConfig,
        venue: Option<Arc<dyn VenueConnector>>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        match config.mode {
            ExecutionMode::Paper | ExecutionMode::Simulation => {
                let backend = Arc::new(PaperExecutor::new(config.paper.clone()));
                Self::new(config, backend, "paper", events)
            }
            ExecutionMode::Backtest => Self::new(config, Arc::new(BacktestExecutor), "backtest", events),
            ExecutionMode::Live => {
                let venue = venue.unwrap_or_else(|| {
                    tracing::warn!("live mode without a venue connector, using mock venue");
                    Arc::new(MockVenueConnector::new(Decimal::from(50_000)))
                });
                let name = venue.name().to_string();
                let backend = Arc::new(LiveExecutor::new(venue, &config));
                Self::new(config, backend, name, events)
            }
        }
    }

    /// The order store.
    #[must_use]
    pub fn store(&self) -> Arc<OrderStore> {
        Arc::clone(&self.store)
    }

    /// The metrics accumulator.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Execute a plan to completion. Never returns an error; failures are
    /// finalized onto the order and reported in the result.
    pub async fn execute_plan(&self, plan: &ExecutionPlan) -> OrderExecutionResult {
        if plan.slicing.slices <= 1 {
            self.execute_single(plan).await
        } else {
            self.execute_sliced(plan).await
        }
    }

    async fn execute_single(&self, plan: &ExecutionPlan) -> OrderExecutionResult {
        let started = Instant::now();
        let order = Order::new(format!("ord_{}", Uuid::new_v4()), plan.id.clone(), plan.order.clone());
        let order_id = order.id.clone();
        self.register_order(&order).await;
        self.store.transition(&order_id, OrderStatus::Submitted);

        let outcome = self.backend.execute(&order).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(fill) => self.finalize_fill(&order_id, plan, fill, latency_ms, "single").await,
            Err(error) => self.finalize_error(&order_id, plan, &error, latency_ms, "single").await,
        }
    }

    async fn execute_sliced(&self, plan: &ExecutionPlan) -> OrderExecutionResult {
        let started = Instant::now();
        let parent = Order::new(format!("ord_{}", Uuid::new_v4()), plan.id.clone(), plan.order.clone());
        let parent_id = parent.id.clone();
        self.register_order(&parent).await;
        self.store.transition(&parent_id, OrderStatus::Submitted);

        let quantities = OrderSliceManager::compute_slices(&plan.slicing, plan.order.quantity);
        self.slices.register(&plan.id, quantities.clone());

        let mut total_filled = Decimal::ZERO;
        let mut notional = Decimal::ZERO;
        let mut total_fees = Decimal::ZERO;
        let mut slippage_samples: Vec<f64> = Vec::new();
        let mut child_ids = Vec::with_capacity(quantities.len());
        let last = quantities.len() - 1;

        for (index, quantity) in quantities.iter().enumerate() {
            let child_id = format!("{parent_id}_slice_{}", index + 1);
            let mut child = Order::new(child_id.clone(), plan.id.clone(), plan.order.clone());
            child.spec.quantity = *quantity;
            child.parent_id = Some(parent_id.clone());
            self.register_order(&child).await;
            self.slices.record_child(&plan.id, &child_id);
            child_ids.push(child_id.clone());
            self.store.transition(&child_id, OrderStatus::Submitted);

            match self.backend.execute(&child).await {
                Ok(fill) => {
                    if let Some(price) = fill.average_price {
                        notional += price * fill.filled_quantity;
                    }
                    total_filled += fill.filled_quantity;
                    total_fees += fill.fees;
                    if fill.filled_quantity > Decimal::ZERO {
                        slippage_samples.push(fill.slippage_pct);
                    }
                    self.apply_fill(&child_id, &fill).await;
                }
                Err(error) => {
                    tracing::warn!(
                        order_id = %child_id,
                        slice = index + 1,
                        error = %error,
                        "slice execution failed"
                    );
                    self.apply_error(&child_id, &error).await;
                }
            }
            self.slices.complete_slice(&plan.id);

            if index < last {
                tokio::time::sleep(Duration::from_millis(plan.slicing.interval_ms)).await;
            }
        }

        // Group removal must happen on every exit path of the slice loop.
        self.slices.remove(&plan.id);
        self.emit(ExecutionEvent::CleanupCompleted { purged: 1 }).await;

        let average_price = if total_filled > Decimal::ZERO {
            Some((notional / total_filled).round_dp(8))
        } else {
            None
        };
        // Arithmetic mean across slices, not volume-weighted.
        let slippage_pct = if slippage_samples.is_empty() {
            0.0
        } else {
            slippage_samples.iter().sum::<f64>() / slippage_samples.len() as f64
        };
        let latency_ms = started.elapsed().as_millis() as u64;
        let success = total_filled > Decimal::ZERO;

        self.store.update(&parent_id, |o| {
            o.filled_quantity = total_filled;
            o.average_price = average_price;
            o.fees = total_fees;
            o.child_ids = child_ids;
        });
        let status = if success { OrderStatus::Filled } else { OrderStatus::Rejected };
        self.store.transition(&parent_id, status);

        if success {
            self.metrics.record_success(latency_ms, slippage_pct, total_fees);
            self.emit(ExecutionEvent::OrderFilled {
                order_id: parent_id.clone(),
                fill_price: average_price.unwrap_or_default(),
                fill_quantity: total_filled,
            })
            .await;
        } else {
            self.metrics.record_failure(latency_ms);
            self.emit(ExecutionEvent::OrderFailed {
                order_id: parent_id.clone(),
                reason: "no slice filled".to_string(),
            })
            .await;
        }

        OrderExecutionResult {
            success,
            order_id: parent_id,
            fill_price: average_price,
            fill_quantity: total_filled,
            slippage_pct,
            fees: total_fees,
            error: if success { None } else { Some("no slice filled".to_string()) },
            execution_time_ms: latency_ms,
            metadata: self.metadata(latency_ms, "sliced"),
        }
    }

    async fn finalize_fill(
        &self,
        order_id: &str,
        _plan: &ExecutionPlan,
        fill: FillOutcome,
        latency_ms: u64,
        path: &str,
    ) -> OrderExecutionResult {
        let success = fill.filled_quantity > Decimal::ZERO;
        self.apply_fill(order_id, &fill).await;

        if fill.slippage_pct > self.config.max_slippage_pct {
            tracing::warn!(
                order_id = %order_id,
                slippage_pct = fill.slippage_pct,
                limit = self.config.max_slippage_pct,
                "fill exceeded slippage tolerance"
            );
        }
        if success {
            self.metrics.record_success(latency_ms, fill.slippage_pct, fill.fees);
        } else {
            self.metrics.record_failure(latency_ms);
        }

        OrderExecutionResult {
            success,
            order_id: order_id.to_string(),
            fill_price: fill.average_price,
            fill_quantity: fill.filled_quantity,
            slippage_pct: fill.slippage_pct,
            fees: fill.fees,
            error: if success { None } else { Some("nothing filled".to_string()) },
            execution_time_ms: latency_ms,
            metadata: self.metadata(latency_ms, path),
        }
    }

    async fn finalize_error(
        &self,
        order_id: &str,
        _plan: &ExecutionPlan,
        error: &ExecutionError,
        latency_ms: u64,
        path: &str,
    ) -> OrderExecutionResult {
        self.apply_error(order_id, error).await;
        self.metrics.record_failure(latency_ms);

        OrderExecutionResult {
            success: false,
            order_id: order_id.to_string(),
            fill_price: None,
            fill_quantity: Decimal::ZERO,
            slippage_pct: 0.0,
            fees: Decimal::ZERO,
            error: Some(error.to_string()),
            execution_time_ms: latency_ms,
            metadata: self.metadata(latency_ms, path),
        }
    }

    async fn apply_fill(&self, order_id: &str, fill: &FillOutcome) {
        self.store.update(order_id, |o| {
            o.filled_quantity = fill.filled_quantity;
            o.average_price = fill.average_price;
            o.fees = fill.fees;
            o.venue_order_id = fill.venue_order_id.clone();
        });
        if fill.filled_quantity > Decimal::ZERO {
            self.store.transition(order_id, OrderStatus::Filled);
            self.emit(ExecutionEvent::OrderFilled {
                order_id: order_id.to_string(),
                fill_price: fill.average_price.unwrap_or_default(),
                fill_quantity: fill.filled_quantity,
            })
            .await;
        } else {
            self.store.transition(order_id, OrderStatus::Rejected);
            self.emit(ExecutionEvent::OrderFailed {
                order_id: order_id.to_string(),
                reason: "nothing filled".to_string(),
            })
            .await;
        }
    }

    async fn apply_error(&self, order_id: &str, error: &ExecutionError) {
        // Timeouts and internal faults finalize as `error`; everything else
        // is a rejection the caller may resubmit.
        let status = match error {
            ExecutionError::Timeout(_) | ExecutionError::Internal(_) => OrderStatus::Error,
            _ => OrderStatus::Rejected,
        };
        self.store.transition(order_id, status);
        self.emit(ExecutionEvent::OrderFailed {
            order_id: order_id.to_string(),
            reason: error.to_string(),
        })
        .await;
    }

    /// Cancel one active order. Returns `true` when a cancel was performed
    /// and `false` when there was nothing to cancel (unknown or already
    /// terminal order). Local state becomes `cancelled` once the remote call
    /// returns, whether or not it succeeded; a failed remote cancel is
    /// reported through [`ExecutionEvent::CancelFailed`].
    pub async fn cancel_order(&self, order_id: &str) -> bool {
        let Some(order) = self.store.get(order_id) else {
            tracing::debug!(order_id = %order_id, "cancel skipped, unknown order");
            return false;
        };
        if order.status.is_terminal() {
            tracing::debug!(
                order_id = %order_id,
                status = %order.status,
                "cancel skipped, order already terminal"
            );
            return false;
        }

        let remote = self.backend.cancel(order.venue_order_id.as_deref()).await;
        self.store.transition(order_id, OrderStatus::Cancelled);
        match remote {
            Ok(()) => {
                self.emit(ExecutionEvent::OrderCancelled {
                    order_id: order_id.to_string(),
                })
                .await;
            }
            Err(error) => {
                tracing::warn!(order_id = %order_id, error = %error, "remote cancel failed");
                self.emit(ExecutionEvent::CancelFailed {
                    order_id: order_id.to_string(),
                    reason: error.to_string(),
                })
                .await;
            }
        }
        true
    }

    /// Cancel every active order concurrently, collecting per-order outcomes.
    pub async fn cancel_all_active(&self) -> Vec<(String, bool)> {
        let ids: Vec<String> = self
            .store
            .active_orders()
            .into_iter()
            .map(|o| o.id)
            .collect();
        let results = join_all(ids.iter().map(|id| self.cancel_order(id))).await;
        ids.into_iter().zip(results).collect()
    }

    /// Expire active orders older than the configured order timeout. Returns
    /// the expired order ids.
    pub async fn sweep_expired(&self) -> Vec<String> {
        let stale = self.store.active_older_than(self.config.order_timeout_ms);
        for order_id in &stale {
            self.store.transition(order_id, OrderStatus::Expired);
            self.emit(ExecutionEvent::OrderExpired {
                order_id: order_id.clone(),
            })
            .await;
        }
        if !stale.is_empty() {
            tracing::info!(expired = stale.len(), "timeout sweep expired stale orders");
        }
        stale
    }

    async fn register_order(&self, order: &Order) {
        self.store.insert(order.clone());
        self.emit(ExecutionEvent::OrderCreated {
            order_id: order.id.clone(),
            symbol: order.spec.symbol.clone(),
            quantity: order.spec.quantity,
        })
        .await;
    }

    async fn emit(&self, event: ExecutionEvent) {
        if let Err(error) = self.events.publish(event).await {
            tracing::debug!(error = %error, "event publish failed");
        }
    }

    fn metadata(&self, latency_ms: u64, path: &str) -> ResultMetadata {
        ResultMetadata {
            mode: self.config.mode,
            exchange: self.venue_name.clone(),
            latency_ms,
            execution_path: path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NoOpEventPublisher, RecordingEventPublisher};
    use crate::models::{
        ExecutionStrategy, OrderSide, OrderSpec, OrderType, PlanMetadata, ProtectionOutcome,
        ResourceAllocation, RiskOutcome, SlicingParams, TimeInForce,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn plan(quantity: Decimal, slices: u32, interval_ms: u64) -> ExecutionPlan {
        ExecutionPlan {
            id: format!("plan_{}", Uuid::new_v4()),
            decision_id: "d1".to_string(),
            symbol: "BTC-USD".to_string(),
            strategy: if slices > 1 {
                ExecutionStrategy::Twap
            } else {
                ExecutionStrategy::Immediate
            },
            slicing: SlicingParams {
                slices,
                interval_ms,
                min_slice_qty: Decimal::ZERO,
                max_slice_qty: Decimal::MAX,
            },
            allocation: ResourceAllocation {
                priority: 1,
                max_latency_ms: 1_000,
                reserved_capacity: 3,
            },
            risk: RiskOutcome {
                score: 10.0,
                approved: true,
            },
            protection: ProtectionOutcome {
                allowed: true,
                reasons: vec![],
                protection_level: "normal".to_string(),
            },
            order: OrderSpec {
                symbol: "BTC-USD".to_string(),
                side: OrderSide::Buy,
                order_type: OrderType::Market,
                quantity,
                limit_price: None,
                time_in_force: TimeInForce::Gtc,
            },
            metadata: PlanMetadata {
                created_at: Utc::now(),
                expected_duration_ms: 1_000,
                confidence: 90.0,
                complexity: 3,
            },
        }
    }

    fn paper_executor(events: Arc<dyn EventPublisher>) -> OrderExecutor {
        let config = ExecutionConfig {
            paper: crate::config::PaperTradingConfig {
                spread_pct: 0.05,
                slippage_pct: 0.0,
                latency_ms: 0,
            },
            ..Default::default()
        };
        OrderExecutor::for_mode(config, None, events)
    }

    struct FailingBackend(ExecutionError);

    #[async_trait]
    impl ModeExecutor for FailingBackend {
        async fn execute(&self, _order: &Order) -> Result<FillOutcome, ExecutionError> {
            Err(self.0.clone())
        }

        async fn cancel(&self, _venue_order_id: Option<&str>) -> Result<(), ExecutionError> {
            Err(ExecutionError::Connection("venue gone".to_string()))
        }
    }

    #[tokio::test]
    async fn single_plan_fills_and_archives_order() {
        let executor = paper_executor(Arc::new(NoOpEventPublisher));
        let result = executor.execute_plan(&plan(dec!(10), 1, 0)).await;

        assert!(result.success);
        assert_eq!(result.fill_quantity, dec!(10));
        assert!(result.fill_price.is_some());
        assert_eq!(result.metadata.execution_path, "single");

        let store = executor.store();
        assert_eq!(store.active_count(), 0);
        assert_eq!(store.history_count(), 1);
        assert_eq!(store.get(&result.order_id).unwrap().status, OrderStatus::Filled);
        assert_eq!(executor.metrics().successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sliced_plan_aggregates_fills_onto_parent() {
        let executor = paper_executor(Arc::new(NoOpEventPublisher));
        let result = executor.execute_plan(&plan(dec!(10), 3, 30_000)).await;

        assert!(result.success);
        assert_eq!(result.fill_quantity, dec!(10));
        assert_eq!(result.metadata.execution_path, "sliced");

        let store = executor.store();
        let parent = store.get(&result.order_id).unwrap();
        assert_eq!(parent.status, OrderStatus::Filled);
        assert_eq!(parent.child_ids.len(), 3);
        assert_eq!(parent.filled_quantity, dec!(10));
        // Parent plus three children, all terminal.
        assert_eq!(store.history_count(), 4);
    }

    #[tokio::test]
    async fn slice_groups_are_cleaned_up() {
        let executor = paper_executor(Arc::new(NoOpEventPublisher));
        executor.execute_plan(&plan(dec!(9), 3, 0)).await;
        assert_eq!(executor.slices.tracked(), 0);
    }

    #[tokio::test]
    async fn rejection_finalizes_order_as_rejected() {
        let executor = OrderExecutor::new(
            ExecutionConfig::default(),
            Arc::new(FailingBackend(ExecutionError::VenueRejection(
                "insufficient funds".to_string(),
            ))),
            "mock",
            Arc::new(NoOpEventPublisher),
        );
        let result = executor.execute_plan(&plan(dec!(5), 1, 0)).await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("insufficient funds"));
        let order = executor.store().get(&result.order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(executor.metrics().failures, 1);
    }

    #[tokio::test]
    async fn timeout_finalizes_order_as_error() {
        let executor = OrderExecutor::new(
            ExecutionConfig::default(),
            Arc::new(FailingBackend(ExecutionError::Timeout("no fill".to_string()))),
            "mock",
            Arc::new(NoOpEventPublisher),
        );
        let result = executor.execute_plan(&plan(dec!(5), 1, 0)).await;

        let order = executor.store().get(&result.order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Error);
    }

    #[tokio::test]
    async fn failed_remote_cancel_still_cancels_locally() {
        let recorder = Arc::new(RecordingEventPublisher::new());
        let executor = OrderExecutor::new(
            ExecutionConfig::default(),
            Arc::new(FailingBackend(ExecutionError::Timeout("unused".to_string()))),
            "mock",
            Arc::clone(&recorder) as Arc<dyn EventPublisher>,
        );
        let order = Order::new("o1", "p1", plan(dec!(5), 1, 0).order);
        executor.store.insert(order);

        assert!(executor.cancel_order("o1").await);
        assert_eq!(
            executor.store().get("o1").unwrap().status,
            OrderStatus::Cancelled
        );
        assert!(recorder
            .events()
            .iter()
            .any(|e| matches!(e, ExecutionEvent::CancelFailed { .. })));
    }

    #[tokio::test]
    async fn cancel_of_settled_or_unknown_order_is_a_no_op() {
        let recorder = Arc::new(RecordingEventPublisher::new());
        let executor = paper_executor(Arc::clone(&recorder) as Arc<dyn EventPublisher>);
        let result = executor.execute_plan(&plan(dec!(5), 1, 0)).await;
        let status = executor.store().get(&result.order_id).unwrap().status;
        let events_before = recorder.events().len();

        assert!(!executor.cancel_order(&result.order_id).await);
        assert!(!executor.cancel_order("no-such-order").await);
        // The terminal order keeps its status and no cancel events fire.
        assert_eq!(executor.store().get(&result.order_id).unwrap().status, status);
        assert_eq!(recorder.events().len(), events_before);
    }

    #[tokio::test]
    async fn cancel_all_active_settles_everything() {
        let executor = paper_executor(Arc::new(NoOpEventPublisher));
        for i in 0..3 {
            let order = Order::new(format!("o{i}"), "p1", plan(dec!(5), 1, 0).order);
            executor.store.insert(order);
        }

        let outcomes = executor.cancel_all_active().await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, cancelled)| *cancelled));
        assert_eq!(executor.store().active_count(), 0);
    }

    #[tokio::test]
    async fn sweep_expires_stale_orders() {
        let config = ExecutionConfig {
            order_timeout_ms: 0,
            ..Default::default()
        };
        let executor = OrderExecutor::for_mode(config, None, Arc::new(NoOpEventPublisher));
        let order = Order::new("o1", "p1", plan(dec!(5), 1, 0).order);
        executor.store.insert(order);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let expired = executor.sweep_expired().await;
        assert_eq!(expired, vec!["o1".to_string()]);
        assert_eq!(
            executor.store().get("o1").unwrap().status,
            OrderStatus::Expired
        );
    }
}
