//! Helm Execution Core Binary
//!
//! Wires telemetry, configuration, and a paper-mode execution pipeline, then
//! runs one sample decision end-to-end.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin execution-core
//! ```
//!
//! # Environment Variables
//!
//! - `HELM_CONFIG`: optional path to a config file
//! - `HELM_MODE`: paper | live | simulation | backtest (default: paper)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use chrono::{TimeDelta, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use execution_core::config::ExecutionConfig;
use execution_core::events::ChannelEventPublisher;
use execution_core::executor::OrderExecutor;
use execution_core::models::{
    LiquidityTier, MarketContext, TradeAction, TradeDecision, VolatilityTier,
};
use execution_core::orchestrator::ExecutionOrchestrator;
use execution_core::ports::{PassthroughProtection, PermissiveRiskController};
use execution_core::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config_path = std::env::var("HELM_CONFIG").ok();
    let config = ExecutionConfig::load(config_path.as_deref()).context("loading configuration")?;
    config.validate().context("validating configuration")?;
    tracing::info!(mode = ?config.mode, "execution core starting");

    let (events, mut event_rx) = ChannelEventPublisher::bounded(256);
    let events = Arc::new(events);
    let event_log = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            tracing::info!(event = ?event, "execution event");
        }
    });

    let orchestrator = ExecutionOrchestrator::new(
        config.clone(),
        Arc::new(PermissiveRiskController),
        Arc::new(PassthroughProtection),
    );
    let sweep_interval = std::time::Duration::from_millis(config.fill_check_interval_ms);
    let monitoring = config.enable_real_time_monitoring;
    let executor = Arc::new(OrderExecutor::for_mode(config, None, events));

    let sweeper = monitoring.then(|| {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                executor.sweep_expired().await;
            }
        })
    });

    let decision = TradeDecision {
        id: format!("dec_{}", Uuid::new_v4()),
        symbol: "BTC-USD".to_string(),
        action: TradeAction::Buy,
        quantity: Decimal::from(500),
        confidence: 85.0,
        priority: 1,
        signals: vec![],
        expires_at: Utc::now() + TimeDelta::hours(2),
        reasoning: "demo decision".to_string(),
    };
    let market = MarketContext {
        liquidity: LiquidityTier::Low,
        volatility: VolatilityTier::Normal,
    };

    match orchestrator.orchestrate(&decision, &market).await {
        Ok(plan) => {
            let result = executor.execute_plan(&plan).await;
            tracing::info!(
                order_id = %result.order_id,
                success = result.success,
                fill_quantity = %result.fill_quantity,
                fill_price = ?result.fill_price,
                execution_time_ms = result.execution_time_ms,
                "demo execution finished"
            );
        }
        Err(rejection) => {
            tracing::warn!(stage = %rejection.stage, reasons = ?rejection.reasons, "demo rejected");
        }
    }

    let snapshot = executor.metrics();
    tracing::info!(
        total = snapshot.total,
        success_rate = snapshot.success_rate(),
        average_latency_ms = snapshot.average_latency_ms,
        "execution metrics"
    );

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    event_log.abort();
    Ok(())
}
