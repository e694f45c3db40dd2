//! Per-mode execution backends.
//!
//! `ModeExecutor` is the dispatch seam: the order executor picks one backend
//! at construction and never branches on the mode again. Paper and backtest
//! fill against a deterministic pseudo price; live places through a
//! [`VenueConnector`] and polls for fills with a bounded budget.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::config::{ExecutionConfig, PaperTradingConfig};
use crate::error::ExecutionError;
use crate::models::{Order, OrderSide};
use crate::venue::{VenueConnector, VenueOrderStatus};

/// Result of one backend execution.
#[derive(Debug, Clone)]
pub struct FillOutcome {
    /// Quantity filled, possibly zero.
    pub filled_quantity: Decimal,
    /// Average fill price when anything filled.
    pub average_price: Option<Decimal>,
    /// Fees charged.
    pub fees: Decimal,
    /// Venue-assigned id, when a venue was involved.
    pub venue_order_id: Option<String>,
    /// Realized slippage as a percentage of the reference price.
    pub slippage_pct: f64,
    /// Backend label for result metadata.
    pub execution_path: &'static str,
}

/// Execution backend for one mode.
#[async_trait]
pub trait ModeExecutor: Send + Sync {
    /// Execute a single order to completion.
    async fn execute(&self, order: &Order) -> Result<FillOutcome, ExecutionError>;

    /// Attempt a remote cancel. Backends without a remote leg succeed
    /// trivially.
    async fn cancel(&self, venue_order_id: Option<&str>) -> Result<(), ExecutionError>;
}

/// Deterministic per-symbol reference price. Hashing keeps the simulator free
/// of market data while giving each symbol a stable, distinct price.
#[must_use]
pub fn pseudo_price(symbol: &str) -> Decimal {
    let mut hasher = DefaultHasher::new();
    symbol.hash(&mut hasher);
    let base = 100 + (hasher.finish() % 49_900);
    Decimal::from(base)
}

/// Paper trading simulator: fills fully at the pseudo price adjusted for
/// spread and randomized slippage, after a configured latency.
pub struct PaperExecutor {
    config: PaperTradingConfig,
}

impl PaperExecutor {
    /// Create a simulator with the given paper-trading parameters.
    #[must_use]
    pub fn new(config: PaperTradingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModeExecutor for PaperExecutor {
    async fn execute(&self, order: &Order) -> Result<FillOutcome, ExecutionError> {
        tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;

        let reference = pseudo_price(&order.spec.symbol);
        let slippage_pct = if self.config.slippage_pct > 0.0 {
            rand::rng().random_range(0.0..self.config.slippage_pct)
        } else {
            0.0
        };
        // Buys cross the spread upward, sells downward.
        let adjustment_pct = match order.spec.side {
            OrderSide::Buy => self.config.spread_pct / 2.0 + slippage_pct,
            OrderSide::Sell => -(self.config.spread_pct / 2.0 + slippage_pct),
        };
        let factor = Decimal::from_f64(1.0 + adjustment_pct / 100.0)
            .unwrap_or(Decimal::ONE);
        let price = (reference * factor).round_dp(8);
        let fees = (order.spec.quantity * price * Decimal::new(1, 3)).round_dp(8);

        Ok(FillOutcome {
            filled_quantity: order.spec.quantity,
            average_price: Some(price),
            fees,
            venue_order_id: None,
            slippage_pct,
            execution_path: "paper",
        })
    }

    async fn cancel(&self, _venue_order_id: Option<&str>) -> Result<(), ExecutionError> {
        Ok(())
    }
}

/// Deterministic backtest backend: immediate full fill at the pseudo price,
/// no latency, no slippage.
#[derive(Debug, Default)]
pub struct BacktestExecutor;

#[async_trait]
impl ModeExecutor for BacktestExecutor {
    async fn execute(&self, order: &Order) -> Result<FillOutcome, ExecutionError> {
        let price = pseudo_price(&order.spec.symbol);
        Ok(FillOutcome {
            filled_quantity: order.spec.quantity,
            average_price: Some(price),
            fees: Decimal::ZERO,
            venue_order_id: None,
            slippage_pct: 0.0,
            execution_path: "backtest",
        })
    }

    async fn cancel(&self, _venue_order_id: Option<&str>) -> Result<(), ExecutionError> {
        Ok(())
    }
}

/// Live backend: places through the venue connector and polls until the
/// venue reports a terminal state or the order timeout elapses.
pub struct LiveExecutor {
    venue: Arc<dyn VenueConnector>,
    retry_attempts: u32,
    retry_delay: Duration,
    fill_check_interval: Duration,
    order_timeout: Duration,
}

impl LiveExecutor {
    /// Create a live backend over a connector.
    #[must_use]
    pub fn new(venue: Arc<dyn VenueConnector>, config: &ExecutionConfig) -> Self {
        Self {
            venue,
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            fill_check_interval: Duration::from_millis(config.fill_check_interval_ms),
            order_timeout: Duration::from_millis(config.order_timeout_ms),
        }
    }

    /// Place with retries. Only connection-class failures are retried;
    /// validation errors and venue rejections surface immediately.
    async fn place_with_retries(
        &self,
        order: &Order,
    ) -> Result<crate::venue::VenueOrderState, ExecutionError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.venue.ensure_connected().await?;
            match self.venue.place_order(&order.spec).await {
                Ok(state) => return Ok(state),
                Err(error) if error.is_connection() && attempt <= self.retry_attempts => {
                    tracing::warn!(
                        order_id = %order.id,
                        attempt,
                        error = %error,
                        "placement failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl ModeExecutor for LiveExecutor {
    async fn execute(&self, order: &Order) -> Result<FillOutcome, ExecutionError> {
        let placed = self.place_with_retries(order).await?;
        let venue_order_id = placed.venue_order_id.clone();
        let reference = self
            .venue
            .market_data(&order.spec.symbol)
            .await
            .map(|m| m.last)
            .unwrap_or_default();

        let deadline = tokio::time::Instant::now() + self.order_timeout;
        let mut last = placed;
        while !matches!(
            last.status,
            VenueOrderStatus::Filled | VenueOrderStatus::Cancelled | VenueOrderStatus::Rejected
        ) {
            if tokio::time::Instant::now() >= deadline {
                return Err(ExecutionError::Timeout(format!(
                    "order {} not terminal after {:?}",
                    order.id, self.order_timeout
                )));
            }
            tokio::time::sleep(self.fill_check_interval).await;
            last = self.venue.get_order(&venue_order_id).await?;
        }

        if last.status == VenueOrderStatus::Rejected {
            return Err(ExecutionError::VenueRejection(format!(
                "venue rejected order {venue_order_id}"
            )));
        }

        let slippage_pct = match (last.average_price, reference > Decimal::ZERO) {
            (Some(price), true) => {
                let diff = (price - reference) / reference * Decimal::ONE_HUNDRED;
                diff.abs().to_f64().unwrap_or(0.0)
            }
            _ => 0.0,
        };

        Ok(FillOutcome {
            filled_quantity: last.filled_quantity,
            average_price: last.average_price,
            fees: last.fees,
            venue_order_id: Some(venue_order_id),
            slippage_pct,
            execution_path: "live",
        })
    }

    async fn cancel(&self, venue_order_id: Option<&str>) -> Result<(), ExecutionError> {
        match venue_order_id {
            Some(id) => self.venue.cancel_order(id).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSpec, OrderType, TimeInForce};
    use crate::venue::MockVenueConnector;
    use rust_decimal_macros::dec;

    fn order(symbol: &str, side: OrderSide) -> Order {
        Order::new(
            "o1".to_string(),
            "p1".to_string(),
            OrderSpec {
                symbol: symbol.to_string(),
                side,
                order_type: OrderType::Market,
                quantity: dec!(3),
                limit_price: None,
                time_in_force: TimeInForce::Gtc,
            },
        )
    }

    #[test]
    fn pseudo_price_is_stable_per_symbol() {
        assert_eq!(pseudo_price("BTC-USD"), pseudo_price("BTC-USD"));
        assert!(pseudo_price("BTC-USD") >= Decimal::from(100));
    }

    #[tokio::test]
    async fn paper_buy_fills_above_reference() {
        let executor = PaperExecutor::new(PaperTradingConfig {
            spread_pct: 0.1,
            slippage_pct: 0.0,
            latency_ms: 0,
        });
        let outcome = executor.execute(&order("BTC-USD", OrderSide::Buy)).await.unwrap();

        assert_eq!(outcome.filled_quantity, dec!(3));
        assert!(outcome.average_price.unwrap() > pseudo_price("BTC-USD"));
        assert!(outcome.fees > Decimal::ZERO);
    }

    #[tokio::test]
    async fn paper_sell_fills_below_reference() {
        let executor = PaperExecutor::new(PaperTradingConfig {
            spread_pct: 0.1,
            slippage_pct: 0.0,
            latency_ms: 0,
        });
        let outcome = executor.execute(&order("BTC-USD", OrderSide::Sell)).await.unwrap();
        assert!(outcome.average_price.unwrap() < pseudo_price("BTC-USD"));
    }

    #[tokio::test]
    async fn backtest_fills_at_reference_without_fees() {
        let executor = BacktestExecutor;
        let outcome = executor.execute(&order("ETH-USD", OrderSide::Buy)).await.unwrap();
        assert_eq!(outcome.average_price, Some(pseudo_price("ETH-USD")));
        assert_eq!(outcome.fees, Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn live_polls_until_filled() {
        let venue = Arc::new(MockVenueConnector::new(dec!(50_000)));
        venue.connect().await.unwrap();
        let executor = LiveExecutor::new(venue, &ExecutionConfig::default());

        let outcome = executor.execute(&order("BTC-USD", OrderSide::Buy)).await.unwrap();
        assert_eq!(outcome.filled_quantity, dec!(3));
        assert_eq!(outcome.execution_path, "live");
        assert!(outcome.venue_order_id.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn live_retries_connection_failures_on_placement() {
        let venue = Arc::new(MockVenueConnector::new(dec!(100)));
        venue.connect().await.unwrap();
        venue.fail_next(ExecutionError::Connection("network blip".to_string()));
        let executor = LiveExecutor::new(Arc::clone(&venue) as Arc<dyn VenueConnector>, &ExecutionConfig::default());

        let outcome = executor.execute(&order("BTC-USD", OrderSide::Buy)).await.unwrap();
        assert_eq!(outcome.filled_quantity, dec!(3));
    }

    #[tokio::test]
    async fn live_does_not_retry_venue_rejection() {
        let venue = Arc::new(MockVenueConnector::new(dec!(100)));
        venue.connect().await.unwrap();
        venue.fail_next(ExecutionError::VenueRejection("insufficient funds".to_string()));
        let executor = LiveExecutor::new(Arc::clone(&venue) as Arc<dyn VenueConnector>, &ExecutionConfig::default());

        let err = executor.execute(&order("BTC-USD", OrderSide::Buy)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::VenueRejection(_)));
    }
}
