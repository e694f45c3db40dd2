//! In-memory venue for tests and paper trading fallback.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::models::OrderSpec;

use super::{
    Balance, ConnectionState, ConnectorCore, MarketData, OrderBook, RateLimiter, ReconnectPolicy,
    TradingFees, VenueConnector, VenueOrderState, VenueOrderStatus,
};

#[derive(Debug, Default)]
struct MockState {
    orders: HashMap<String, VenueOrderState>,
    specs: HashMap<String, OrderSpec>,
    subscriptions: Vec<String>,
    fail_next: Vec<ExecutionError>,
}

/// Deterministic in-memory venue. Orders rest `Open` on placement and fill
/// completely on the first `get_order` poll. Failures can be scripted with
/// [`MockVenueConnector::fail_next`] and are consumed in order, one per
/// request.
pub struct MockVenueConnector {
    core: ConnectorCore,
    state: Mutex<MockState>,
    fill_price: Decimal,
}

impl MockVenueConnector {
    /// Create a mock venue filling everything at the given price.
    #[must_use]
    pub fn new(fill_price: Decimal) -> Self {
        Self {
            core: ConnectorCore::new(
                RateLimiter::new(100, 1_000, Duration::from_millis(1_000)),
                ReconnectPolicy::default(),
            ),
            state: Mutex::new(MockState::default()),
            fill_price,
        }
    }

    /// Queue an error to be returned by the next request.
    pub fn fail_next(&self, error: ExecutionError) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next.push(error);
        }
    }

    /// Symbols with an active subscription.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.subscriptions.clone())
            .unwrap_or_default()
    }

    fn take_scripted_failure(&self) -> Option<ExecutionError> {
        self.state.lock().ok().and_then(|mut s| {
            if s.fail_next.is_empty() {
                None
            } else {
                Some(s.fail_next.remove(0))
            }
        })
    }

    fn checked<T>(&self, value: T) -> Result<T, ExecutionError> {
        match self.take_scripted_failure() {
            Some(error) => Err(error),
            None => Ok(value),
        }
    }
}

#[async_trait]
impl VenueConnector for MockVenueConnector {
    fn name(&self) -> &str {
        "mock"
    }

    fn core(&self) -> &ConnectorCore {
        &self.core
    }

    async fn connect(&self) -> Result<(), ExecutionError> {
        self.checked(())?;
        self.core.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExecutionError> {
        self.core.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn place_order(&self, spec: &OrderSpec) -> Result<VenueOrderState, ExecutionError> {
        let spec = spec.clone();
        let result = async {
            self.checked(())?;
            let venue_order_id = format!("mock_{}", Uuid::new_v4());
            let state = VenueOrderState {
                venue_order_id: venue_order_id.clone(),
                symbol: spec.symbol.clone(),
                status: VenueOrderStatus::Open,
                filled_quantity: Decimal::ZERO,
                average_price: None,
                fees: Decimal::ZERO,
            };
            if let Ok(mut inner) = self.state.lock() {
                inner.orders.insert(venue_order_id.clone(), state.clone());
                inner.specs.insert(venue_order_id, spec);
            }
            Ok(state)
        };
        self.core.execute_request("place_order", result).await
    }

    async fn cancel_order(&self, venue_order_id: &str) -> Result<(), ExecutionError> {
        let result = async {
            self.checked(())?;
            let Ok(mut inner) = self.state.lock() else {
                return Ok(());
            };
            match inner.orders.get_mut(venue_order_id) {
                Some(order) if order.status == VenueOrderStatus::Open => {
                    order.status = VenueOrderStatus::Cancelled;
                    Ok(())
                }
                Some(_) => Err(ExecutionError::VenueRejection(
                    "order no longer cancellable".to_string(),
                )),
                None => Err(ExecutionError::VenueRejection(format!(
                    "unknown order {venue_order_id}"
                ))),
            }
        };
        self.core.execute_request("cancel_order", result).await
    }

    async fn get_order(&self, venue_order_id: &str) -> Result<VenueOrderState, ExecutionError> {
        let result = async {
            self.checked(())?;
            let Ok(mut inner) = self.state.lock() else {
                return Err(ExecutionError::Internal("state poisoned".to_string()));
            };
            let quantity = inner
                .specs
                .get(venue_order_id)
                .map(|s| s.quantity)
                .unwrap_or_default();
            let fill_price = self.fill_price;
            match inner.orders.get_mut(venue_order_id) {
                Some(order) => {
                    // Open orders fill completely on the first poll.
                    if order.status == VenueOrderStatus::Open {
                        order.status = VenueOrderStatus::Filled;
                        order.filled_quantity = quantity;
                        order.average_price = Some(fill_price);
                        order.fees = quantity * fill_price * Decimal::new(1, 3);
                    }
                    Ok(order.clone())
                }
                None => Err(ExecutionError::VenueRejection(format!(
                    "unknown order {venue_order_id}"
                ))),
            }
        };
        self.core.execute_request("get_order", result).await
    }

    async fn balances(&self) -> Result<Vec<Balance>, ExecutionError> {
        let result = async {
            self.checked(vec![Balance {
                asset: "USD".to_string(),
                free: Decimal::new(1_000_000, 0),
                locked: Decimal::ZERO,
            }])
        };
        self.core.execute_request("balances", result).await
    }

    async fn trading_fees(&self, _symbol: &str) -> Result<TradingFees, ExecutionError> {
        let result = async {
            self.checked(TradingFees {
                maker_rate: Decimal::new(1, 3),
                taker_rate: Decimal::new(2, 3),
            })
        };
        self.core.execute_request("trading_fees", result).await
    }

    async fn market_data(&self, symbol: &str) -> Result<MarketData, ExecutionError> {
        let spread = self.fill_price * Decimal::new(1, 4);
        let result = async {
            self.checked(MarketData {
                symbol: symbol.to_string(),
                bid: self.fill_price - spread,
                ask: self.fill_price + spread,
                last: self.fill_price,
                timestamp: Utc::now(),
            })
        };
        self.core.execute_request("market_data", result).await
    }

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, ExecutionError> {
        let result = async {
            let tick = self.fill_price * Decimal::new(1, 4);
            let levels = depth.min(10);
            let bids = (1..=levels)
                .map(|i| {
                    (
                        self.fill_price - tick * Decimal::from(i),
                        Decimal::new(100, 0),
                    )
                })
                .collect();
            let asks = (1..=levels)
                .map(|i| {
                    (
                        self.fill_price + tick * Decimal::from(i),
                        Decimal::new(100, 0),
                    )
                })
                .collect();
            self.checked(OrderBook {
                symbol: symbol.to_string(),
                bids,
                asks,
                timestamp: Utc::now(),
            })
        };
        self.core.execute_request("order_book", result).await
    }

    async fn subscribe(&self, symbol: &str) -> Result<(), ExecutionError> {
        self.checked(())?;
        if let Ok(mut inner) = self.state.lock()
            && !inner.subscriptions.iter().any(|s| s == symbol)
        {
            inner.subscriptions.push(symbol.to_string());
        }
        Ok(())
    }

    async fn unsubscribe(&self, symbol: &str) -> Result<(), ExecutionError> {
        if let Ok(mut inner) = self.state.lock() {
            inner.subscriptions.retain(|s| s != symbol);
        }
        Ok(())
    }
}
