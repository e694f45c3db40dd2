//! Venue connectivity.
//!
//! [`VenueConnector`] is the seam between the executor and a concrete trading
//! venue. Implementations wrap every remote call in
//! [`ConnectorCore::execute_request`], which provides rate limiting, latency
//! and outcome recording, and connection-state management. Reconnection is a
//! default trait method driven by [`ReconnectPolicy`].

mod health;
mod mock;
mod rate_limit;
mod reconnect;

pub use health::{HealthMonitor, HealthSnapshot, HealthVerdict};
pub use mock::MockVenueConnector;
pub use rate_limit::RateLimiter;
pub use reconnect::ReconnectPolicy;

use std::fmt;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::models::OrderSpec;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected, no reconnect in progress.
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Connected and serving requests.
    Connected,
    /// A connection-class failure occurred.
    Error,
    /// Backoff wait before the next connection attempt.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Venue-side status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueOrderStatus {
    /// Accepted, resting on the venue.
    Open,
    /// Partially executed.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Cancelled on the venue.
    Cancelled,
    /// Rejected by the venue.
    Rejected,
}

/// Snapshot of an order as the venue sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueOrderState {
    /// Venue-assigned order id.
    pub venue_order_id: String,
    /// Symbol the order trades.
    pub symbol: String,
    /// Venue-side status.
    pub status: VenueOrderStatus,
    /// Quantity filled so far.
    pub filled_quantity: Decimal,
    /// Volume-weighted average fill price, when any fill exists.
    pub average_price: Option<Decimal>,
    /// Fees charged so far.
    pub fees: Decimal,
}

/// One asset balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Asset code.
    pub asset: String,
    /// Freely usable amount.
    pub free: Decimal,
    /// Amount locked in open orders.
    pub locked: Decimal,
}

/// Maker/taker fee schedule for a symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradingFees {
    /// Maker fee rate as a fraction.
    pub maker_rate: Decimal,
    /// Taker fee rate as a fraction.
    pub taker_rate: Decimal,
}

/// Top-of-book market data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    /// Symbol.
    pub symbol: String,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Last trade price.
    pub last: Decimal,
    /// Snapshot time.
    pub timestamp: DateTime<Utc>,
}

/// Order book snapshot, price/quantity levels sorted best-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    /// Symbol.
    pub symbol: String,
    /// Bid levels, highest price first.
    pub bids: Vec<(Decimal, Decimal)>,
    /// Ask levels, lowest price first.
    pub asks: Vec<(Decimal, Decimal)>,
    /// Snapshot time.
    pub timestamp: DateTime<Utc>,
}

/// Shared connector plumbing: rate limiter, health monitor, connection state,
/// and reconnect bookkeeping.
#[derive(Debug)]
pub struct ConnectorCore {
    state: RwLock<ConnectionState>,
    limiter: RateLimiter,
    health: HealthMonitor,
    policy: ReconnectPolicy,
    reconnect_attempts: AtomicU32,
}

impl ConnectorCore {
    /// Create a core in the disconnected state.
    #[must_use]
    pub fn new(limiter: RateLimiter, policy: ReconnectPolicy) -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            limiter,
            health: HealthMonitor::new(),
            policy,
            reconnect_attempts: AtomicU32::new(0),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Error)
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        if let Ok(mut guard) = self.state.write() {
            *guard = state;
        }
        if state == ConnectionState::Connected {
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// The health monitor.
    #[must_use]
    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// The reconnect policy.
    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Reconnect attempts since the last successful connect.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    fn next_reconnect_attempt(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Run a remote request of unit weight through the shared plumbing.
    ///
    /// Waits for a rate-limit slot on `endpoint`'s window rather than
    /// failing, records latency and outcome on the health monitor
    /// unconditionally, and flips the state to [`ConnectionState::Error`] on
    /// a connection-class failure before re-raising it.
    pub async fn execute_request<T, Fut>(
        &self,
        endpoint: &str,
        request: Fut,
    ) -> Result<T, ExecutionError>
    where
        Fut: Future<Output = Result<T, ExecutionError>> + Send,
    {
        self.execute_weighted_request(endpoint, 1, request).await
    }

    /// [`Self::execute_request`] with an explicit request weight, for venues
    /// whose limits are weight-based.
    pub async fn execute_weighted_request<T, Fut>(
        &self,
        endpoint: &str,
        weight: u32,
        request: Fut,
    ) -> Result<T, ExecutionError>
    where
        Fut: Future<Output = Result<T, ExecutionError>> + Send,
    {
        self.limiter.acquire(endpoint, weight).await;
        let start = Instant::now();
        let result = request.await;
        let latency = start.elapsed();
        match &result {
            Ok(_) => self.health.record_success(latency),
            Err(error) => {
                self.health.record_failure(latency);
                if error.is_connection() {
                    tracing::warn!(
                        endpoint,
                        error = %error,
                        "connection-class failure, marking connection errored"
                    );
                    self.set_state(ConnectionState::Error);
                }
            }
        }
        result
    }
}

/// Abstract trading venue.
#[async_trait]
pub trait VenueConnector: Send + Sync {
    /// Venue name for logs and result metadata.
    fn name(&self) -> &str;

    /// Shared connector plumbing.
    fn core(&self) -> &ConnectorCore;

    /// Establish the venue session.
    async fn connect(&self) -> Result<(), ExecutionError>;

    /// Tear down the venue session.
    async fn disconnect(&self) -> Result<(), ExecutionError>;

    /// Place an order, returning the venue's view of it.
    async fn place_order(&self, spec: &OrderSpec) -> Result<VenueOrderState, ExecutionError>;

    /// Cancel an order by venue id.
    async fn cancel_order(&self, venue_order_id: &str) -> Result<(), ExecutionError>;

    /// Fetch the venue's current view of an order.
    async fn get_order(&self, venue_order_id: &str) -> Result<VenueOrderState, ExecutionError>;

    /// Account balances.
    async fn balances(&self) -> Result<Vec<Balance>, ExecutionError>;

    /// Fee schedule for a symbol.
    async fn trading_fees(&self, symbol: &str) -> Result<TradingFees, ExecutionError>;

    /// Top-of-book data for a symbol.
    async fn market_data(&self, symbol: &str) -> Result<MarketData, ExecutionError>;

    /// Order book snapshot for a symbol.
    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, ExecutionError>;

    /// Subscribe to streaming market data for a symbol.
    async fn subscribe(&self, symbol: &str) -> Result<(), ExecutionError>;

    /// Drop a streaming subscription.
    async fn unsubscribe(&self, symbol: &str) -> Result<(), ExecutionError>;

    /// Current connection state.
    fn state(&self) -> ConnectionState {
        self.core().state()
    }

    /// Point-in-time health over the request window.
    fn health_check(&self) -> HealthSnapshot {
        self.core().health().snapshot()
    }

    /// Drive the connection back to [`ConnectionState::Connected`], applying
    /// the backoff schedule. Exhausting the attempt budget halts
    /// auto-reconnect and surfaces a connection error.
    async fn ensure_connected(&self) -> Result<(), ExecutionError> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }
        let core = self.core();
        loop {
            let attempt = core.next_reconnect_attempt();
            let Some(delay) = core.policy().delay_for(attempt) else {
                core.set_state(ConnectionState::Disconnected);
                return Err(ExecutionError::Connection(format!(
                    "reconnect attempts exhausted after {} tries",
                    core.policy().max_attempts
                )));
            };
            if attempt > 1 {
                core.set_state(ConnectionState::Reconnecting);
                tokio::time::sleep(delay).await;
            }
            core.set_state(ConnectionState::Connecting);
            match self.connect().await {
                Ok(()) => {
                    core.set_state(ConnectionState::Connected);
                    tracing::info!(venue = self.name(), attempt, "venue connected");
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!(
                        venue = self.name(),
                        attempt,
                        error = %error,
                        "venue connect attempt failed"
                    );
                    core.set_state(ConnectionState::Error);
                }
            }
        }
    }
}
