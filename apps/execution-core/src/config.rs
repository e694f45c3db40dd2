//! Configuration for the execution core.
//!
//! Loads from an optional file plus `HELM_`-prefixed environment variables
//! (`HELM_MODE=live`, `HELM_VENUE__PRIMARY=mock`, ...). All fields carry
//! defaults so an empty environment yields a usable paper-trading setup.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Loading or deserialization failed.
    #[error("failed to load config: {0}")]
    LoadError(#[from] config::ConfigError),

    /// A loaded value failed validation.
    #[error("config validation failed: {0}")]
    ValidationError(String),
}

/// Execution mode dispatched by the order executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Simulated fills against a synthetic book.
    Paper,
    /// Real orders on a venue connector.
    Live,
    /// Alias of paper with explicit intent.
    Simulation,
    /// Deterministic fills for backtests.
    Backtest,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Paper
    }
}

/// Paper-trading fill simulation knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperTradingConfig {
    /// Simulated half-spread, percent.
    pub spread_pct: f64,
    /// Simulated slippage, percent.
    pub slippage_pct: f64,
    /// Simulated venue latency, milliseconds.
    pub latency_ms: u64,
}

impl Default for PaperTradingConfig {
    fn default() -> Self {
        Self {
            spread_pct: 0.05,
            slippage_pct: 0.1,
            latency_ms: 25,
        }
    }
}

/// Venue selection and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueSettings {
    /// Primary venue name.
    pub primary: String,
    /// Fallback venue, used when the primary has no connector.
    pub fallback: Option<String>,
    /// API key for the primary venue.
    pub api_key: Option<String>,
    /// API secret for the primary venue.
    pub api_secret: Option<String>,
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            primary: "mock".to_string(),
            fallback: None,
            api_key: None,
            api_secret: None,
        }
    }
}

/// Root execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Placement retries for connection-class failures (live mode).
    pub retry_attempts: u32,
    /// Delay between placement retries, milliseconds.
    pub retry_delay_ms: u64,
    /// Maximum tolerated slippage, percent.
    pub max_slippage_pct: f64,
    /// Latency budget per order, milliseconds.
    pub max_latency_ms: u64,
    /// Route to the best venue when multiple are configured.
    pub enable_smart_routing: bool,
    /// Largest single order quantity accepted.
    pub max_order_size: Decimal,
    /// Daily cumulative volume ceiling.
    pub max_daily_volume: Decimal,
    /// Enforce order-size and daily-volume limits.
    pub enable_position_limits: bool,
    /// Paper-trading simulation knobs.
    pub paper: PaperTradingConfig,
    /// Venue selection and credentials.
    pub venue: VenueSettings,
    /// Run the periodic order timeout sweep.
    pub enable_real_time_monitoring: bool,
    /// Age after which an active order is expired, milliseconds.
    pub order_timeout_ms: u64,
    /// Fill polling interval, milliseconds.
    pub fill_check_interval_ms: u64,
    /// Total units in the execution capacity pool.
    pub execution_capacity: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            retry_attempts: 3,
            retry_delay_ms: 500,
            max_slippage_pct: 1.0,
            max_latency_ms: 1_000,
            enable_smart_routing: false,
            max_order_size: Decimal::new(100_000, 0),
            max_daily_volume: Decimal::new(1_000_000, 0),
            enable_position_limits: true,
            paper: PaperTradingConfig::default(),
            venue: VenueSettings::default(),
            enable_real_time_monitoring: true,
            order_timeout_ms: 300_000,
            fill_check_interval_ms: 1_000,
            execution_capacity: 50,
        }
    }
}

impl ExecutionConfig {
    /// Load configuration from an optional file plus `HELM_` environment
    /// variables; environment wins.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let loaded: Self = builder
            .add_source(
                config::Environment::with_prefix("HELM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_order_size <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "max_order_size must be positive".to_string(),
            ));
        }
        if self.max_daily_volume < self.max_order_size {
            return Err(ConfigError::ValidationError(
                "max_daily_volume must be at least max_order_size".to_string(),
            ));
        }
        if self.fill_check_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "fill_check_interval_ms must be positive".to_string(),
            ));
        }
        if self.order_timeout_ms < self.fill_check_interval_ms {
            return Err(ConfigError::ValidationError(
                "order_timeout_ms must be at least fill_check_interval_ms".to_string(),
            ));
        }
        if self.execution_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "execution_capacity must be positive".to_string(),
            ));
        }
        if self.mode == ExecutionMode::Live
            && self.venue.primary != "mock"
            && (self.venue.api_key.is_none() || self.venue.api_secret.is_none())
        {
            return Err(ConfigError::ValidationError(format!(
                "live mode against venue '{}' requires api_key and api_secret",
                self.venue.primary
            )));
        }
        Ok(())
    }
}
