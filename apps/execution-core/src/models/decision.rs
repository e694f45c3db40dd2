//! Trade decisions and strategy signals consumed by the orchestrator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade decision or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    /// Buy / go long.
    Buy,
    /// Sell / go short.
    Sell,
}

impl TradeAction {
    /// Returns true if the two actions oppose each other.
    #[must_use]
    pub const fn opposes(&self, other: &Self) -> bool {
        !matches!(
            (self, other),
            (Self::Buy, Self::Buy) | (Self::Sell, Self::Sell)
        )
    }
}

/// Priority of a strategy signal, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalPriority {
    /// Background interest, lowest urgency.
    Low,
    /// Default urgency.
    Medium,
    /// Act soon.
    High,
    /// Act now, highest urgency.
    Critical,
}

impl SignalPriority {
    /// Numeric rank used for ordering (critical highest).
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

/// Kind of signal a strategy emitted. Signals only merge within the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Trend-following entry.
    Momentum,
    /// Mean-reversion entry.
    MeanReversion,
    /// Breakout entry.
    Breakout,
    /// Position exit.
    Exit,
}

/// A single signal emitted by an upstream strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySignal {
    /// Unique signal id.
    pub id: String,
    /// Emitting strategy id.
    pub strategy_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Signal kind.
    pub kind: SignalKind,
    /// Trade direction.
    pub action: TradeAction,
    /// Confidence 0-100.
    pub confidence: f64,
    /// Signal priority.
    pub priority: SignalPriority,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Free-form strategy conditions attached to the signal.
    #[serde(default)]
    pub conditions: HashMap<String, serde_json::Value>,
}

/// A strategy's trade decision, produced upstream and consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDecision {
    /// Unique decision id.
    pub id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub action: TradeAction,
    /// Total quantity to execute.
    pub quantity: Decimal,
    /// Confidence 0-100.
    pub confidence: f64,
    /// Numeric urgency; 3 and above executes immediately.
    pub priority: u8,
    /// Contributing signals, possibly conflicting.
    #[serde(default)]
    pub signals: Vec<StrategySignal>,
    /// Decision expiry.
    pub expires_at: DateTime<Utc>,
    /// Human-readable rationale.
    pub reasoning: String,
}

impl TradeDecision {
    /// Milliseconds until this decision expires, zero if already expired.
    #[must_use]
    pub fn time_to_expiry_ms(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_milliseconds().max(0)
    }
}

/// Market liquidity tier, supplied alongside a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTier {
    /// Thin book.
    Low,
    /// Typical conditions.
    Normal,
    /// Deep book.
    High,
}

/// Market volatility tier, supplied alongside a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityTier {
    /// Calm.
    Low,
    /// Typical conditions.
    Normal,
    /// Elevated volatility.
    High,
}

/// Market conditions the strategy selector and protection checks consume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketContext {
    /// Current liquidity tier.
    pub liquidity: LiquidityTier,
    /// Current volatility tier.
    pub volatility: VolatilityTier,
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            liquidity: LiquidityTier::Normal,
            volatility: VolatilityTier::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    #[test]
    fn trade_action_opposes() {
        assert!(TradeAction::Buy.opposes(&TradeAction::Sell));
        assert!(TradeAction::Sell.opposes(&TradeAction::Buy));
        assert!(!TradeAction::Buy.opposes(&TradeAction::Buy));
    }

    #[test]
    fn signal_priority_ordering() {
        assert!(SignalPriority::Critical.rank() > SignalPriority::High.rank());
        assert!(SignalPriority::High.rank() > SignalPriority::Medium.rank());
        assert!(SignalPriority::Medium.rank() > SignalPriority::Low.rank());
    }

    #[test]
    fn time_to_expiry_clamps_at_zero() {
        let now = Utc::now();
        let decision = TradeDecision {
            id: "d1".to_string(),
            symbol: "BTC-USD".to_string(),
            action: TradeAction::Buy,
            quantity: dec!(100),
            confidence: 90.0,
            priority: 1,
            signals: vec![],
            expires_at: now - TimeDelta::seconds(10),
            reasoning: "test".to_string(),
        };

        assert_eq!(decision.time_to_expiry_ms(now), 0);
    }
}
