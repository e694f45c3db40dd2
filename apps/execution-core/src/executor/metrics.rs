//! Execution metrics.
//!
//! Running totals plus online averages, mirrored to the `metrics` facade for
//! whatever recorder the binary installs. The latency average uses the
//! incremental formula `avg' = (avg * (n - 1) + sample) / n`; slippage and
//! fees are averaged over successful executions only.

use std::sync::Mutex;

use metrics::{counter, histogram};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Snapshot of the running execution metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Executions recorded, success or failure.
    pub total: u64,
    /// Successful executions.
    pub successes: u64,
    /// Failed executions.
    pub failures: u64,
    /// Online average latency over all executions, in milliseconds.
    pub average_latency_ms: f64,
    /// Average slippage percentage over successes.
    pub average_slippage_pct: f64,
    /// Average fees over successes.
    pub average_fees: f64,
}

impl MetricsSnapshot {
    /// Success rate in `[0, 1]`, zero when nothing was recorded.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }
}

/// Thread-safe execution metrics accumulator.
#[derive(Debug, Default)]
pub struct ExecutionMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl ExecutionMetrics {
    /// Create a zeroed accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful execution.
    pub fn record_success(&self, latency_ms: u64, slippage_pct: f64, fees: Decimal) {
        counter!("execution_orders_total", "outcome" => "success").increment(1);
        histogram!("execution_latency_ms").record(latency_ms as f64);
        let fees = fees.to_f64().unwrap_or(0.0);
        if let Ok(mut m) = self.inner.lock() {
            m.total += 1;
            m.successes += 1;
            m.average_latency_ms = Self::online_average(m.average_latency_ms, m.total, latency_ms as f64);
            m.average_slippage_pct =
                Self::online_average(m.average_slippage_pct, m.successes, slippage_pct);
            m.average_fees = Self::online_average(m.average_fees, m.successes, fees);
        }
    }

    /// Record one failed execution.
    pub fn record_failure(&self, latency_ms: u64) {
        counter!("execution_orders_total", "outcome" => "failure").increment(1);
        histogram!("execution_latency_ms").record(latency_ms as f64);
        if let Ok(mut m) = self.inner.lock() {
            m.total += 1;
            m.failures += 1;
            m.average_latency_ms = Self::online_average(m.average_latency_ms, m.total, latency_ms as f64);
        }
    }

    fn online_average(current: f64, n: u64, sample: f64) -> f64 {
        (current * (n - 1) as f64 + sample) / n as f64
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn online_latency_average_matches_arithmetic_mean() {
        let metrics = ExecutionMetrics::new();
        metrics.record_success(10, 0.0, Decimal::ZERO);
        metrics.record_success(20, 0.0, Decimal::ZERO);
        metrics.record_failure(60);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total, 3);
        assert!((snapshot.average_latency_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn slippage_and_fees_average_over_successes_only() {
        let metrics = ExecutionMetrics::new();
        metrics.record_success(10, 0.2, dec!(4));
        metrics.record_failure(10);
        metrics.record_success(10, 0.4, dec!(6));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.successes, 2);
        assert_eq!(snapshot.failures, 1);
        assert!((snapshot.average_slippage_pct - 0.3).abs() < 1e-9);
        assert!((snapshot.average_fees - 5.0).abs() < 1e-9);
    }

    #[test]
    fn success_rate_handles_empty() {
        assert!(ExecutionMetrics::new().snapshot().success_rate().abs() < f64::EPSILON);
    }
}
