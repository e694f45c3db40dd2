//! Venue connection health tracking.
//!
//! Request outcomes and latencies feed a rolling window; the verdict is
//! judged on failure rate alone, with latency reported as a separate signal.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Number of latency samples retained.
const LATENCY_WINDOW: usize = 100;
/// Failure rate at or below which the connection counts as healthy.
const MAX_HEALTHY_FAILURE_RATE: f64 = 0.10;
/// Failure rate at or below which the connection counts as degraded.
const MAX_DEGRADED_FAILURE_RATE: f64 = 0.50;

/// Overall health verdict for a venue connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// Failure rate ≤ 10%.
    Healthy,
    /// Failure rate ≤ 50%.
    Degraded,
    /// Failure rate above 50%.
    Unhealthy,
}

#[derive(Debug, Default)]
struct HealthState {
    latencies: VecDeque<Duration>,
    successes: u64,
    failures: u64,
    last_success: Option<Instant>,
    last_failure: Option<Instant>,
}

/// Point-in-time health snapshot.
#[derive(Debug, Clone, Copy)]
pub struct HealthSnapshot {
    /// Verdict over the current window.
    pub verdict: HealthVerdict,
    /// Failure rate over all recorded requests.
    pub failure_rate: f64,
    /// Complement of the failure rate, `1 - failure_rate`.
    pub uptime: f64,
    /// Mean latency over the window, zero when empty.
    pub average_latency: Duration,
    /// Total requests recorded.
    pub total_requests: u64,
}

/// Rolling health monitor for one venue connection.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    state: Mutex<HealthState>,
}

impl HealthMonitor {
    /// Create a monitor with an empty window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful request and its latency.
    pub fn record_success(&self, latency: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.successes += 1;
            state.last_success = Some(Instant::now());
            Self::push_latency(&mut state, latency);
        }
    }

    /// Record a failed request and its latency.
    pub fn record_failure(&self, latency: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.failures += 1;
            state.last_failure = Some(Instant::now());
            Self::push_latency(&mut state, latency);
        }
    }

    fn push_latency(state: &mut HealthState, latency: Duration) {
        if state.latencies.len() == LATENCY_WINDOW {
            state.latencies.pop_front();
        }
        state.latencies.push_back(latency);
    }

    /// Current health over the window. An empty window is healthy.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        let Ok(state) = self.state.lock() else {
            return HealthSnapshot {
                verdict: HealthVerdict::Unhealthy,
                failure_rate: 1.0,
                uptime: 0.0,
                average_latency: Duration::ZERO,
                total_requests: 0,
            };
        };
        let total = state.successes + state.failures;
        let failure_rate = if total == 0 {
            0.0
        } else {
            state.failures as f64 / total as f64
        };
        let average_latency = if state.latencies.is_empty() {
            Duration::ZERO
        } else {
            state.latencies.iter().sum::<Duration>() / state.latencies.len() as u32
        };
        let verdict = if failure_rate <= MAX_HEALTHY_FAILURE_RATE {
            HealthVerdict::Healthy
        } else if failure_rate <= MAX_DEGRADED_FAILURE_RATE {
            HealthVerdict::Degraded
        } else {
            HealthVerdict::Unhealthy
        };
        HealthSnapshot {
            verdict,
            failure_rate,
            uptime: 1.0 - failure_rate,
            average_latency,
            total_requests: total,
        }
    }

    /// Whether the connection is currently usable (healthy or degraded).
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.snapshot().verdict != HealthVerdict::Unhealthy
    }
}
