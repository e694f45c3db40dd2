//! Per-endpoint sliding-window request rate limiting.
//!
//! Each endpoint gets its own window; a request is admitted only while both
//! the request count and the accumulated request weight inside the window
//! stay under their limits. Entries are pruned lazily on access.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window rate limiter keyed by endpoint: at most `max_requests`
/// requests and `max_weight` accumulated weight per endpoint within any
/// window of `window` length.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    max_weight: u32,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<(Instant, u32)>>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` requests and `max_weight`
    /// total weight per endpoint per `window`.
    #[must_use]
    pub fn new(max_requests: usize, max_weight: u32, window: Duration) -> Self {
        Self {
            max_requests,
            max_weight,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Try to admit one request of `weight` against `endpoint`'s window.
    /// Returns `Ok(())` when under both limits, or the wait until the oldest
    /// in-window entry falls out (`reset = oldest + window`).
    pub fn try_acquire(&self, endpoint: &str, weight: u32) -> Result<(), Duration> {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            return Ok(());
        };
        let entries = windows.entry(endpoint.to_string()).or_default();
        while let Some((oldest, _)) = entries.front() {
            if now.duration_since(*oldest) >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }
        let in_window_weight: u32 = entries.iter().map(|(_, w)| w).sum();
        if entries.len() < self.max_requests && in_window_weight + weight <= self.max_weight {
            entries.push_back((now, weight));
            return Ok(());
        }
        let oldest = entries.front().map_or(now, |(ts, _)| *ts);
        let elapsed = now.duration_since(oldest);
        Err(self.window.saturating_sub(elapsed))
    }

    /// Admit a request of `weight` against `endpoint`, sleeping until both
    /// limits allow it.
    pub async fn acquire(&self, endpoint: &str, weight: u32) {
        loop {
            match self.try_acquire(endpoint, weight) {
                Ok(()) => return,
                Err(wait) => {
                    tracing::trace!(
                        endpoint,
                        weight,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited, waiting"
                    );
                    tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                }
            }
        }
    }

    /// Requests currently counted inside `endpoint`'s window.
    #[must_use]
    pub fn in_flight(&self, endpoint: &str) -> usize {
        let now = Instant::now();
        self.windows
            .lock()
            .map(|w| {
                w.get(endpoint).map_or(0, |entries| {
                    entries
                        .iter()
                        .filter(|(ts, _)| now.duration_since(*ts) < self.window)
                        .count()
                })
            })
            .unwrap_or(0)
    }
}
