//! Reconnection backoff policy.

use std::time::Duration;

/// Exponential backoff schedule for reconnect attempts: `base * 2^(n-1)`,
/// capped at `max_delay`, with a bounded attempt count.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Base delay for the first attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (1-based). `None` once attempts are
    /// exhausted.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let exp = attempt - 1;
        let delay = if exp >= 32 {
            self.max_delay
        } else {
            self.base_delay
                .checked_mul(1_u32 << exp)
                .unwrap_or(self.max_delay)
        };
        Some(delay.min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        };
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(800)));
    }

    #[test]
    fn caps_at_max_delay() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(8),
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        };
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(10)));
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let policy = ReconnectPolicy::default();
        assert!(policy.delay_for(5).is_some());
        assert_eq!(policy.delay_for(6), None);
        assert_eq!(policy.delay_for(0), None);
    }
}
