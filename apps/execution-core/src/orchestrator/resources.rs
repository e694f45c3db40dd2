//! Execution capacity reservations.
//!
//! A fixed pool of abstract capacity units. Reservations carry a TTL and are
//! purged lazily when the pool is read; there is no background sweeper.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Reservation failure.
#[derive(Debug, Clone, Error)]
pub enum ReserveError {
    /// The pool cannot cover the request; reservations never partially succeed.
    #[error("insufficient capacity: requested {requested}, available {available}")]
    Insufficient {
        /// Units requested.
        requested: u32,
        /// Units currently available.
        available: u32,
    },
}

#[derive(Debug, Clone)]
struct Reservation {
    amount: u32,
    expires_at: Instant,
}

/// Fixed-capacity reservation pool with TTL expiry.
#[derive(Debug)]
pub struct ResourceMonitor {
    total: u32,
    reservations: RwLock<HashMap<String, Reservation>>,
}

impl ResourceMonitor {
    /// Create a pool with `total` capacity units.
    #[must_use]
    pub fn new(total: u32) -> Self {
        Self {
            total,
            reservations: RwLock::new(HashMap::new()),
        }
    }

    /// Total pool size.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Reserve `amount` units under `id` for `ttl`. All-or-nothing.
    pub fn reserve(&self, id: &str, amount: u32, ttl: Duration) -> Result<(), ReserveError> {
        let now = Instant::now();
        let Ok(mut reservations) = self.reservations.write() else {
            return Err(ReserveError::Insufficient {
                requested: amount,
                available: 0,
            });
        };
        Self::purge(&mut reservations, now);

        let reserved: u32 = reservations.values().map(|r| r.amount).sum();
        let available = self.total.saturating_sub(reserved);
        if amount > available {
            return Err(ReserveError::Insufficient {
                requested: amount,
                available,
            });
        }

        reservations.insert(
            id.to_string(),
            Reservation {
                amount,
                expires_at: now + ttl,
            },
        );
        tracing::debug!(reservation_id = %id, amount, available = available - amount, "capacity reserved");
        Ok(())
    }

    /// Release the reservation under `id`, returning the freed units.
    /// Idempotent: unknown or already-released ids return 0.
    pub fn release(&self, id: &str) -> u32 {
        self.reservations
            .write()
            .ok()
            .and_then(|mut r| r.remove(id))
            .map_or(0, |r| r.amount)
    }

    /// Currently available units. Purges expired reservations first.
    #[must_use]
    pub fn available(&self) -> u32 {
        let now = Instant::now();
        let Ok(mut reservations) = self.reservations.write() else {
            return 0;
        };
        Self::purge(&mut reservations, now);
        let reserved: u32 = reservations.values().map(|r| r.amount).sum();
        self.total.saturating_sub(reserved)
    }

    /// Number of live reservations.
    #[must_use]
    pub fn active_reservations(&self) -> usize {
        self.reservations.read().map(|r| r.len()).unwrap_or(0)
    }

    fn purge(reservations: &mut HashMap<String, Reservation>, now: Instant) {
        reservations.retain(|id, r| {
            let live = r.expires_at > now;
            if !live {
                tracing::debug!(reservation_id = %id, amount = r.amount, "capacity reservation expired");
            }
            live
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_and_release_round_trip() {
        let monitor = ResourceMonitor::new(10);
        assert_eq!(monitor.available(), 10);

        monitor.reserve("r1", 4, Duration::from_secs(60)).unwrap();
        assert_eq!(monitor.available(), 6);

        assert_eq!(monitor.release("r1"), 4);
        assert_eq!(monitor.available(), 10);
    }

    #[test]
    fn reserve_never_partially_succeeds() {
        let monitor = ResourceMonitor::new(10);
        monitor.reserve("r1", 8, Duration::from_secs(60)).unwrap();

        let err = monitor.reserve("r2", 5, Duration::from_secs(60)).unwrap_err();
        assert!(matches!(
            err,
            ReserveError::Insufficient {
                requested: 5,
                available: 2
            }
        ));
        // Nothing was taken by the failed attempt.
        assert_eq!(monitor.available(), 2);
    }

    #[test]
    fn release_is_idempotent() {
        let monitor = ResourceMonitor::new(10);
        monitor.reserve("r1", 3, Duration::from_secs(60)).unwrap();

        assert_eq!(monitor.release("r1"), 3);
        assert_eq!(monitor.release("r1"), 0);
        assert_eq!(monitor.release("unknown"), 0);
        assert_eq!(monitor.available(), 10);
    }

    #[test]
    fn expired_reservations_purge_on_read() {
        let monitor = ResourceMonitor::new(10);
        monitor.reserve("r1", 6, Duration::from_millis(0)).unwrap();

        // TTL of zero expires immediately; the next read reclaims it.
        assert_eq!(monitor.available(), 10);
        assert_eq!(monitor.active_reservations(), 0);
    }

    #[test]
    fn reserved_total_never_exceeds_pool() {
        let monitor = ResourceMonitor::new(5);
        for i in 0..10 {
            let _ = monitor.reserve(&format!("r{i}"), 2, Duration::from_secs(60));
        }
        let reserved = monitor.total() - monitor.available();
        assert!(reserved <= monitor.total());
        assert_eq!(monitor.active_reservations(), 2);
    }
}
