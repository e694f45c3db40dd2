//! Typed lifecycle events and the publisher port.
//!
//! Order lifecycle notifications are a tagged union published through an
//! explicit port rather than ad-hoc callbacks. Per-source emission ordering is
//! preserved by the publishers shipped here; delivery is best effort and the
//! executor never blocks on a slow consumer.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Lifecycle event emitted by the execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A parent order entered the active map.
    OrderCreated {
        /// Order id.
        order_id: String,
        /// Instrument symbol.
        symbol: String,
        /// Requested quantity.
        quantity: Decimal,
    },
    /// An order reached `filled`.
    OrderFilled {
        /// Order id.
        order_id: String,
        /// Average fill price.
        fill_price: Decimal,
        /// Filled quantity.
        fill_quantity: Decimal,
    },
    /// An order reached `rejected` or `error`.
    OrderFailed {
        /// Order id.
        order_id: String,
        /// Failure description.
        reason: String,
    },
    /// An order was cancelled locally.
    OrderCancelled {
        /// Order id.
        order_id: String,
    },
    /// A remote cancel failed; local state is cancelled regardless.
    CancelFailed {
        /// Order id.
        order_id: String,
        /// Remote error text.
        reason: String,
    },
    /// The timeout sweep expired an order.
    OrderExpired {
        /// Order id.
        order_id: String,
    },
    /// Transient bookkeeping was purged.
    CleanupCompleted {
        /// Number of entries removed.
        purged: usize,
    },
}

/// Event publishing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventPublishError {
    /// The consumer channel is full or closed.
    #[error("event publish failed: {0}")]
    PublishFailed(String),
}

/// Port for publishing execution events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: ExecutionEvent) -> Result<(), EventPublishError>;
}

/// No-op publisher for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish(&self, _event: ExecutionEvent) -> Result<(), EventPublishError> {
        Ok(())
    }
}

/// Bounded-channel publisher. Events are dropped with a warning when the
/// consumer falls behind; the execution path never blocks on delivery.
#[derive(Debug, Clone)]
pub struct ChannelEventPublisher {
    tx: mpsc::Sender<ExecutionEvent>,
}

impl ChannelEventPublisher {
    /// Create a publisher and its receiving half.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventPublisher for ChannelEventPublisher {
    async fn publish(&self, event: ExecutionEvent) -> Result<(), EventPublishError> {
        self.tx.try_send(event).map_err(|e| {
            tracing::warn!(error = %e, "dropping execution event, channel full or closed");
            EventPublishError::PublishFailed(e.to_string())
        })
    }
}

/// Publisher that records events in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: std::sync::Mutex<Vec<ExecutionEvent>>,
}

impl RecordingEventPublisher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: ExecutionEvent) -> Result<(), EventPublishError> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn channel_publisher_preserves_order() {
        let (publisher, mut rx) = ChannelEventPublisher::bounded(8);

        publisher
            .publish(ExecutionEvent::OrderCreated {
                order_id: "o1".to_string(),
                symbol: "BTC-USD".to_string(),
                quantity: dec!(10),
            })
            .await
            .unwrap();
        publisher
            .publish(ExecutionEvent::OrderFilled {
                order_id: "o1".to_string(),
                fill_price: dec!(100),
                fill_quantity: dec!(10),
            })
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(ExecutionEvent::OrderCreated { .. })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(ExecutionEvent::OrderFilled { .. })
        ));
    }

    #[tokio::test]
    async fn channel_publisher_drops_when_full() {
        let (publisher, _rx) = ChannelEventPublisher::bounded(1);

        let first = publisher
            .publish(ExecutionEvent::OrderCancelled {
                order_id: "o1".to_string(),
            })
            .await;
        let second = publisher
            .publish(ExecutionEvent::OrderCancelled {
                order_id: "o2".to_string(),
            })
            .await;

        assert!(first.is_ok());
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn recording_publisher_captures_events() {
        let publisher = RecordingEventPublisher::new();
        publisher
            .publish(ExecutionEvent::OrderExpired {
                order_id: "o1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(publisher.events().len(), 1);
    }
}
