//! Execution error taxonomy.
//!
//! Every call into the single/slice execution paths returns a structured
//! result; the variants here drive retry and finalization behavior:
//!
//! | Variant             | Handling                                              |
//! |---------------------|-------------------------------------------------------|
//! | `Validation`        | Rejected pre-submission, never retried                |
//! | `VenueRejection`    | Surfaced as a failed result, retried only on resubmit |
//! | `Timeout`           | Terminal (`error`/`expired`), not auto-retried        |
//! | `Connection`        | Triggers connector reconnection with capped backoff   |
//! | `RateLimitExceeded` | Absorbed by sleep-until-reset, never surfaced         |

use thiserror::Error;

/// Errors surfaced by the execution paths.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// Bad symbol, price, or size; rejected before submission.
    #[error("validation error: {0}")]
    Validation(String),

    /// The venue refused the order.
    #[error("venue rejection: {0}")]
    VenueRejection(String),

    /// Fill polling exhausted or order age exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Transport-level failure; candidates for reconnection.
    #[error("connection error: {0}")]
    Connection(String),

    /// Request would exceed a venue rate limit window.
    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimitExceeded {
        /// Milliseconds until the window resets.
        retry_after_ms: u64,
    },

    /// Unexpected internal failure, finalized as `status = error`.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Returns true for connection-class errors that warrant a retry or
    /// connector reconnection.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::VenueRejection(msg) | Self::Internal(msg) => is_connection_message(msg),
            _ => false,
        }
    }
}

/// Message-pattern classification for connection-class failures.
///
/// Matches the substrings venues and transports commonly embed in transient
/// transport errors.
#[must_use]
pub fn is_connection_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("connection")
        || lower.contains("network")
        || lower.contains("timeout")
        || lower.contains("socket")
}
