// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Helm Execution Core
//!
//! Execution layer for the Helm trading system: turns trade decisions into
//! executed orders through a venue-agnostic pipeline.
//!
//! # Architecture
//!
//! - **Models** (`models`): decisions, plans, orders, execution results.
//! - **Orchestrator** (`orchestrator`): validates a decision, resolves
//!   signal conflicts, selects an execution strategy, and reserves
//!   execution capacity, emitting an immutable [`models::ExecutionPlan`].
//! - **Executor** (`executor`): runs plans as single or sliced orders
//!   through a mode backend (paper, live, backtest), tracking lifecycle
//!   state and metrics.
//! - **Venue** (`venue`): the [`venue::VenueConnector`] seam with rate
//!   limiting, health monitoring, and reconnection, plus an in-memory mock.
//! - **Ports** (`ports`): risk and protection interfaces supplied by the
//!   host system.
//!
//! Data flows one way: decision → plan → orders → result. Components
//! communicate through [`events::ExecutionEvent`] rather than callbacks.

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod models;
pub mod orchestrator;
pub mod ports;
pub mod telemetry;
pub mod venue;

pub use config::{ExecutionConfig, ExecutionMode};
pub use error::ExecutionError;
pub use executor::OrderExecutor;
pub use models::{ExecutionPlan, Order, OrderExecutionResult, TradeDecision};
pub use orchestrator::ExecutionOrchestrator;
