//! # Utility Modules
//!
//! Supporting utilities for logging, metrics and timing.
//!
//! ## Components
//! - **Logging**: tracing subscriber setup from configuration
//! - **Metrics**: thread-safe link and traffic counters
//! - **Timeout**: transport-level deadline helpers

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
