//! Telemetry: structured logging and access-engine metrics.
//!
//! - **Logging**: JSON/pretty/compact `tracing-subscriber` output with `EnvFilter`
//! - **Metrics**: counter descriptions and helpers for decision and cache outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use gatehouse_core::telemetry::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default()).expect("Failed to initialize logging");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{describe_metrics, CacheFamily, DecisionPath};
