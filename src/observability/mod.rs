//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! routing, config, http
//!     → logging.rs (tracing subscriber, env filter)
//!     → metrics.rs (rebuild and dispatch counters, Prometheus exporter)
//! ```

pub mod logging;
pub mod metrics;
