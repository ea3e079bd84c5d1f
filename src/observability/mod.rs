//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, filtered per subsystem)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → stdout (fmt subscriber)
//!     → admin /metrics (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;

pub use metrics::MetricsRegisterer;
