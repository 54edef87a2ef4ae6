//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, transaction id on every line)
//!     → metrics.rs (counters, gauges, histograms via the `metrics` facade)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for log aggregation)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metric updates are no-ops until a recorder is installed, so library
//!   code and tests record unconditionally
//! - Degraded outcomes (overflow, correlation miss, failed mutation) are
//!   logged at warn and counted

pub mod logging;
pub mod metrics;
