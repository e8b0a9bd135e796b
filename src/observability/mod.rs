//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, histograms via the `metrics` facade)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or config level)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Correlation id is attached to every log line the pipeline emits
//! - Metrics are cheap (atomic increments); the recorder is optional
//! - Label values are `&'static str` or small integers only

pub mod logging;
pub mod metrics;
