//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, forwarder, server produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (dispatch counters, upstream latency)
//!
//! Consumers:
//!     → stdout (pretty, compact or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (context, target, method, path) on every proxy event
//! - Request ID set at the edge and carried in the request span
//! - Metrics are cheap no-ops until an exporter is installed

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
