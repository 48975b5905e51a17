//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy engine produces:
//!     → logging.rs (one access event per request, under the injected Dispatch)
//!     → metrics.rs (request counters and latency histograms)
//!
//! Consumers:
//!     → Log aggregation (stderr, JSON lines or plain text)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows into every access event
//! - Metrics are optional and cheap when disabled

pub mod logging;
pub mod metrics;
