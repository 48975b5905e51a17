//! Request interception pipeline.
//!
//! # Data Flow
//! ```text
//! engine.rs (orchestration, one invocation per request)
//!     → trace.rs (per-request record, emitted once)
//!     → body.rs (body snapshots for inspection)
//!     → upstream.rs (target URL, request rewriting)
//!     → transport.rs (round trip + gzip decoding)
//! ```

pub mod body;
pub mod engine;
pub mod trace;
pub mod transport;
pub mod upstream;

pub use body::get_body;
pub use engine::{EngineError, ProxyEngine};
pub use trace::Trace;
pub use transport::{DecodingTransport, Decompressed};
pub use upstream::UpstreamTarget;
