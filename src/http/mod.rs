//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tower-http tracing)
//!     → proxy engine (extraction, authorization, dispatch)
//!     → Send to client
//! ```

pub mod server;

pub use server::HttpServer;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";
