//! Authorization context subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → extractor.rs (headers or bearer claims → identity, groups)
//!     → context.rs (AuthContext handed to the RBAC evaluator)
//! ```

pub mod context;
pub mod extractor;

pub use context::AuthContext;
pub use extractor::{AuthError, BearerExtractor, ContextExtractor, HeaderExtractor};
