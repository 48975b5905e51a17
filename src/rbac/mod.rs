//! Role-based access control.

pub mod policy;

pub use policy::{Decision, PolicyEvaluator, RbacError, RbacEvaluator};
