//! Authorization context attached to a request.

use axum::http::Method;

/// Identity and request facts the access policy is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Resolved user; `None` for anonymous requests.
    pub user: Option<String>,
    pub groups: Vec<String>,
    pub method: Method,
    pub path: String,
}

impl AuthContext {
    /// A context with no identity.
    pub fn anonymous(method: Method, path: impl Into<String>) -> Self {
        Self {
            user: None,
            groups: Vec::new(),
            method,
            path: path.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none()
    }
}
