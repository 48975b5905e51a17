//! Per-request trace record.
//!
//! A `Trace` is filled in step by step while a request moves through the
//! pipeline and is emitted exactly once as a structured log event. Any field
//! may be left unset; unset fields log as empty strings, empty lists or zero.

use axum::body::Body;
use axum::http::Request;
use tracing::Level;

/// Log target for per-request access events.
pub const ACCESS_LOG_TARGET: &str = "gateway::access";

/// Structured data accumulated for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub path: String,
    pub method: String,
    pub request_id: String,
    pub error: String,
    pub message: String,
    /// Upstream status, or 403 when no upstream response was observed.
    pub code: u16,
    pub elapsed_ms: u64,
    pub user: String,
    pub groups: Vec<String>,
    pub body: String,
    /// Names of the policy rules that granted access.
    pub access: Vec<String>,
}

impl Trace {
    /// Start a trace for an inbound request.
    pub fn for_request(request: &Request<Body>) -> Self {
        Self {
            path: request.uri().path().to_string(),
            method: request.method().to_string(),
            request_id: request
                .headers()
                .get(crate::http::X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            ..Default::default()
        }
    }

    /// Severity of the access event.
    ///
    /// Extraction failures are errors; anything that did not end in a 200 from
    /// upstream is a warning.
    pub fn severity(&self, extraction_failed: bool) -> Level {
        if extraction_failed {
            Level::ERROR
        } else if self.code != 200 {
            Level::WARN
        } else {
            Level::INFO
        }
    }

    /// Emit the access event under the current dispatcher.
    pub fn emit(&self, extraction_failed: bool) {
        let level = self.severity(extraction_failed);
        let message = if level == Level::ERROR {
            self.error.as_str()
        } else {
            self.message.as_str()
        };

        macro_rules! access_event {
            ($lvl:expr, $trace:expr, $message:expr) => {
                tracing::event!(
                    target: ACCESS_LOG_TARGET,
                    $lvl,
                    code = $trace.code,
                    method = %$trace.method,
                    path = %$trace.path,
                    elapsed = $trace.elapsed_ms,
                    user = %$trace.user,
                    groups = ?$trace.groups,
                    body = %$trace.body,
                    access = ?$trace.access,
                    request_id = %$trace.request_id,
                    "{}",
                    $message
                )
            };
        }

        match level {
            Level::ERROR => access_event!(Level::ERROR, self, message),
            Level::WARN => access_event!(Level::WARN, self, message),
            _ => access_event!(Level::INFO, self, message),
        }
    }
}
