//! Request interception pipeline.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → Trace::for_request
//!     → ContextExtractor (400 on malformed credentials, evaluation still runs)
//!     → RbacEvaluator (401 on deny or evaluation error)
//!     → DecodingTransport → upstream (502/504 on transport failure)
//!     → elapsed time, status code, one access event, metrics
//! ```
//!
//! # Design Decisions
//! - The engine is immutable after construction and shared by all requests
//! - Each request owns its trace and its transport; the transport is passed
//!   explicitly to the dispatch step instead of living on the engine
//! - The trace status is the observed upstream status, or 403 when no upstream
//!   response exists

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tracing::Dispatch;

use crate::auth::{extractor, AuthContext, ContextExtractor};
use crate::config::GatewayConfig;
use crate::observability::metrics::{self, Outcome};
use crate::proxy::trace::Trace;
use crate::proxy::transport::{build_client, DecodingTransport, HttpClient};
use crate::proxy::upstream::{strip_hop_by_hop, UpstreamError, UpstreamTarget};
use crate::rbac::{PolicyEvaluator, RbacEvaluator};

/// Status recorded in the trace when no upstream response was observed.
const NO_UPSTREAM_STATUS: u16 = 403;

/// Error building the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Target(#[from] UpstreamError),
}

/// Owns the upstream target, client, access collaborators and logger.
pub struct ProxyEngine {
    config: Arc<GatewayConfig>,
    target: UpstreamTarget,
    client: HttpClient,
    extractor: Box<dyn ContextExtractor>,
    evaluator: Box<dyn RbacEvaluator>,
    logger: Dispatch,
}

impl ProxyEngine {
    /// Build an engine with the extractor and policy described by `config`.
    pub fn new(config: Arc<GatewayConfig>, logger: Dispatch) -> Result<Self, EngineError> {
        let extractor = extractor::from_config(&config);
        let evaluator = Box::new(PolicyEvaluator::from_config(&config.rbac));
        Self::with_collaborators(config, logger, extractor, evaluator)
    }

    /// Build an engine with caller-supplied collaborators.
    pub fn with_collaborators(
        config: Arc<GatewayConfig>,
        logger: Dispatch,
        extractor: Box<dyn ContextExtractor>,
        evaluator: Box<dyn RbacEvaluator>,
    ) -> Result<Self, EngineError> {
        let target = UpstreamTarget::parse(&config.target)?;
        let client = build_client(Duration::from_secs(config.timeouts.connect_secs));
        Ok(Self {
            config,
            target,
            client,
            extractor,
            evaluator,
            logger,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    /// Run one request through the pipeline and produce the caller's response.
    pub async fn handle_request(&self, mut request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let mut trace = Trace::for_request(&request);
        let method = request.method().clone();

        let (context, extraction_failed) = match self
            .extractor
            .extract(&mut request, &self.config, &mut trace)
            .await
        {
            Ok(context) => (context, false),
            Err(e) => {
                trace.error = e.to_string();
                (AuthContext::anonymous(method.clone(), trace.path.clone()), true)
            }
        };

        let mut transport = DecodingTransport::new(
            &self.client,
            Duration::from_secs(self.config.timeouts.request_secs),
            self.config.security.max_body_size,
        );

        let (response, outcome) = match self.evaluator.evaluate(&context) {
            Err(e) => {
                if trace.error.is_empty() {
                    trace.error = e.to_string();
                }
                trace.message = e.to_string();
                (reject(StatusCode::UNAUTHORIZED, extraction_failed), Outcome::Denied)
            }
            Ok(decision) if !decision.allowed => {
                trace.access = decision.access;
                trace.message = "access denied".to_string();
                (reject(StatusCode::UNAUTHORIZED, extraction_failed), Outcome::Denied)
            }
            Ok(decision) => {
                trace.access = decision.access;
                if extraction_failed {
                    (reject(StatusCode::BAD_REQUEST, true), Outcome::BadRequest)
                } else {
                    self.dispatch(request, &mut transport, &mut trace).await
                }
            }
        };
        let outcome = if extraction_failed {
            Outcome::BadRequest
        } else {
            outcome
        };

        trace.elapsed_ms = start.elapsed().as_millis() as u64;
        trace.code = transport
            .observed()
            .map(|observed| observed.status.as_u16())
            .unwrap_or(NO_UPSTREAM_STATUS);

        tracing::dispatcher::with_default(&self.logger, || trace.emit(extraction_failed));
        metrics::record_request(method.as_str(), response.status().as_u16(), outcome, start);

        response
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
        transport: &mut DecodingTransport<'_>,
        trace: &mut Trace,
    ) -> (Response<Body>, Outcome) {
        let outbound = match self.target.prepare(request) {
            Ok(outbound) => outbound,
            Err(e) => {
                trace.error = e.to_string();
                trace.message = "request could not be mapped upstream".to_string();
                return (
                    (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response(),
                    Outcome::UpstreamError,
                );
            }
        };

        match transport.round_trip(outbound).await {
            Ok(mut response) => {
                strip_hop_by_hop(response.headers_mut());
                trace.message = "request proxied".to_string();
                (response, Outcome::Proxied)
            }
            Err(e) => {
                let status = e.status();
                trace.error = e.to_string();
                trace.message = "upstream request failed".to_string();
                (
                    (status, "Upstream request failed").into_response(),
                    Outcome::UpstreamError,
                )
            }
        }
    }
}

/// Short-circuit response. A malformed credential always answers 400.
fn reject(status: StatusCode, extraction_failed: bool) -> Response<Body> {
    if extraction_failed {
        (StatusCode::BAD_REQUEST, "Malformed credentials").into_response()
    } else {
        (status, "Unauthorized").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use crate::config::RuleConfig;
    use crate::observability::logging::build_dispatch_with_writer;
    use crate::rbac::{Decision, RbacError};
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn lines(&self) -> Vec<serde_json::Value> {
            let raw = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
            raw.lines()
                .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
                .filter(|v| v["target"] == "gateway::access")
                .collect()
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl ContextExtractor for FailingExtractor {
        async fn extract(
            &self,
            _request: &mut Request<Body>,
            _config: &GatewayConfig,
            trace: &mut Trace,
        ) -> Result<AuthContext, AuthError> {
            trace.user = "partial".to_string();
            Err(AuthError::UnsupportedScheme)
        }
    }

    /// Evaluator that counts calls and returns a canned result.
    struct Fixed {
        result: Result<Decision, RbacError>,
        calls: Arc<AtomicUsize>,
    }

    impl RbacEvaluator for Fixed {
        fn evaluate(&self, _context: &AuthContext) -> Result<Decision, RbacError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn config() -> Arc<GatewayConfig> {
        let mut config = GatewayConfig {
            // Never reached by these tests.
            target: "http://127.0.0.1:9".into(),
            ..Default::default()
        };
        config.observability.json_logging = true;
        config.rbac.rules.push(RuleConfig {
            name: "devs".into(),
            users: vec![],
            groups: vec!["dev".into()],
            methods: vec![],
            path_prefix: None,
        });
        Arc::new(config)
    }

    fn logger(config: &GatewayConfig) -> (Dispatch, Capture) {
        let capture = Capture::default();
        let sink = capture.clone();
        (
            build_dispatch_with_writer(&config.observability, move || sink.clone()),
            capture,
        )
    }

    fn request(user: Option<&str>, groups: &str) -> Request<Body> {
        let mut builder = Request::builder().uri("/reports?year=2024");
        if let Some(user) = user {
            builder = builder
                .header("x-forwarded-user", user)
                .header("x-forwarded-groups", groups);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_deny_is_401_and_warns() {
        let config = config();
        let (dispatch, capture) = logger(&config);
        let engine = ProxyEngine::new(config, dispatch).unwrap();

        let response = engine.handle_request(request(Some("eve"), "guests")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "WARN");
        assert_eq!(lines[0]["code"], 403);
        assert_eq!(lines[0]["user"], "eve");
        assert_eq!(lines[0]["path"], "/reports");
        assert_eq!(lines[0]["message"], "access denied");
    }

    #[tokio::test]
    async fn test_dot_segments_cannot_escape_path_rule() {
        let mut config = (*config()).clone();
        config.rbac.rules = vec![RuleConfig {
            name: "billing".into(),
            users: vec!["carol".into()],
            groups: vec![],
            methods: vec![],
            path_prefix: Some("/billing".into()),
        }];
        let config = Arc::new(config);
        let (dispatch, capture) = logger(&config);
        let engine = ProxyEngine::new(config, dispatch).unwrap();

        let request = Request::builder()
            .uri("/billing/../admin")
            .header("x-forwarded-user", "carol")
            .body(Body::empty())
            .unwrap();
        let response = engine.handle_request(request).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let lines = capture.lines();
        assert_eq!(lines[0]["path"], "/billing/../admin");
        assert_eq!(lines[0]["message"], "access denied");
        assert_eq!(lines[0]["code"], 403);
    }

    #[tokio::test]
    async fn test_anonymous_is_evaluation_error() {
        let config = config();
        let (dispatch, capture) = logger(&config);
        let engine = ProxyEngine::new(config, dispatch).unwrap();

        let response = engine.handle_request(request(None, "")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let lines = capture.lines();
        assert_eq!(lines[0]["level"], "WARN");
        assert_eq!(lines[0]["message"], "request carries no identity");
    }

    #[tokio::test]
    async fn test_extraction_failure_still_evaluates() {
        let config = config();
        let (dispatch, capture) = logger(&config);
        let calls = Arc::new(AtomicUsize::new(0));
        let evaluator = Fixed {
            result: Ok(Decision {
                allowed: true,
                access: vec!["everyone".into()],
            }),
            calls: calls.clone(),
        };
        let engine = ProxyEngine::with_collaborators(
            config,
            dispatch,
            Box::new(FailingExtractor),
            Box::new(evaluator),
        )
        .unwrap();

        let response = engine.handle_request(request(Some("alice"), "dev")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "ERROR");
        assert_eq!(lines[0]["message"], "unsupported authorization scheme");
        assert_eq!(lines[0]["user"], "partial");
        assert_eq!(lines[0]["code"], 403);
    }

    #[tokio::test]
    async fn test_extraction_error_wins_over_evaluation_error() {
        let config = config();
        let (dispatch, capture) = logger(&config);
        let engine = ProxyEngine::with_collaborators(
            config,
            dispatch,
            Box::new(FailingExtractor),
            Box::new(Fixed {
                result: Err(RbacError::Unauthenticated),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        )
        .unwrap();

        let response = engine.handle_request(request(None, "")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(capture.lines()[0]["message"], "unsupported authorization scheme");
    }
}
