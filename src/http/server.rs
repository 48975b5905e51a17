//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router handing every request to the proxy engine
//! - Wire up middleware (request ID, tower-http tracing)
//! - Bind server to listener with client address info
//! - Graceful shutdown when the coordinator fires

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Dispatch;

use crate::config::GatewayConfig;
use crate::proxy::{EngineError, ProxyEngine};

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    engine: Arc<ProxyEngine>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and logger.
    pub fn new(config: GatewayConfig, logger: Dispatch) -> Result<Self, EngineError> {
        let engine = ProxyEngine::new(Arc::new(config), logger)?;
        Ok(Self::from_engine(engine))
    }

    /// Create a server around an already built engine.
    pub fn from_engine(engine: ProxyEngine) -> Self {
        let engine = Arc::new(engine);
        let router = Self::build_router(engine.clone());
        Self { router, engine }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(engine: Arc<ProxyEngine>) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(engine)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server until the shutdown coordinator fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            target = %self.engine.config().target,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        self.engine.config()
    }
}

/// Every path and method goes through the engine.
async fn proxy_handler(
    State(engine): State<Arc<ProxyEngine>>,
    request: Request<Body>,
) -> Response {
    engine.handle_request(request).await
}

async fn shutdown_signal(mut shutdown: broadcast::Receiver<()>) {
    // A closed channel means the coordinator is gone; stop as well.
    let _ = shutdown.recv().await;
    tracing::info!("Draining connections");
}
