//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response};
use axum::Router;
use tokio::net::TcpListener;

use rbac_gateway::config::{GatewayConfig, RuleConfig};
use rbac_gateway::observability::logging::build_dispatch_with_writer;
use rbac_gateway::{HttpServer, ProxyEngine, Shutdown};

/// A request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// A running mock upstream.
pub struct Upstream {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Upstream {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> Recorded {
        self.requests.lock().unwrap().last().cloned().expect("no upstream call")
    }
}

/// Start an upstream answering every request with a fixed response.
pub async fn start_upstream(
    status: u16,
    headers: &[(&'static str, &'static str)],
    body: Vec<u8>,
) -> Upstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let recorded = requests.clone();
    let headers = headers.to_vec();
    let app = Router::new().fallback(move |request: Request<Body>| {
        let recorded = recorded.clone();
        let headers = headers.clone();
        let body = body.clone();
        async move {
            let (parts, incoming) = request.into_parts();
            let received = axum::body::to_bytes(incoming, usize::MAX)
                .await
                .unwrap_or_default();
            recorded.lock().unwrap().push(Recorded {
                method: parts.method.to_string(),
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body: received.to_vec(),
            });

            let mut response = Response::builder().status(status);
            for (name, value) in headers {
                response = response.header(name, value);
            }
            response.body(Body::from(body)).unwrap()
        }
    });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Upstream { addr, requests }
}

/// An address nobody listens on.
pub fn dead_address() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// In-memory log sink.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

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
    /// Access events written so far, parsed from JSON lines.
    pub fn access_events(&self) -> Vec<serde_json::Value> {
        let raw = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
        raw.lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter(|event| event["target"] == "gateway::access")
            .collect()
    }
}

/// A running gateway with captured access logs.
pub struct Gateway {
    pub addr: SocketAddr,
    pub logs: Capture,
    shutdown: Shutdown,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Gateway config pointing at `upstream`, granting the `dev` group access.
pub fn gateway_config(upstream: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig {
        target: format!("http://{upstream}"),
        ..Default::default()
    };
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.observability.json_logging = true;
    config.timeouts.request_secs = 5;
    config.rbac.rules.push(RuleConfig {
        name: "devs".into(),
        users: vec![],
        groups: vec!["dev".into()],
        methods: vec![],
        path_prefix: None,
    });
    config
}

pub async fn start_gateway(config: GatewayConfig) -> Gateway {
    let logs = Capture::default();
    let sink = logs.clone();
    let dispatch = build_dispatch_with_writer(&config.observability, move || sink.clone());

    let engine = ProxyEngine::new(Arc::new(config), dispatch).unwrap();
    let server = HttpServer::from_engine(engine);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    Gateway {
        addr,
        logs,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
