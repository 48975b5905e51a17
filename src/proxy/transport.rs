//! Request-scoped upstream transport with gzip response decoding.
//!
//! # Responsibilities
//! - Perform the single outbound round trip through the shared client
//! - Bound the round trip by the configured request timeout
//! - Decompress gzip responses so callers only ever see plain bytes
//! - Remember the final response so the engine can read its status afterwards
//!
//! # Design Decisions
//! - One transport per request, owned by the handling task; nothing is shared
//! - Decoded responses lose `Content-Encoding` and `Content-Length`
//! - Bodiless responses (HEAD, 1xx, 204, 304, empty body) pass through with
//!   their headers untouched
//! - Errors leave the transport empty (no observed response)

use std::io::Read as _;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode};
use flate2::read::GzDecoder;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

/// Pooled HTTP client shared by every transport.
pub type HttpClient = Client<HttpConnector, Body>;

/// Build the shared upstream client.
pub fn build_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Failure of the upstream round trip.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("upstream request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to read upstream body: {0}")]
    Body(#[from] axum::Error),
    #[error("gzip decompression failed: {0}")]
    Decompress(#[from] std::io::Error),
}

impl TransportError {
    /// Status returned to the caller when no upstream response is available.
    pub fn status(&self) -> StatusCode {
        match self {
            TransportError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Response extension marking a body that was decompressed by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decompressed;

/// What the transport saw of the upstream response.
#[derive(Debug, Clone)]
pub struct ObservedResponse {
    pub status: StatusCode,
    pub decompressed: bool,
}

/// Transport for exactly one upstream round trip.
pub struct DecodingTransport<'a> {
    client: &'a HttpClient,
    timeout: Duration,
    max_body_size: usize,
    response: Option<ObservedResponse>,
}

impl<'a> DecodingTransport<'a> {
    pub fn new(client: &'a HttpClient, timeout: Duration, max_body_size: usize) -> Self {
        Self {
            client,
            timeout,
            max_body_size,
            response: None,
        }
    }

    /// The response recorded by the last successful round trip, if any.
    pub fn observed(&self) -> Option<&ObservedResponse> {
        self.response.as_ref()
    }

    /// Send the request upstream and return the (decoded) response.
    pub async fn round_trip(&mut self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let response = tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        self.response = Some(ObservedResponse {
            status: response.status(),
            decompressed: response.extensions().get::<Decompressed>().is_some(),
        });

        Ok(response)
    }

    async fn exchange(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let head = request.method() == Method::HEAD;
        let response = self.client.request(request).await?;
        let (mut parts, body) = response.into_parts();
        let body = Body::new(body);

        if head || !has_body(parts.status) || !is_gzip(&parts.headers) {
            return Ok(Response::from_parts(parts, body));
        }

        let compressed = axum::body::to_bytes(body, self.max_body_size).await?;
        if compressed.is_empty() {
            return Ok(Response::from_parts(parts, Body::from(compressed)));
        }
        let decoded = gunzip(&compressed, self.max_body_size)?;

        parts.headers.remove(header::CONTENT_ENCODING);
        parts.headers.remove(header::CONTENT_LENGTH);
        parts.extensions.insert(Decompressed);

        Ok(Response::from_parts(parts, Body::from(decoded)))
    }
}

/// Check if the response has gzip Content-Encoding.
pub fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("gzip"))
        .unwrap_or(false)
}

/// Statuses that never carry a response body.
fn has_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn gunzip(body: &[u8], limit: usize) -> Result<Bytes, std::io::Error> {
    let mut decoded = Vec::new();
    let read = GzDecoder::new(body)
        .take(limit as u64 + 1)
        .read_to_end(&mut decoded)?;
    if read > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("decompressed body exceeds {limit} bytes"),
        ));
    }
    Ok(Bytes::from(decoded))
}
