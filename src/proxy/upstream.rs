//! Upstream target and outbound request preparation.
//!
//! # Responsibilities
//! - Parse the configured target URL once at startup
//! - Rewrite inbound URIs onto the target (base path join, query merge)
//! - Rewrite `Host` to the target authority
//! - Strip hop-by-hop headers and extend `X-Forwarded-For`
//!
//! # Design Decisions
//! - Target base path and request path are joined with exactly one slash
//! - Target query and request query are joined with `&`
//! - Only plain http targets are accepted

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Uri};

/// Error raised while parsing the target or rewriting a request onto it.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid target url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unsupported target: {0}")]
    Unsupported(String),
    #[error("invalid upstream uri: {0}")]
    Uri(String),
}

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that apply to a single connection and must not be forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The single upstream every request is forwarded to.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    base_query: Option<String>,
}

impl UpstreamTarget {
    /// Parse an absolute http URL.
    pub fn parse(target: &str) -> Result<Self, UpstreamError> {
        let url = url::Url::parse(target)?;
        if url.scheme() != "http" {
            return Err(UpstreamError::Unsupported(format!("scheme '{}'", url.scheme())));
        }
        let host = url
            .host_str()
            .ok_or_else(|| UpstreamError::Unsupported("missing host".to_string()))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::try_from(authority.as_str())
            .map_err(|e| UpstreamError::Uri(e.to_string()))?;

        Ok(Self {
            scheme: Scheme::HTTP,
            authority,
            base_path: url.path().to_string(),
            base_query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Map an inbound request URI onto the target.
    pub fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, UpstreamError> {
        let path = join_paths(&self.base_path, uri.path());
        let query = match (self.base_query.as_deref(), uri.query().filter(|q| !q.is_empty())) {
            (Some(base), Some(req)) => Some(format!("{base}&{req}")),
            (Some(q), None) | (None, Some(q)) => Some(q.to_string()),
            (None, None) => None,
        };
        let path_and_query = match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };
        let path_and_query = PathAndQuery::try_from(path_and_query.as_str())
            .map_err(|e| UpstreamError::Uri(e.to_string()))?;

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| UpstreamError::Uri(e.to_string()))
    }

    /// Turn an inbound request into the request sent upstream.
    pub fn prepare<B>(&self, mut request: Request<B>) -> Result<Request<B>, UpstreamError> {
        *request.uri_mut() = self.rewrite_uri(request.uri())?;

        let client_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let headers = request.headers_mut();
        strip_hop_by_hop(headers);

        let host = HeaderValue::from_str(self.authority.as_str())
            .map_err(|e| UpstreamError::Uri(e.to_string()))?;
        headers.insert(header::HOST, host);

        if let Some(ip) = client_ip {
            let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{prior}, {ip}"),
                None => ip.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }

        Ok(request)
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}
