//! Authorization context extraction.
//!
//! # Responsibilities
//! - Resolve user and groups from headers or bearer token claims
//! - Record the resolved identity (and optionally the body) on the trace
//! - Reject malformed credentials; absent credentials mean anonymous
//!
//! # Design Decisions
//! - Token signatures are verified by the identity provider in front of the
//!   gateway; only the claims are read here
//! - Groups may be a JSON array or a comma-separated string

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::Value;

use crate::auth::context::AuthContext;
use crate::config::{GatewayConfig, IdentitySource};
use crate::proxy::body::{get_body, BodyError};
use crate::proxy::trace::Trace;

/// Malformed credentials or an unreadable request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("header '{0}' is not valid UTF-8")]
    MalformedHeader(String),
    #[error("unsupported authorization scheme")]
    UnsupportedScheme,
    #[error("malformed bearer token: {0}")]
    InvalidToken(String),
    #[error("invalid claim '{0}'")]
    InvalidClaim(String),
    #[error(transparent)]
    Body(#[from] BodyError),
}

/// Produces the authorization context for a request.
///
/// Implementations may fill identity fields on the trace as a side effect.
#[async_trait]
pub trait ContextExtractor: Send + Sync {
    async fn extract(
        &self,
        request: &mut Request<Body>,
        config: &GatewayConfig,
        trace: &mut Trace,
    ) -> Result<AuthContext, AuthError>;
}

/// Build the extractor selected by `auth.source`.
pub fn from_config(config: &GatewayConfig) -> Box<dyn ContextExtractor> {
    match config.auth.source {
        IdentitySource::Headers => Box::new(HeaderExtractor),
        IdentitySource::Bearer => Box::new(BearerExtractor),
    }
}

/// Reads identity from headers set by a fronting identity-aware proxy.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderExtractor;

#[async_trait]
impl ContextExtractor for HeaderExtractor {
    async fn extract(
        &self,
        request: &mut Request<Body>,
        config: &GatewayConfig,
        trace: &mut Trace,
    ) -> Result<AuthContext, AuthError> {
        capture_body(request, config, trace).await?;

        let headers = request.headers();
        let user = header_str(headers, &config.auth.user_header)?
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let groups = header_str(headers, &config.auth.groups_header)?
            .map(split_groups)
            .unwrap_or_default();

        Ok(finish(request, user, groups, trace))
    }
}

/// Reads identity from the claims of an `Authorization: Bearer` JWT.
#[derive(Debug, Default, Clone, Copy)]
pub struct BearerExtractor;

#[async_trait]
impl ContextExtractor for BearerExtractor {
    async fn extract(
        &self,
        request: &mut Request<Body>,
        config: &GatewayConfig,
        trace: &mut Trace,
    ) -> Result<AuthContext, AuthError> {
        capture_body(request, config, trace).await?;

        let Some(value) = header_str(request.headers(), header::AUTHORIZATION.as_str())? else {
            return Ok(finish(request, None, Vec::new(), trace));
        };
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .ok_or(AuthError::UnsupportedScheme)?;

        let claims = decode_claims(token.trim())?;
        let user = match claims.get(&config.auth.user_claim) {
            None | Some(Value::Null) => None,
            Some(Value::String(user)) if !user.is_empty() => Some(user.clone()),
            Some(_) => return Err(AuthError::InvalidClaim(config.auth.user_claim.clone())),
        };
        let groups = match claims.get(&config.auth.groups_claim) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(groups)) => split_groups(groups),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| AuthError::InvalidClaim(config.auth.groups_claim.clone()))?,
            Some(_) => return Err(AuthError::InvalidClaim(config.auth.groups_claim.clone())),
        };

        Ok(finish(request, user, groups, trace))
    }
}

async fn capture_body(
    request: &mut Request<Body>,
    config: &GatewayConfig,
    trace: &mut Trace,
) -> Result<(), AuthError> {
    if config.auth.capture_body {
        let body = get_body(request, config.security.max_body_size).await?;
        trace.body = String::from_utf8_lossy(&body).into_owned();
    }
    Ok(())
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Result<Option<&'h str>, AuthError> {
    headers
        .get(name)
        .map(|v| v.to_str().map_err(|_| AuthError::MalformedHeader(name.to_string())))
        .transpose()
}

fn split_groups(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

fn decode_claims(token: &str) -> Result<serde_json::Map<String, Value>, AuthError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(AuthError::InvalidToken("expected three segments".to_string())),
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::InvalidToken(e.to_string()))
}

fn finish(
    request: &Request<Body>,
    user: Option<String>,
    groups: Vec<String>,
    trace: &mut Trace,
) -> AuthContext {
    trace.user = user.clone().unwrap_or_default();
    trace.groups = groups.clone();
    AuthContext {
        user,
        groups,
        method: request.method().clone(),
        path: request.uri().path().to_string(),
    }
}
