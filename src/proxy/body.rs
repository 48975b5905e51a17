//! Request body snapshots.

use axum::body::{Body, Bytes};
use axum::http::Request;

/// Failure while buffering a request body.
#[derive(Debug, thiserror::Error)]
#[error("failed to read request body: {0}")]
pub struct BodyError(#[from] axum::Error);

/// Read the whole request body and put an identical body back on the request.
///
/// The returned bytes and the restored body are independent: reading one does
/// not consume the other. On error the body is left empty and not restored.
pub async fn get_body(request: &mut Request<Body>, limit: usize) -> Result<Bytes, BodyError> {
    let body = std::mem::take(request.body_mut());
    let bytes = axum::body::to_bytes(body, limit).await?;
    *request.body_mut() = Body::from(bytes.clone());
    Ok(bytes)
}
