//! PSK-based access control for the local API.
//!
//! The API can move wallet funds, so when a key is configured every `/api`
//! request must present it. Keys are compared in constant time.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::{AppError, AppErrorWithRevision};

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-nomina-key";

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // No PSK configured: local development mode
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let verdict = match presented_key(request.headers()) {
        Some(provided) if constant_time_compare(provided, &expected) => Ok(()),
        Some(_) => Err("Invalid API key"),
        None => Err("Missing API key"),
    };

    match verdict {
        Ok(()) => next.run(request).await,
        Err(message) => unauthorized(message),
    }
}

/// Key from the API key header, falling back to a bearer token.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized(message: &str) -> Response {
    tracing::warn!("Rejected API request: {}", message);
    AppErrorWithRevision {
        error: AppError::Unauthorized(message.to_string()),
        revision_id: 0,
    }
    .into_response()
}
