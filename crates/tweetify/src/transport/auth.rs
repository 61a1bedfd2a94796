// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers. `None` disables the check.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Paths reachable without the admin token. The real-time channel
/// authenticates in-band with a session credential.
fn is_public(path: &str) -> bool {
    matches!(path, "/api/v1/health" | "/login" | "/callback" | "/logout" | "/ws")
}

/// Axum middleware that enforces Bearer auth on the admin API.
pub async fn auth_layer(
    state: State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if is_public(req.uri().path()) {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.config.admin_token.as_deref()) {
        tracing::debug!(path = req.uri().path(), "rejected unauthenticated admin request");
        return code.to_http_response("unauthorized").into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
