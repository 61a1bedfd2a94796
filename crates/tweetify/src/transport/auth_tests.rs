// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::HeaderValue;

use super::*;

fn headers(auth: Option<&'static str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(value) = auth {
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
    }
    headers
}

#[yare::parameterized(
    matching = { Some("Bearer s3cret"), Ok(()) },
    wrong_token = { Some("Bearer nope"), Err(ApiError::Unauthorized) },
    wrong_scheme = { Some("Basic s3cret"), Err(ApiError::Unauthorized) },
    missing = { None, Err(ApiError::Unauthorized) },
)]
fn bearer_validation(auth: Option<&'static str>, expected: Result<(), ApiError>) {
    assert_eq!(validate_bearer(&headers(auth), Some("s3cret")), expected);
}

#[test]
fn no_configured_token_allows_everything() {
    assert_eq!(validate_bearer(&headers(None), None), Ok(()));
}

#[test]
fn constant_time_eq_compares_content_and_length() {
    assert!(constant_time_eq("abc", "abc"));
    assert!(!constant_time_eq("abc", "abd"));
    assert!(!constant_time_eq("abc", "abcd"));
}

#[yare::parameterized(
    health = { "/api/v1/health", true },
    login = { "/login", true },
    callback = { "/callback", true },
    logout = { "/logout", true },
    ws = { "/ws", true },
    push = { "/api/v1/push", false },
    ws_prefix = { "/wsx", false },
)]
fn public_paths(path: &str, public: bool) {
    assert_eq!(is_public(path), public);
}
