// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers: an in-process mock of the provider's token endpoint and Web
//! API, plus identity seeding.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::error::SessionError;
use crate::identity::{FileIdentityStore, Identity, IdentityStore, Tokens};

/// Install the process-wide rustls provider. Safe to call repeatedly.
pub fn ensure_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Serve `router` on an ephemeral local port.
pub async fn spawn_mock(router: Router) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    Ok(addr)
}

/// Create (or update) an identity with tokens and bind a session credential to it.
pub fn seed_identity(
    store: &FileIdentityStore,
    credential: &str,
    identity_id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: u64,
) -> Result<Identity, SessionError> {
    store.get_or_create(identity_id, identity_id)?;
    let tokens = Tokens {
        access_token: access_token.to_owned(),
        refresh_token: refresh_token.map(str::to_owned),
        expires_at,
    };
    let identity = store.update_tokens(identity_id, &tokens)?;
    store.bind_session(credential, identity_id)?;
    Ok(identity)
}

#[derive(Default)]
struct MockState {
    rejected_access: Mutex<HashSet<String>>,
    revoked_refresh: Mutex<HashSet<String>>,
    rate_limited: AtomicBool,
    token_delay_ms: AtomicU64,
    playing: Mutex<serde_json::Value>,
    token_calls: AtomicU32,
    refresh_calls: AtomicU32,
    api_calls: AtomicU32,
    last_access_token: Mutex<Option<String>>,
    last_query: Mutex<Option<String>>,
}

/// Mock provider.
///
/// - `POST /api/token`: code `bad` is rejected with `invalid_grant`; any
///   other code `c` yields `access-c` / `refresh-c`. Refresh yields
///   `fresh-<n>` unless the refresh token was revoked.
/// - `GET /v1/me`: profile id is the access token minus its `access-` prefix.
/// - `GET /v1/me/top/{artists,tracks}` and `/v1/me/player/currently-playing`.
pub struct MockProvider {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockProvider {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::default());
        let router = Router::new()
            .route("/api/token", post(token))
            .route("/v1/me", get(me))
            .route("/v1/me/top/artists", get(top_artists))
            .route("/v1/me/top/tracks", get(top_tracks))
            .route("/v1/me/player/currently-playing", get(currently_playing))
            .with_state(Arc::clone(&state));
        let addr = spawn_mock(router).await?;
        Ok(Self { addr, state })
    }

    /// Local config whose provider URLs point at this mock.
    pub fn config(&self) -> Config {
        let mut config = Config::for_local("test-client", "test-secret");
        config.token_url = format!("http://{}/api/token", self.addr);
        config.api_base_url = format!("http://{}/v1", self.addr);
        config
    }

    /// Answer 401 for this access token on every Web API route.
    pub fn reject_access_token(&self, token: &str) {
        self.state.rejected_access.lock().insert(token.to_owned());
    }

    /// Answer `invalid_grant` when this refresh token is used.
    pub fn revoke_refresh_token(&self, token: &str) {
        self.state.revoked_refresh.lock().insert(token.to_owned());
    }

    pub fn set_rate_limited(&self, limited: bool) {
        self.state.rate_limited.store(limited, Ordering::Relaxed);
    }

    /// Delay every token endpoint response.
    pub fn set_token_delay(&self, delay: Duration) {
        self.state.token_delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Currently-playing body. `Null` answers 204.
    pub fn set_playing(&self, value: serde_json::Value) {
        *self.state.playing.lock() = value;
    }

    pub fn token_calls(&self) -> u32 {
        self.state.token_calls.load(Ordering::Relaxed)
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::Relaxed)
    }

    pub fn api_calls(&self) -> u32 {
        self.state.api_calls.load(Ordering::Relaxed)
    }

    pub fn last_access_token(&self) -> Option<String> {
        self.state.last_access_token.lock().clone()
    }

    pub fn last_query(&self) -> Option<String> {
        self.state.last_query.lock().clone()
    }
}

fn invalid_grant(description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid_grant", "error_description": description })),
    )
        .into_response()
}

async fn token(
    State(s): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    s.token_calls.fetch_add(1, Ordering::Relaxed);
    let delay = s.token_delay_ms.load(Ordering::Relaxed);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            let code = form.get("code").cloned().unwrap_or_default();
            if code.is_empty() || code == "bad" {
                return invalid_grant("Invalid authorization code");
            }
            Json(json!({
                "access_token": format!("access-{code}"),
                "refresh_token": format!("refresh-{code}"),
                "token_type": "Bearer",
                "expires_in": 3600,
            }))
            .into_response()
        }
        Some("refresh_token") => {
            let n = s.refresh_calls.fetch_add(1, Ordering::Relaxed) + 1;
            let refresh = form.get("refresh_token").cloned().unwrap_or_default();
            if s.revoked_refresh.lock().contains(&refresh) {
                return invalid_grant("Refresh token revoked");
            }
            Json(json!({
                "access_token": format!("fresh-{n}"),
                "token_type": "Bearer",
                "expires_in": 3600,
            }))
            .into_response()
        }
        _ => (StatusCode::BAD_REQUEST, Json(json!({ "error": "unsupported_grant_type" })))
            .into_response(),
    }
}

/// Check the bearer token. `Err` carries the response to return instead.
fn authorize(s: &MockState, headers: &HeaderMap, query: Option<String>) -> Result<String, Response> {
    s.api_calls.fetch_add(1, Ordering::Relaxed);
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_owned();
    *s.last_access_token.lock() = Some(token.clone());
    *s.last_query.lock() = query;

    if token.is_empty() || s.rejected_access.lock().contains(&token) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "status": 401, "message": "The access token expired" } })),
        )
            .into_response());
    }
    if s.rate_limited.load(Ordering::Relaxed) {
        return Err((StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "2")], "").into_response());
    }
    Ok(token)
}

async fn me(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    match authorize(&s, &headers, None) {
        Ok(token) => {
            let id = token.strip_prefix("access-").unwrap_or(&token).to_owned();
            Json(json!({ "id": id, "display_name": format!("{id} listens") })).into_response()
        }
        Err(resp) => resp,
    }
}

fn top_items(kind: &str, token: &str) -> serde_json::Value {
    json!({ "items": [{ "name": format!("{kind}-for-{token}") }] })
}

async fn top_artists(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    match authorize(&s, &headers, query) {
        Ok(token) => Json(top_items("artist", &token)).into_response(),
        Err(resp) => resp,
    }
}

async fn top_tracks(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    match authorize(&s, &headers, query) {
        Ok(token) => Json(top_items("track", &token)).into_response(),
        Err(resp) => resp,
    }
}

async fn currently_playing(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&s, &headers, None) {
        return resp;
    }
    let playing = s.playing.lock().clone();
    if playing.is_null() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Json(playing).into_response()
    }
}
