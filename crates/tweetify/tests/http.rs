// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the HTTP API.
//!
//! Uses `axum_test::TestServer` against a mock provider.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use axum::http::{header, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tweetify::config::Config;
use tweetify::coordinator::Coordinator;
use tweetify::identity::{FileIdentityStore, Identity, IdentityStore};
use tweetify::registry::Connection;
use tweetify::state::AppState;
use tweetify::test_support::{ensure_crypto, MockProvider};
use tweetify::transport::build_router;

struct App {
    server: TestServer,
    state: Arc<AppState>,
    mock: MockProvider,
}

async fn app_with(tweak: impl FnOnce(&mut Config)) -> anyhow::Result<App> {
    ensure_crypto();
    let mock = MockProvider::start().await?;
    let mut config = mock.config();
    tweak(&mut config);
    let store: Arc<dyn IdentityStore> = Arc::new(FileIdentityStore::in_memory());
    let coordinator = Arc::new(Coordinator::new(&config, store));
    let state = Arc::new(AppState::new(config, coordinator, CancellationToken::new()));
    let server = TestServer::new(build_router(Arc::clone(&state)))?;
    Ok(App { server, state, mock })
}

async fn app() -> anyhow::Result<App> {
    app_with(|_| {}).await
}

/// Register a live connection directly, bypassing the socket.
fn connect(state: &AppState, id: &str, identity: &str) -> anyhow::Result<mpsc::Receiver<Message>> {
    let (tx, rx) = mpsc::channel(8);
    let conn = Connection::new(
        id.to_owned(),
        Identity::new(identity, identity),
        tx,
        CancellationToken::new(),
        Arc::new(AtomicU64::new(0)),
    );
    state.coordinator.registry().register(Arc::new(conn))?;
    Ok(rx)
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn health_reports_connection_and_identity_counts() -> anyhow::Result<()> {
    let app = app().await?;
    let resp = app.server.get("/api/v1/health").await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>(), json!({ "status": "running", "connections": 0, "identities": 0 }));

    let _a = connect(&app.state, "c1", "alice")?;
    let _b = connect(&app.state, "c2", "alice")?;
    let _c = connect(&app.state, "c3", "bob")?;
    let body: Value = app.server.get("/api/v1/health").await.json();
    assert_eq!(body["connections"], 3);
    assert_eq!(body["identities"], 2);
    Ok(())
}

// -- Login --------------------------------------------------------------------

#[tokio::test]
async fn login_redirects_to_provider() -> anyhow::Result<()> {
    let app = app().await?;
    let resp = app.server.get("/login").await;
    resp.assert_status(StatusCode::FOUND);

    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    assert!(location.starts_with("https://accounts.spotify.com/authorize?client_id=test-client"));
    assert!(location.contains("response_type=code"));
    assert!(location.contains("show_dialog=true"));
    Ok(())
}

#[tokio::test]
async fn callback_issues_credential_and_persists_identity() -> anyhow::Result<()> {
    let app = app().await?;
    let resp = app.server.get("/callback").add_query_param("code", "alice").await;
    resp.assert_status_ok();

    let body: Value = resp.json();
    assert_eq!(body["identity"], json!({ "id": "alice", "display_name": "alice listens" }));
    assert!(body.get("access_token").is_none());

    let credential = body["credential"].as_str().unwrap_or_default();
    let identity = app.state.coordinator.store().resolve_session(credential)?;
    let identity = identity.ok_or_else(|| anyhow::anyhow!("credential did not resolve"))?;
    assert_eq!(identity.access_token, "access-alice");
    assert_eq!(identity.refresh_token.as_deref(), Some("refresh-alice"));
    assert!(identity.expires_at > 0);
    Ok(())
}

#[tokio::test]
async fn repeated_login_reuses_identity() -> anyhow::Result<()> {
    let app = app().await?;
    let first: Value = app.server.get("/callback?code=alice").await.json();
    let second: Value = app.server.get("/callback?code=alice").await.json();
    assert_ne!(first["credential"], second["credential"]);
    assert_eq!(first["identity"], second["identity"]);
    Ok(())
}

#[tokio::test]
async fn callback_rejects_bad_requests() -> anyhow::Result<()> {
    let app = app().await?;
    let cases = [
        ("/callback?error=access_denied", "authorization failed: access_denied"),
        ("/callback", "missing code"),
        ("/callback?code=", "missing code"),
    ];
    for (path, message) in cases {
        let resp = app.server.get(path).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert_eq!(body["error"]["code"], "BAD_REQUEST", "{path}");
        assert_eq!(body["error"]["message"], message, "{path}");
    }
    assert_eq!(app.mock.token_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn callback_exchange_failure_is_bad_gateway() -> anyhow::Result<()> {
    let app = app().await?;
    let resp = app.server.get("/callback?code=bad").await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "AUTH_EXCHANGE");
    assert!(body["error"]["message"].as_str().unwrap_or_default().contains("invalid_grant"));
    Ok(())
}

#[tokio::test]
async fn callback_exchange_timeout_is_bad_gateway() -> anyhow::Result<()> {
    let app = app_with(|c| c.external_timeout_ms = 100).await?;
    app.mock.set_token_delay(Duration::from_millis(500));
    let resp = app.server.get("/callback?code=alice").await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = resp.json();
    assert!(body["error"]["message"].as_str().unwrap_or_default().contains("timeout"));
    Ok(())
}

#[tokio::test]
async fn logout_revokes_credential() -> anyhow::Result<()> {
    let app = app().await?;
    let login: Value = app.server.get("/callback?code=alice").await.json();
    let credential = login["credential"].as_str().unwrap_or_default().to_owned();

    let resp = app.server.post("/logout").json(&json!({ "credential": credential })).await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>(), json!({ "revoked": true }));
    assert!(app.state.coordinator.store().resolve_session(&credential)?.is_none());

    let again: Value = app.server.post("/logout").json(&json!({ "credential": credential })).await.json();
    assert_eq!(again, json!({ "revoked": false }));
    Ok(())
}

// -- Push ---------------------------------------------------------------------

#[tokio::test]
async fn push_requires_admin_token_when_configured() -> anyhow::Result<()> {
    let app = app_with(|c| c.admin_token = Some("s3cret".to_owned())).await?;
    let body = json!({ "event": "playback_update", "payload": {}, "target": { "type": "all" } });

    let resp = app.server.post("/api/v1/push").json(&body).await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<Value>()["error"]["code"], "UNAUTHORIZED");

    let resp = app.server.post("/api/v1/push").authorization_bearer("s3cret").json(&body).await;
    resp.assert_status_ok();

    // Health stays public.
    app.server.get("/api/v1/health").await.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn push_reports_delivery_per_target() -> anyhow::Result<()> {
    let app = app().await?;
    let mut phone = connect(&app.state, "c1", "alice")?;
    let mut laptop = connect(&app.state, "c2", "alice")?;
    let mut bob = connect(&app.state, "c3", "bob")?;

    let body = json!({
        "event": "playback_update",
        "payload": { "is_playing": true },
        "target": { "type": "identity", "id": "alice" },
    });
    let resp = app.server.post("/api/v1/push").json(&body).await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>(), json!({ "resolved": 2, "delivered": 2, "skipped": [] }));

    for rx in [&mut phone, &mut laptop] {
        let Ok(Message::Text(text)) = rx.try_recv() else {
            anyhow::bail!("expected a pushed frame");
        };
        let frame: Value = serde_json::from_str(text.as_str())?;
        assert_eq!(frame, json!({ "event": "playback_update", "payload": { "is_playing": true } }));
    }
    assert!(bob.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn push_to_unknown_connection_is_skipped() -> anyhow::Result<()> {
    let app = app().await?;
    let body = json!({
        "event": "error",
        "payload": { "reason": "x" },
        "target": { "type": "connection", "id": "ghost" },
    });
    let report: Value = app.server.post("/api/v1/push").json(&body).await.json();
    assert_eq!(report["delivered"], 0);
    assert_eq!(report["skipped"], json!([{ "connection_id": "ghost", "reason": "not_found" }]));
    Ok(())
}

#[tokio::test]
async fn push_without_event_is_bad_request() -> anyhow::Result<()> {
    let app = app().await?;
    let resp = app.server.post("/api/v1/push").json(&json!({ "event": "" })).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}
