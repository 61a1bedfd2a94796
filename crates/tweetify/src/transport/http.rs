// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers: health, OAuth login redirect and callback, admin push.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, SessionError};
use crate::fanout::Target;
use crate::identity::{epoch_secs, IdentityView, Tokens};
use crate::oauth::build_authorize_url;
use crate::protocol::OutboundMessage;
use crate::state::AppState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub identities: usize,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    /// Set by the provider when the user denied access.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackResponse {
    /// Session credential for `authenticate` on the real-time channel.
    pub credential: String,
    pub identity: IdentityView,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub credential: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default = "default_target")]
    pub target: Target,
}

fn default_target() -> Target {
    Target::All
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = s.coordinator.registry();
    Json(HealthResponse {
        status: "running".to_owned(),
        connections: registry.len(),
        identities: registry.identity_count(),
    })
}

/// `GET /login` — redirect the browser to the provider's consent page.
pub async fn login(State(s): State<Arc<AppState>>) -> Response {
    let url = build_authorize_url(&s.config);
    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}

/// `GET /callback` — finish the authorization-code flow and mint a session
/// credential.
pub async fn callback(
    State(s): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(err) = query.error {
        tracing::info!(err = %err, "authorization denied by user or provider");
        return ApiError::BadRequest
            .to_http_response(format!("authorization failed: {err}"))
            .into_response();
    }
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return ApiError::BadRequest.to_http_response("missing code").into_response();
    };

    match complete_login(&s, &code).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => {
            tracing::warn!(err = %e, "login callback failed");
            ApiError::from(&e).to_http_response(e.to_string()).into_response()
        }
    }
}

async fn complete_login(s: &AppState, code: &str) -> Result<CallbackResponse, SessionError> {
    let coordinator = &s.coordinator;
    let resp = coordinator.token_exchange().exchange_code(code).await?;
    let profile = coordinator.provider().me(&resp.access_token).await?;

    let store = coordinator.store();
    store.get_or_create(&profile.id, profile.display_name_or_id())?;
    let identity = store.update_tokens(&profile.id, &Tokens::from_response(&resp, epoch_secs()))?;
    let credential = store.issue_session(&identity.id)?;

    tracing::info!(identity = %identity.id, "login completed");
    Ok(CallbackResponse { credential, identity: identity.view() })
}

/// `POST /logout` — revoke a session credential. Unknown credentials are not
/// an error.
pub async fn logout(State(s): State<Arc<AppState>>, Json(req): Json<LogoutRequest>) -> Response {
    match s.coordinator.store().revoke_session(&req.credential) {
        Ok(revoked) => {
            if revoked {
                tracing::info!("session credential revoked");
            }
            Json(LogoutResponse { revoked }).into_response()
        }
        Err(e) => {
            tracing::warn!(err = %e, "credential revocation failed");
            ApiError::from(&e).to_http_response(e.to_string()).into_response()
        }
    }
}

/// `POST /api/v1/push` — server-initiated push to a target selector.
pub async fn push(State(s): State<Arc<AppState>>, Json(req): Json<PushRequest>) -> Response {
    if req.event.is_empty() {
        return ApiError::BadRequest.to_http_response("event is required").into_response();
    }
    let message = OutboundMessage::from_value(req.event, req.payload);
    match s.coordinator.push(&message, &req.target) {
        Ok(report) => {
            tracing::debug!(
                event = message.event(),
                delivered = report.delivered,
                skipped = report.skipped.len(),
                "push delivered"
            );
            Json(report).into_response()
        }
        Err(e) => ApiError::from(&e).to_http_response(e.to_string()).into_response(),
    }
}
