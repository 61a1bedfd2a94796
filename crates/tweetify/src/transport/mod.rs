// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport: OAuth login, admin push API, real-time channel.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // OAuth login flow (browser)
        .route("/login", get(http::login))
        .route("/callback", get(http::callback))
        .route("/logout", post(http::logout))
        // Server-initiated push (admin)
        .route("/api/v1/push", post(http::push))
        // Real-time channel
        .route("/ws", get(ws::ws_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
