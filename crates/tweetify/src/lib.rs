// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tweetify: OAuth-backed real-time listening activity server.

pub mod background;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod identity;
pub mod oauth;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod state;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::background::{spawn_idle_sweeper, spawn_playback_poller};
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::identity::{FileIdentityStore, IdentityStore};
use crate::state::AppState;
use crate::transport::build_router;

/// Open the identity store named by the config, or an in-memory one.
pub fn open_store(config: &Config) -> anyhow::Result<Arc<dyn IdentityStore>> {
    let store = match config.store_path {
        Some(ref path) => FileIdentityStore::open(path.clone())
            .with_context(|| format!("opening identity store {}", path.display()))?,
        None => FileIdentityStore::in_memory(),
    };
    Ok(Arc::new(store))
}

/// Run the server until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let store = open_store(&config)?;
    let coordinator = Arc::new(Coordinator::new(&config, store));

    spawn_playback_poller(
        Arc::clone(&coordinator),
        config.playback_poll_interval(),
        shutdown.clone(),
    );
    spawn_idle_sweeper(
        Arc::clone(coordinator.registry()),
        config.sweep_interval(),
        config.idle_timeout(),
        shutdown.clone(),
    );

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    let state = Arc::new(AppState::new(config, coordinator, shutdown.clone()));
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    tracing::info!("tweetify listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
