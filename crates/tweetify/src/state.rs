// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::coordinator::Coordinator;

/// Shared server state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub coordinator: Arc<Coordinator>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, coordinator: Arc<Coordinator>, shutdown: CancellationToken) -> Self {
        Self { config, coordinator, shutdown }
    }
}

/// Return current epoch milliseconds.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
