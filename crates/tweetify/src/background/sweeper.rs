// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle connection sweeper.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::registry::ConnectionRegistry;
use crate::state::epoch_ms;

/// Deregister every connection silent for longer than `idle_timeout`.
/// Returns how many were removed.
pub fn sweep_once(registry: &ConnectionRegistry, idle_timeout: Duration) -> usize {
    let cutoff = epoch_ms().saturating_sub(idle_timeout.as_millis() as u64);
    let mut removed = 0;
    for id in registry.stale_connections(cutoff) {
        if let Some(conn) = registry.deregister(&id) {
            tracing::info!(
                connection_id = %id,
                identity = conn.identity_id(),
                last_seen = conn.last_seen(),
                "evicting idle connection"
            );
            removed += 1;
        }
    }
    removed
}

/// Spawn the idle sweeper. Stops when `shutdown` is cancelled.
pub fn spawn_idle_sweeper(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            sweep_once(&registry, idle_timeout);
        }
    });
}

#[cfg(test)]
#[path = "sweeper_tests.rs"]
mod tests;
