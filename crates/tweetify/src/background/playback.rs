// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic currently-playing push for subscribed identities.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::coordinator::Coordinator;
use crate::fanout::Target;
use crate::protocol::OutboundMessage;
use crate::provider::ProviderRequest;

/// Polls currently-playing state and pushes changes.
///
/// Keeps the last pushed payload per identity so unchanged state is not
/// re-sent every tick.
pub struct PlaybackPoller {
    coordinator: Arc<Coordinator>,
    last: HashMap<String, serde_json::Value>,
}

impl PlaybackPoller {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator, last: HashMap::new() }
    }

    /// Run one polling pass. Returns how many identities were pushed to.
    pub async fn poll_once(&mut self) -> usize {
        let subscribed = self.coordinator.registry().subscribed_identities();
        let live: HashSet<&str> = subscribed.iter().map(|c| c.identity_id()).collect();
        self.last.retain(|id, _| live.contains(id.as_str()));

        let mut pushed = 0;
        for conn in &subscribed {
            // Deregistered since the snapshot was taken.
            if conn.is_closed() {
                continue;
            }
            let identity = conn.identity_id();

            let payload = match self
                .coordinator
                .fetch_for(conn, &ProviderRequest::CurrentlyPlaying)
                .await
            {
                Ok(payload) => payload,
                Err(e) if e.closes_connection() => {
                    tracing::warn!(identity, err = %e, "playback poll lost authorization, evicting");
                    let reason = e.to_string();
                    for id in self.coordinator.registry().connections_for(identity) {
                        self.coordinator.evict(&id, &reason);
                    }
                    self.last.remove(identity);
                    continue;
                }
                Err(e) => {
                    tracing::debug!(identity, err = %e, "playback poll failed");
                    continue;
                }
            };

            if self.last.get(identity) == Some(&payload) {
                continue;
            }

            let message = OutboundMessage::playback_update(payload.clone());
            match self.coordinator.push(&message, &Target::identity(identity)) {
                Ok(report) => {
                    tracing::debug!(
                        identity,
                        delivered = report.delivered,
                        skipped = report.skipped.len(),
                        "playback update pushed"
                    );
                    self.last.insert(identity.to_owned(), payload);
                    pushed += 1;
                }
                Err(e) => tracing::warn!(identity, err = %e, "playback update not sent"),
            }
        }
        pushed
    }

    /// Number of identities with a remembered payload.
    pub fn tracked(&self) -> usize {
        self.last.len()
    }
}

/// Spawn the playback poller. Stops when `shutdown` is cancelled.
pub fn spawn_playback_poller(
    coordinator: Arc<Coordinator>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut poller = PlaybackPoller::new(coordinator);
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = poller.poll_once() => {}
            }
        }
        tracing::debug!("playback poller stopped");
    });
}

#[cfg(test)]
#[path = "playback_tests.rs"]
mod tests;
