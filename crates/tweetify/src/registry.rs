// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry: every live, authenticated real-time connection.
//!
//! Two indexes are kept: `connection id -> Connection` and
//! `identity id -> {connection id}`. Both live behind a single mutex and are
//! mutated together, so no caller can observe one without the other. The
//! lock is never held across an await and the registry performs no I/O.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::identity::{Identity, IdentityView, Tokens};
use crate::state::epoch_ms;

pub type ConnectionId = String;

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The connection id is not (or no longer) registered.
    NotFound,
    /// The connection is closing or its writer has gone away.
    Closed,
    /// The outbound queue is full; the client is not keeping up.
    QueueFull,
}

/// One live real-time channel bound to an authenticated identity.
pub struct Connection {
    pub id: ConnectionId,
    identity_id: String,
    identity: RwLock<Identity>,
    pub created_at: u64,
    last_seen: Arc<AtomicU64>,
    playback: AtomicBool,
    outbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        identity: Identity,
        outbound: mpsc::Sender<Message>,
        cancel: CancellationToken,
        last_seen: Arc<AtomicU64>,
    ) -> Self {
        Self {
            id,
            identity_id: identity.id.clone(),
            identity: RwLock::new(identity),
            created_at: epoch_ms(),
            last_seen,
            playback: AtomicBool::new(false),
            outbound,
            cancel,
        }
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    /// Snapshot of this connection's identity, tokens included. Only used for
    /// provider calls made on behalf of this connection.
    pub fn identity(&self) -> Identity {
        self.identity.read().clone()
    }

    pub fn view(&self) -> IdentityView {
        self.identity.read().view()
    }

    pub fn set_tokens(&self, tokens: &Tokens) {
        self.identity.write().apply_tokens(tokens);
    }

    pub fn touch(&self) {
        self.last_seen.store(epoch_ms(), Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen.load(Ordering::Relaxed)
    }

    pub fn set_playback(&self, enabled: bool) {
        self.playback.store(enabled, Ordering::Relaxed);
    }

    pub fn wants_playback(&self) -> bool {
        self.playback.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.outbound.is_closed()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue a frame without waiting.
    pub fn deliver(&self, frame: Message) -> Result<(), SkipReason> {
        if self.cancel.is_cancelled() {
            return Err(SkipReason::Closed);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SkipReason::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SkipReason::Closed,
        })
    }
}

#[derive(Default)]
struct Indexes {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    by_identity: HashMap<String, HashSet<ConnectionId>>,
}

/// In-memory table of live connections with an identity secondary index.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Indexes>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection under its id and index it by identity.
    ///
    /// A duplicate id means id generation is broken; the registry is left
    /// untouched and the violation is reported.
    pub fn register(&self, connection: Arc<Connection>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.connections.contains_key(&connection.id) {
            tracing::error!(connection_id = %connection.id, "duplicate connection id");
            return Err(SessionError::RegistryInvariant(format!(
                "duplicate connection id {}",
                connection.id
            )));
        }
        inner
            .by_identity
            .entry(connection.identity_id.clone())
            .or_default()
            .insert(connection.id.clone());
        inner.connections.insert(connection.id.clone(), connection);
        Ok(())
    }

    /// Remove a connection from both indexes and cancel it.
    ///
    /// Returns `None` when the id is already absent, so duplicate close
    /// notifications are harmless.
    pub fn deregister(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.connections.remove(connection_id)?;
            if let Some(ids) = inner.by_identity.get_mut(&removed.identity_id) {
                ids.remove(connection_id);
                if ids.is_empty() {
                    inner.by_identity.remove(&removed.identity_id);
                }
            }
            removed
        };
        removed.cancel.cancel();
        Some(removed)
    }

    pub fn lookup(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.inner.lock().connections.get(connection_id).cloned()
    }

    /// Connection ids for an identity; empty if it has none.
    pub fn connections_for(&self, identity_id: &str) -> HashSet<ConnectionId> {
        self.inner.lock().by_identity.get(identity_id).cloned().unwrap_or_default()
    }

    /// Snapshot of all connection ids.
    pub fn all_connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.lock().connections.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn identity_count(&self) -> usize {
        self.inner.lock().by_identity.len()
    }

    /// One live playback-subscribed connection per identity that has any.
    pub fn subscribed_identities(&self) -> Vec<Arc<Connection>> {
        let inner = self.inner.lock();
        inner
            .by_identity
            .values()
            .filter_map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.connections.get(id))
                    .find(|c| c.wants_playback() && !c.is_closed())
                    .cloned()
            })
            .collect()
    }

    /// Push refreshed tokens to every live connection of an identity.
    /// Returns how many connections were updated.
    pub fn update_identity_tokens(&self, identity_id: &str, tokens: &Tokens) -> usize {
        let targets: Vec<Arc<Connection>> = {
            let inner = self.inner.lock();
            match inner.by_identity.get(identity_id) {
                Some(ids) => ids.iter().filter_map(|id| inner.connections.get(id)).cloned().collect(),
                None => return 0,
            }
        };
        for connection in &targets {
            connection.set_tokens(tokens);
        }
        targets.len()
    }

    /// Ids of connections not seen since `cutoff_ms` (epoch millis).
    pub fn stale_connections(&self, cutoff_ms: u64) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .connections
            .values()
            .filter(|c| c.last_seen() < cutoff_ms)
            .map(|c| c.id.clone())
            .collect()
    }

    /// Verify that the two indexes describe the same set of connections.
    pub fn check_consistency(&self) -> Result<(), SessionError> {
        let inner = self.inner.lock();
        let mut indexed = 0usize;
        for (identity_id, ids) in &inner.by_identity {
            if ids.is_empty() {
                return Err(SessionError::RegistryInvariant(format!(
                    "empty connection set left for {identity_id}"
                )));
            }
            for id in ids {
                match inner.connections.get(id) {
                    Some(c) if c.identity_id == *identity_id => indexed += 1,
                    Some(_) => {
                        return Err(SessionError::RegistryInvariant(format!(
                            "connection {id} indexed under wrong identity {identity_id}"
                        )))
                    }
                    None => {
                        return Err(SessionError::RegistryInvariant(format!(
                            "indexed connection {id} missing from primary table"
                        )))
                    }
                }
            }
        }
        if indexed != inner.connections.len() {
            return Err(SessionError::RegistryInvariant(format!(
                "{} connections but {indexed} indexed",
                inner.connections.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
