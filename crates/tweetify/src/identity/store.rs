// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity persistence: in-memory map with optional JSON file backing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::identity::{Identity, Tokens};

/// Durable identity storage consumed by the login flow and the coordinator.
///
/// Implementations must be idempotent: repeating `get_or_create` or
/// `update_tokens` with the same arguments leaves the same state.
pub trait IdentityStore: Send + Sync {
    /// Fetch the identity for a provider user id, creating it if absent.
    fn get_or_create(
        &self,
        provider_user_id: &str,
        display_name: &str,
    ) -> Result<Identity, SessionError>;

    /// Replace the token set of an existing identity.
    fn update_tokens(&self, identity_id: &str, tokens: &Tokens) -> Result<Identity, SessionError>;

    fn get(&self, identity_id: &str) -> Result<Option<Identity>, SessionError>;

    /// Mint a new session credential bound to `identity_id`.
    fn issue_session(&self, identity_id: &str) -> Result<String, SessionError>;

    /// Resolve a session credential. `None` for unknown or revoked credentials.
    fn resolve_session(&self, credential: &str) -> Result<Option<Identity>, SessionError>;

    /// Revoke a session credential. Returns whether it existed.
    fn revoke_session(&self, credential: &str) -> Result<bool, SessionError>;
}

/// Persisted identity state.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedIdentities {
    #[serde(default)]
    pub identities: HashMap<String, Identity>,
    /// Session credential to identity id.
    #[serde(default)]
    pub sessions: HashMap<String, String>,
}

/// [`IdentityStore`] backed by a JSON file (or nothing, when in-memory).
pub struct FileIdentityStore {
    path: Option<PathBuf>,
    state: RwLock<PersistedIdentities>,
}

impl FileIdentityStore {
    pub fn in_memory() -> Self {
        Self { path: None, state: RwLock::new(PersistedIdentities::default()) }
    }

    /// Open a file-backed store, loading existing state when the file exists.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let state = if path.exists() { load(&path)? } else { PersistedIdentities::default() };
        tracing::info!(
            path = %path.display(),
            identities = state.identities.len(),
            "identity store opened"
        );
        Ok(Self { path: Some(path), state: RwLock::new(state) })
    }

    /// Bind a caller-chosen credential to an identity.
    pub fn bind_session(&self, credential: &str, identity_id: &str) -> Result<(), SessionError> {
        let mut state = self.state.write();
        if !state.identities.contains_key(identity_id) {
            return Err(SessionError::Store(format!("unknown identity: {identity_id}")));
        }
        state.sessions.insert(credential.to_owned(), identity_id.to_owned());
        self.persist(&state)
    }

    pub fn identity_count(&self) -> usize {
        self.state.read().identities.len()
    }

    /// Write state to disk. Called with the write lock held so file writes
    /// land in mutation order.
    fn persist(&self, state: &PersistedIdentities) -> Result<(), SessionError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        save(path, state).map_err(|e| {
            tracing::error!(path = %path.display(), err = %e, "failed to persist identity store");
            SessionError::Store(e.to_string())
        })
    }
}

impl IdentityStore for FileIdentityStore {
    fn get_or_create(
        &self,
        provider_user_id: &str,
        display_name: &str,
    ) -> Result<Identity, SessionError> {
        if provider_user_id.is_empty() {
            return Err(SessionError::Store("empty provider user id".to_owned()));
        }
        let mut state = self.state.write();
        if let Some(existing) = state.identities.get_mut(provider_user_id) {
            if existing.display_name == display_name {
                return Ok(existing.clone());
            }
            existing.display_name = display_name.to_owned();
            let identity = existing.clone();
            self.persist(&state)?;
            return Ok(identity);
        }

        let identity = Identity::new(provider_user_id, display_name);
        state.identities.insert(provider_user_id.to_owned(), identity.clone());
        self.persist(&state)?;
        tracing::info!(identity = %provider_user_id, "identity created");
        Ok(identity)
    }

    fn update_tokens(&self, identity_id: &str, tokens: &Tokens) -> Result<Identity, SessionError> {
        let mut state = self.state.write();
        let identity = state
            .identities
            .get_mut(identity_id)
            .ok_or_else(|| SessionError::Store(format!("unknown identity: {identity_id}")))?;
        identity.apply_tokens(tokens);
        let identity = identity.clone();
        self.persist(&state)?;
        Ok(identity)
    }

    fn get(&self, identity_id: &str) -> Result<Option<Identity>, SessionError> {
        Ok(self.state.read().identities.get(identity_id).cloned())
    }

    fn issue_session(&self, identity_id: &str) -> Result<String, SessionError> {
        let credential = uuid::Uuid::new_v4().simple().to_string();
        self.bind_session(&credential, identity_id)?;
        Ok(credential)
    }

    fn resolve_session(&self, credential: &str) -> Result<Option<Identity>, SessionError> {
        let state = self.state.read();
        Ok(state.sessions.get(credential).and_then(|id| state.identities.get(id)).cloned())
    }

    fn revoke_session(&self, credential: &str) -> Result<bool, SessionError> {
        let mut state = self.state.write();
        let existed = state.sessions.remove(credential).is_some();
        if existed {
            self.persist(&state)?;
        }
        Ok(existed)
    }
}

/// Load persisted identities from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<PersistedIdentities> {
    let contents = std::fs::read_to_string(path)?;
    let state: PersistedIdentities = serde_json::from_str(&contents)?;
    Ok(state)
}

/// Save persisted identities atomically (write tmp + rename).
pub fn save(path: &Path, state: &PersistedIdentities) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(state)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
