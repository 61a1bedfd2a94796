// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn tokens(access: &str) -> Tokens {
    Tokens {
        access_token: access.to_owned(),
        refresh_token: Some(format!("{access}-refresh")),
        expires_at: 4_000_000_000,
    }
}

#[test]
fn get_or_create_is_idempotent() -> anyhow::Result<()> {
    let store = FileIdentityStore::in_memory();
    let first = store.get_or_create("alice", "Alice")?;
    let second = store.get_or_create("alice", "Alice")?;
    assert_eq!(first, second);
    assert_eq!(store.identity_count(), 1);
    Ok(())
}

#[test]
fn get_or_create_updates_display_name_but_keeps_tokens() -> anyhow::Result<()> {
    let store = FileIdentityStore::in_memory();
    store.get_or_create("alice", "Alice")?;
    store.update_tokens("alice", &tokens("a1"))?;
    let renamed = store.get_or_create("alice", "Alice L.")?;
    assert_eq!(renamed.display_name, "Alice L.");
    assert_eq!(renamed.access_token, "a1");
    Ok(())
}

#[test]
fn empty_provider_id_is_rejected() {
    let store = FileIdentityStore::in_memory();
    assert!(matches!(store.get_or_create("", "Nobody"), Err(SessionError::Store(_))));
}

#[test]
fn update_tokens_unknown_identity_fails() {
    let store = FileIdentityStore::in_memory();
    let err = store.update_tokens("ghost", &tokens("x"));
    assert!(matches!(err, Err(SessionError::Store(_))));
}

#[test]
fn sessions_resolve_and_revoke() -> anyhow::Result<()> {
    let store = FileIdentityStore::in_memory();
    store.get_or_create("alice", "Alice")?;
    let credential = store.issue_session("alice")?;

    let resolved = store.resolve_session(&credential)?;
    assert_eq!(resolved.map(|i| i.id), Some("alice".to_owned()));

    assert!(store.revoke_session(&credential)?);
    assert!(!store.revoke_session(&credential)?);
    assert!(store.resolve_session(&credential)?.is_none());
    Ok(())
}

#[test]
fn issued_credentials_are_unique() -> anyhow::Result<()> {
    let store = FileIdentityStore::in_memory();
    store.get_or_create("alice", "Alice")?;
    let a = store.issue_session("alice")?;
    let b = store.issue_session("alice")?;
    assert_ne!(a, b);
    Ok(())
}

#[test]
fn bind_session_requires_known_identity() {
    let store = FileIdentityStore::in_memory();
    assert!(store.bind_session("tok123", "alice").is_err());
}

#[test]
fn file_store_round_trips_through_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("identities.json");

    {
        let store = FileIdentityStore::open(&path)?;
        store.get_or_create("alice", "Alice")?;
        store.update_tokens("alice", &tokens("a1"))?;
        store.bind_session("tok123", "alice")?;
    }

    let reopened = FileIdentityStore::open(&path)?;
    let alice = reopened.resolve_session("tok123")?;
    let alice = alice.ok_or_else(|| anyhow::anyhow!("session lost across reopen"))?;
    assert_eq!(alice.access_token, "a1");
    assert_eq!(alice.refresh_token.as_deref(), Some("a1-refresh"));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind");
    Ok(())
}
