// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn with_token(expires_at: u64) -> Identity {
    let mut identity = Identity::new("alice", "Alice");
    identity.access_token = "access".to_owned();
    identity.expires_at = expires_at;
    identity
}

#[test]
fn view_omits_tokens() -> anyhow::Result<()> {
    let identity = with_token(0);
    let json = serde_json::to_value(identity.view())?;
    assert_eq!(json, serde_json::json!({ "id": "alice", "display_name": "Alice" }));
    Ok(())
}

#[test]
fn debug_redacts_tokens() {
    let mut identity = with_token(0);
    identity.refresh_token = Some("refresh-secret".to_owned());
    let debug = format!("{identity:?}");
    assert!(!debug.contains("access\""));
    assert!(!debug.contains("refresh-secret"));
    assert!(debug.contains("<redacted>"));
}

#[test]
fn needs_refresh_respects_skew() {
    let now = 1_000_000;
    assert!(!with_token(0).needs_refresh(now), "zero expiry never refreshes");
    assert!(!with_token(now + 3600).needs_refresh(now));
    assert!(with_token(now + EXPIRY_SKEW_SECS).needs_refresh(now));
    assert!(with_token(now - 1).needs_refresh(now));
    assert!(Identity::new("bob", "Bob").needs_refresh(now), "missing token refreshes");
}

#[test]
fn apply_tokens_keeps_refresh_token_when_absent() {
    let mut identity = with_token(10);
    identity.refresh_token = Some("old-refresh".to_owned());
    identity.apply_tokens(&Tokens {
        access_token: "new-access".to_owned(),
        refresh_token: None,
        expires_at: 99,
    });
    assert_eq!(identity.access_token, "new-access");
    assert_eq!(identity.refresh_token.as_deref(), Some("old-refresh"));
    assert_eq!(identity.expires_at, 99);
}

#[test]
fn tokens_from_response_computes_expiry() {
    let resp = TokenResponse {
        access_token: "a".to_owned(),
        refresh_token: Some("r".to_owned()),
        expires_in: 3600,
        token_type: None,
        scope: None,
    };
    let tokens = Tokens::from_response(&resp, 100);
    assert_eq!(tokens.expires_at, 3700);

    let no_expiry = TokenResponse { expires_in: 0, ..resp };
    assert_eq!(Tokens::from_response(&no_expiry, 100).expires_at, 0);
}
