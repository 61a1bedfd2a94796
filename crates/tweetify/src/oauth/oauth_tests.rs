// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn authorize_url_includes_params() -> anyhow::Result<()> {
    let config = Config::for_local("client-123", "secret");
    let url = build_authorize_url(&config);
    assert!(url.starts_with("https://accounts.spotify.com/authorize?client_id=client-123&"));
    assert!(url.contains("response_type=code"));
    assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8080%2Fcallback"));
    assert!(url.contains("scope=user-top-read%20user-read-private"));
    assert!(url.ends_with("&show_dialog=true"));
    Ok(())
}

#[test]
fn authorize_url_never_leaks_secret() {
    let config = Config::for_local("client-123", "s3cr3t");
    assert!(!build_authorize_url(&config).contains("s3cr3t"));
}

#[test]
fn urlencoded_escapes_reserved_and_multibyte() {
    assert_eq!(urlencoded(&[("a b", "c&d")]), "a%20b=c%26d");
    assert_eq!(urlencoded(&[("k", "é")]), "k=%C3%A9");
    assert_eq!(urlencoded(&[("x", "1"), ("y", "2")]), "x=1&y=2");
}

#[test]
fn token_response_defaults_optional_fields() -> anyhow::Result<()> {
    let token: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#)?;
    assert_eq!(token.access_token, "abc");
    assert_eq!(token.refresh_token, None);
    assert_eq!(token.expires_in, 0);
    Ok(())
}
