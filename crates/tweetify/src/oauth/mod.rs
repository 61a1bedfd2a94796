// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth authorization-code flow against the music provider.
//!
//! The authorize URL is a pure function of configuration. Token exchange and
//! refresh live in [`exchange`].

pub mod exchange;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// OAuth2 error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Build the provider authorization URL the browser is redirected to.
///
/// Parameter order: client_id, response_type, redirect_uri, scope, show_dialog.
pub fn build_authorize_url(config: &Config) -> String {
    let query = urlencoded(&[
        ("client_id", config.client_id.as_str()),
        ("response_type", "code"),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("scope", config.scopes.as_str()),
        ("show_dialog", "true"),
    ]);
    format!("{}?{query}", config.authorize_url.trim_end_matches('?'))
}

/// Build a URL-encoded form body string.
pub fn urlencoded(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding(k), urlencoding(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn urlencoding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;
