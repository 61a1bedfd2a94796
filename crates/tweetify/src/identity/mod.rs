// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity records and login session credentials.
//!
//! An [`Identity`] is the durable user profile keyed by the provider's user
//! id. Session credentials are opaque handles minted at login and presented
//! on the real-time channel to recover the identity.

pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::oauth::TokenResponse;

pub use store::{FileIdentityStore, IdentityStore};

/// Seconds before expiry at which an access token is treated as stale.
pub const EXPIRY_SKEW_SECS: u64 = 60;

/// Durable user profile with provider tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider user id.
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as epoch seconds. Zero means unknown / no expiry.
    #[serde(default)]
    pub expires_at: u64,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            access_token: String::new(),
            refresh_token: None,
            expires_at: 0,
        }
    }

    /// Public projection, safe to send to clients.
    pub fn view(&self) -> IdentityView {
        IdentityView { id: self.id.clone(), display_name: self.display_name.clone() }
    }

    /// True when the access token is missing or within the expiry skew.
    pub fn needs_refresh(&self, now_secs: u64) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        self.expires_at != 0 && self.expires_at <= now_secs + EXPIRY_SKEW_SECS
    }

    pub fn apply_tokens(&mut self, tokens: &Tokens) {
        self.access_token = tokens.access_token.clone();
        if tokens.refresh_token.is_some() {
            self.refresh_token = tokens.refresh_token.clone();
        }
        self.expires_at = tokens.expires_at;
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Identity fields that may leave the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityView {
    pub id: String,
    pub display_name: String,
}

/// A token set as stored against an identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Tokens {
    pub access_token: String,
    /// `None` keeps the previously stored refresh token.
    pub refresh_token: Option<String>,
    pub expires_at: u64,
}

impl Tokens {
    pub fn from_response(resp: &TokenResponse, now_secs: u64) -> Self {
        Self {
            access_token: resp.access_token.clone(),
            refresh_token: resp.refresh_token.clone(),
            expires_at: if resp.expires_in == 0 { 0 } else { now_secs + resp.expires_in },
        }
    }
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens").field("expires_at", &self.expires_at).finish_non_exhaustive()
    }
}

/// Return current epoch seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
