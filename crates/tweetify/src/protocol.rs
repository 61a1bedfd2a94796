// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real-time channel wire format.
//!
//! Inbound frames are JSON objects tagged by `event`. Outbound frames are
//! `{"event": <name>, "payload": <object>}`.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::identity::IdentityView;
use crate::provider::TopQuery;

// -- Inbound -----------------------------------------------------------------

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Present a session credential obtained from the login callback.
    Authenticate { credential: String },
    RequestTopArtists {
        #[serde(flatten)]
        query: TopQuery,
    },
    RequestTopTracks {
        #[serde(flatten)]
        query: TopQuery,
    },
    SubscribePlayback {},
    UnsubscribePlayback {},
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::RequestTopArtists { .. } => "request_top_artists",
            Self::RequestTopTracks { .. } => "request_top_tracks",
            Self::SubscribePlayback {} => "subscribe_playback",
            Self::UnsubscribePlayback {} => "unsubscribe_playback",
        }
    }
}

// -- Outbound ----------------------------------------------------------------

pub const AUTH_OK: &str = "auth_ok";
pub const AUTH_ERROR: &str = "auth_error";
pub const TOP_ARTISTS: &str = "top_artists";
pub const TOP_TRACKS: &str = "top_tracks";
pub const PLAYBACK_UPDATE: &str = "playback_update";
pub const ERROR: &str = "error";

/// Server-initiated message: an event name and its payload.
///
/// Immutable once built; the payload has already been converted to JSON, so
/// serialization failures surface at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    event: String,
    payload: serde_json::Value,
}

impl OutboundMessage {
    /// Build a message from any serializable payload.
    pub fn new(event: impl Into<String>, payload: &impl Serialize) -> Result<Self, SessionError> {
        let payload = serde_json::to_value(payload)?;
        Ok(Self { event: event.into(), payload })
    }

    pub fn from_value(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { event: event.into(), payload }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Serialize into a text frame.
    pub fn to_frame(&self) -> Result<Utf8Bytes, SessionError> {
        Ok(serde_json::to_string(self)?.into())
    }

    pub fn auth_ok(identity: &IdentityView) -> Self {
        Self::from_value(AUTH_OK, serde_json::json!({ "identity": identity }))
    }

    pub fn auth_error(reason: impl Into<String>) -> Self {
        Self::from_value(AUTH_ERROR, serde_json::json!({ "reason": reason.into() }))
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::from_value(ERROR, serde_json::json!({ "reason": reason.into() }))
    }

    pub fn top_artists(payload: serde_json::Value) -> Self {
        Self::from_value(TOP_ARTISTS, payload)
    }

    pub fn top_tracks(payload: serde_json::Value) -> Self {
        Self::from_value(TOP_TRACKS, payload)
    }

    pub fn playback_update(payload: serde_json::Value) -> Self {
        Self::from_value(PLAYBACK_UPDATE, payload)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
