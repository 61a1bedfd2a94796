// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Error codes for the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    Unauthorized,
    BadRequest,
    AuthExchange,
    Internal,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::AuthExchange => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::AuthExchange => "AUTH_EXCHANGE",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&SessionError> for ApiError {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::AuthExchange { .. } | SessionError::ProviderApi(_) => Self::AuthExchange,
            SessionError::InvalidCredential(_) => Self::Unauthorized,
            SessionError::MalformedMessage(_) => Self::BadRequest,
            SessionError::RegistryInvariant(_) | SessionError::Store(_) => Self::Internal,
        }
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Failures of the session layer. Every variant is scoped to the connection
/// or request that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Token exchange or refresh against the provider failed.
    #[error("token exchange failed ({code}): {message}")]
    AuthExchange {
        /// Provider error code (`invalid_grant`, ...) or `timeout` / `transport` / `http_<status>`.
        code: String,
        message: String,
    },

    /// Bad, unknown or revoked session credential. Terminates the connection.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Provider Web API call failed. Reported to the originating connection only.
    #[error("provider api error: {0}")]
    ProviderApi(#[from] ProviderError),

    /// The registry indexes disagree or an id was registered twice.
    #[error("registry invariant violated: {0}")]
    RegistryInvariant(String),

    /// Identity store read or write failed.
    #[error("identity store: {0}")]
    Store(String),

    /// Outbound payload could not be serialized.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),
}

impl SessionError {
    pub fn auth_exchange(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthExchange { code: code.into(), message: message.into() }
    }

    /// True when the provider reported the refresh token as revoked.
    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::AuthExchange { code, .. } if code == "invalid_grant")
    }

    /// Hard authentication failures end the connection; everything else is
    /// reported to the client and the connection stays open.
    pub fn closes_connection(&self) -> bool {
        match self {
            Self::InvalidCredential(_) => true,
            Self::ProviderApi(e) => !e.is_transient(),
            Self::AuthExchange { .. } => self.is_revoked(),
            _ => false,
        }
    }
}

/// Failures of the provider Web API client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("access token rejected")]
    Unauthorized,

    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Transient failures keep the connection open; only a rejected token
    /// can escalate to closing it.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Unauthorized)
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
