// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization-code exchange and token refresh.

use std::time::Duration;

use crate::config::Config;
use crate::error::SessionError;
use crate::oauth::{TokenErrorBody, TokenResponse};

/// Client for the provider token endpoint.
#[derive(Clone)]
pub struct TokenExchange {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl TokenExchange {
    pub fn new(config: &Config) -> Self {
        Self::with_timeout(config, config.external_timeout())
    }

    pub fn with_timeout(config: &Config, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder().timeout(timeout).build().unwrap_or_default(),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }

    /// Exchange an authorization code for an access/refresh token pair.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, SessionError> {
        self.post(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ])
        .await
    }

    /// Obtain a fresh access token. The provider may omit a new refresh token,
    /// in which case the caller keeps the old one.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, SessionError> {
        self.post(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ])
        .await
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<TokenResponse, SessionError> {
        let resp = self.http.post(&self.token_url).form(form).send().await.map_err(|e| {
            if e.is_timeout() {
                SessionError::auth_exchange("timeout", "token endpoint did not respond in time")
            } else {
                SessionError::auth_exchange("transport", e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let body: TokenErrorBody = serde_json::from_str(&text).unwrap_or_default();
            let code = if body.error.is_empty() {
                format!("http_{}", status.as_u16())
            } else {
                body.error
            };
            let message = body.error_description.unwrap_or(text);
            tracing::debug!(%status, code = %code, "token endpoint rejected request");
            return Err(SessionError::AuthExchange { code, message });
        }

        resp.json::<TokenResponse>().await.map_err(|e| {
            if e.is_timeout() {
                SessionError::auth_exchange("timeout", "token response body timed out")
            } else {
                SessionError::auth_exchange("invalid_response", e.to_string())
            }
        })
    }
}

#[cfg(test)]
#[path = "exchange_tests.rs"]
mod tests;
