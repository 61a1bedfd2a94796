// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the music provider's Web API.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ProviderError;
use crate::oauth::urlencoded;

/// Profile fields read from `GET /me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Profile {
    pub fn display_name_or_id(&self) -> &str {
        self.display_name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.id)
    }
}

/// Query for the top-items endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_time_range")]
    pub time_range: String,
}

fn default_limit() -> u32 {
    20
}

fn default_time_range() -> String {
    "medium_term".to_owned()
}

impl Default for TopQuery {
    fn default() -> Self {
        Self { limit: default_limit(), time_range: default_time_range() }
    }
}

impl TopQuery {
    /// Limit clamped to the provider's accepted range.
    pub fn clamped_limit(&self) -> u32 {
        self.limit.clamp(1, 50)
    }
}

/// Data a connection can ask the provider for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRequest {
    TopArtists(TopQuery),
    TopTracks(TopQuery),
    CurrentlyPlaying,
}

/// Provider Web API client. Every request carries the configured timeout.
#[derive(Clone)]
pub struct ProviderClient {
    base_url: String,
    client: Client,
}

impl ProviderClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url: base_url.into().trim_end_matches('/').to_owned(), client }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_base_url.clone(), config.external_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch the profile of the token's owner.
    pub async fn me(&self, access_token: &str) -> Result<Profile, ProviderError> {
        let value = self.get_json(access_token, "/me", &[]).await?;
        serde_json::from_value(value).map_err(|e| ProviderError::Status {
            status: 200,
            body: format!("unexpected profile shape: {e}"),
        })
    }

    pub async fn top_artists(
        &self,
        access_token: &str,
        query: &TopQuery,
    ) -> Result<serde_json::Value, ProviderError> {
        self.top("/me/top/artists", access_token, query).await
    }

    pub async fn top_tracks(
        &self,
        access_token: &str,
        query: &TopQuery,
    ) -> Result<serde_json::Value, ProviderError> {
        self.top("/me/top/tracks", access_token, query).await
    }

    /// Currently-playing state. `Value::Null` when nothing is playing.
    pub async fn currently_playing(
        &self,
        access_token: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        self.get_json(access_token, "/me/player/currently-playing", &[]).await
    }

    /// Dispatch a [`ProviderRequest`].
    pub async fn fetch(
        &self,
        access_token: &str,
        request: &ProviderRequest,
    ) -> Result<serde_json::Value, ProviderError> {
        match request {
            ProviderRequest::TopArtists(q) => self.top_artists(access_token, q).await,
            ProviderRequest::TopTracks(q) => self.top_tracks(access_token, q).await,
            ProviderRequest::CurrentlyPlaying => self.currently_playing(access_token).await,
        }
    }

    async fn top(
        &self,
        path: &str,
        access_token: &str,
        query: &TopQuery,
    ) -> Result<serde_json::Value, ProviderError> {
        let limit = query.clamped_limit().to_string();
        self.get_json(
            access_token,
            path,
            &[("limit", limit.as_str()), ("time_range", query.time_range.as_str())],
        )
        .await
    }

    async fn get_json(
        &self,
        access_token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value, ProviderError> {
        let mut url = self.url(path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&urlencoded(query));
        }
        let resp = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&e))?;

        let status = resp.status();
        match status {
            StatusCode::NO_CONTENT => return Ok(serde_json::Value::Null),
            StatusCode::UNAUTHORIZED => return Err(ProviderError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok());
                return Err(ProviderError::RateLimited { retry_after });
            }
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(ProviderError::Status { status: s.as_u16(), body });
            }
            _ => {}
        }

        let bytes = resp.bytes().await.map_err(|e| ProviderError::from_reqwest(&e))?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Status {
            status: status.as_u16(),
            body: format!("invalid json: {e}"),
        })
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
