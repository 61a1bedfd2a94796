// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Scopes requested from the provider when none are configured.
pub const DEFAULT_SCOPES: &str =
    "user-top-read user-read-private user-read-currently-playing user-read-playback-state";

/// Configuration for the tweetify session server.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "tweetify", version, about = "Real-time listening activity server")]
pub struct Config {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "TWEETIFY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "PORT")]
    pub port: u16,

    /// OAuth client id issued by the provider.
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret issued by the provider.
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Redirect URI registered with the provider (points at `/callback`).
    #[arg(long, default_value = "http://127.0.0.1:8080/callback", env = "TWEETIFY_REDIRECT_URI")]
    pub redirect_uri: String,

    /// Space-separated OAuth scopes.
    #[arg(long, default_value = DEFAULT_SCOPES, env = "TWEETIFY_SCOPES")]
    pub scopes: String,

    /// Provider authorization endpoint.
    #[arg(
        long,
        default_value = "https://accounts.spotify.com/authorize",
        env = "TWEETIFY_AUTHORIZE_URL"
    )]
    pub authorize_url: String,

    /// Provider token endpoint.
    #[arg(
        long,
        default_value = "https://accounts.spotify.com/api/token",
        env = "TWEETIFY_TOKEN_URL"
    )]
    pub token_url: String,

    /// Provider Web API base URL.
    #[arg(long, default_value = "https://api.spotify.com/v1", env = "TWEETIFY_API_BASE_URL")]
    pub api_base_url: String,

    /// Identity store file. If unset, identities live in memory only.
    #[arg(long, env = "TWEETIFY_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Bearer token for the admin push API. If unset, auth is disabled.
    #[arg(long, env = "TWEETIFY_ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    /// Timeout for every call to the provider (token exchange and Web API).
    #[arg(long, default_value_t = 10_000, env = "TWEETIFY_EXTERNAL_TIMEOUT_MS")]
    pub external_timeout_ms: u64,

    /// Currently-playing poll interval in milliseconds.
    #[arg(long, default_value_t = 5_000, env = "TWEETIFY_PLAYBACK_POLL_MS")]
    pub playback_poll_ms: u64,

    /// WebSocket ping interval in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "TWEETIFY_PING_INTERVAL_MS")]
    pub ping_interval_ms: u64,

    /// Connections silent for longer than this are evicted.
    #[arg(long, default_value_t = 90_000, env = "TWEETIFY_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: u64,

    /// Idle sweep interval in milliseconds.
    #[arg(long, default_value_t = 15_000, env = "TWEETIFY_SWEEP_INTERVAL_MS")]
    pub sweep_interval_ms: u64,

    /// Per-connection outbound queue capacity.
    #[arg(long, default_value_t = 64, env = "TWEETIFY_OUTBOUND_CAPACITY")]
    pub outbound_capacity: usize,
}

impl Config {
    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }

    pub fn playback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.playback_poll_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Config with local defaults and placeholder credentials, for tests and
    /// embedding. Provider URLs point at an unroutable local port.
    pub fn for_local(client_id: &str, client_secret: &str) -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 0,
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            redirect_uri: "http://127.0.0.1:8080/callback".to_owned(),
            scopes: DEFAULT_SCOPES.to_owned(),
            authorize_url: "https://accounts.spotify.com/authorize".to_owned(),
            token_url: "http://127.0.0.1:9/api/token".to_owned(),
            api_base_url: "http://127.0.0.1:9/v1".to_owned(),
            store_path: None,
            admin_token: None,
            external_timeout_ms: 2_000,
            playback_poll_ms: 60_000,
            ping_interval_ms: 60_000,
            idle_timeout_ms: 600_000,
            sweep_interval_ms: 60_000,
            outbound_capacity: 64,
        }
    }
}
