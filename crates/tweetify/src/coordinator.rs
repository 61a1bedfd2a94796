// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session coordinator: per-connection state machine and push entry point.
//!
//! Each accepted socket gets a [`ConnectionSession`]:
//!
//! | state           | event                      | next            |
//! |-----------------|----------------------------|-----------------|
//! | Unauthenticated | `authenticate` (valid)     | Authenticated   |
//! | Unauthenticated | `authenticate` (invalid)   | Closed          |
//! | Unauthenticated | anything else              | Unauthenticated |
//! | Authenticated   | domain event               | Authenticated   |
//! | Authenticated   | provider rejects token     | Closed          |
//! | any             | channel close / eviction   | Closed          |
//!
//! Only authenticated sessions have a registry entry. Inbound events of one
//! session are handled one at a time in arrival order by [`ConnectionSession::run`].

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ProviderError, SessionError};
use crate::fanout::{self, DeliveryReport, Target};
use crate::identity::{epoch_secs, Identity, IdentityStore, Tokens};
use crate::oauth::exchange::TokenExchange;
use crate::protocol::{ClientEvent, OutboundMessage};
use crate::provider::{ProviderClient, ProviderRequest};
use crate::registry::{Connection, ConnectionId, ConnectionRegistry};
use crate::state::epoch_ms;

/// Shared coordinator: owns the registry and the external collaborators.
pub struct Coordinator {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn IdentityStore>,
    provider: ProviderClient,
    tokens: TokenExchange,
    outbound_capacity: usize,
    auth_deadline: Duration,
}

impl Coordinator {
    pub fn new(config: &Config, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            store,
            provider: ProviderClient::from_config(config),
            tokens: TokenExchange::new(config),
            outbound_capacity: config.outbound_capacity.max(1),
            auth_deadline: config.idle_timeout(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    pub fn provider(&self) -> &ProviderClient {
        &self.provider
    }

    pub fn token_exchange(&self) -> &TokenExchange {
        &self.tokens
    }

    /// Start a session for a freshly accepted socket.
    ///
    /// Returns the session and the receiving end of its outbound queue, which
    /// the transport drains into the socket.
    pub fn accept(self: &Arc<Self>) -> (ConnectionSession, mpsc::Receiver<Message>) {
        let (outbound, rx) = mpsc::channel(self.outbound_capacity);
        let session = ConnectionSession {
            id: uuid::Uuid::new_v4().to_string(),
            coordinator: Arc::clone(self),
            state: SessionState::Unauthenticated,
            outbound,
            cancel: CancellationToken::new(),
            last_seen: Arc::new(AtomicU64::new(epoch_ms())),
        };
        tracing::debug!(connection_id = %session.id, "connection accepted");
        (session, rx)
    }

    /// Push a server-initiated message to the connections `target` resolves to.
    pub fn push(
        &self,
        message: &OutboundMessage,
        target: &Target,
    ) -> Result<DeliveryReport, SessionError> {
        fanout::send(&self.registry, message, target)
    }

    /// Send `auth_error` to a connection and deregister it.
    pub fn evict(&self, connection_id: &str, reason: &str) -> bool {
        let Some(conn) = self.registry.lookup(connection_id) else {
            return false;
        };
        match OutboundMessage::auth_error(reason).to_frame() {
            Ok(frame) => {
                if let Err(skip) = conn.deliver(Message::Text(frame)) {
                    tracing::debug!(connection_id, ?skip, "auth_error not delivered before eviction");
                }
            }
            Err(e) => tracing::warn!(connection_id, err = %e, "failed to encode auth_error"),
        }
        let removed = self.registry.deregister(connection_id).is_some();
        if removed {
            tracing::info!(connection_id, identity = conn.identity_id(), reason, "connection evicted");
        }
        removed
    }

    /// Read provider data on behalf of one connection.
    ///
    /// Refreshes an expired token up front, and retries once after a refresh
    /// when the provider rejects the token.
    pub async fn fetch_for(
        &self,
        conn: &Connection,
        request: &ProviderRequest,
    ) -> Result<serde_json::Value, SessionError> {
        let mut identity = conn.identity();
        if identity.needs_refresh(epoch_secs()) {
            identity = self.refresh_identity(&identity).await?;
        }

        match self.provider.fetch(&identity.access_token, request).await {
            Err(ProviderError::Unauthorized) => {
                tracing::debug!(identity = %identity.id, "access token rejected, refreshing");
                let identity = self.refresh_identity(&identity).await?;
                Ok(self.provider.fetch(&identity.access_token, request).await?)
            }
            other => Ok(other?),
        }
    }

    /// Refresh an identity's tokens and propagate them to the store and every
    /// live connection of that identity.
    pub async fn refresh_identity(&self, identity: &Identity) -> Result<Identity, SessionError> {
        let Some(refresh_token) = identity.refresh_token.as_deref() else {
            return Err(SessionError::InvalidCredential("no refresh token on record".to_owned()));
        };
        let resp = self.tokens.refresh(refresh_token).await?;
        let tokens = Tokens::from_response(&resp, epoch_secs());
        let updated = self.store.update_tokens(&identity.id, &tokens)?;
        let connections = self.registry.update_identity_tokens(&identity.id, &tokens);
        tracing::info!(identity = %identity.id, connections, "access token refreshed");
        Ok(updated)
    }
}

/// Lifecycle state of one session.
pub enum SessionState {
    Unauthenticated,
    Authenticated(Arc<Connection>),
    Closed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated(_) => "authenticated",
            Self::Closed => "closed",
        }
    }
}

/// Whether the transport should keep the channel open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Per-connection state machine.
pub struct ConnectionSession {
    id: ConnectionId,
    coordinator: Arc<Coordinator>,
    state: SessionState,
    outbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
    last_seen: Arc<AtomicU64>,
}

impl ConnectionSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    /// Sender for frames that bypass the state machine (pings).
    pub fn outbound(&self) -> mpsc::Sender<Message> {
        self.outbound.clone()
    }

    /// Cancelled when the session closes or the registry evicts it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shared last-seen clock, bumped by the transport on every inbound frame.
    pub fn last_seen(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.last_seen)
    }

    /// Process inbound frames in order until the channel or the session ends.
    ///
    /// Unauthenticated sessions must authenticate within the configured
    /// deadline, counted from the start of the session. Ignored or malformed
    /// frames do not extend it.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<String>) {
        let deadline = tokio::time::Instant::now() + self.coordinator.auth_deadline;
        loop {
            let next = if self.is_authenticated() {
                inbound.recv().await
            } else {
                match tokio::time::timeout_at(deadline, inbound.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::debug!(connection_id = %self.id, "authentication deadline elapsed");
                        self.reply(OutboundMessage::auth_error("authentication timed out")).await;
                        break;
                    }
                }
            };
            let Some(text) = next else {
                break;
            };
            if self.handle_text(&text).await == Flow::Close {
                break;
            }
        }
        self.close();
    }

    /// Handle one inbound text frame.
    pub async fn handle_text(&mut self, text: &str) -> Flow {
        if matches!(self.state, SessionState::Closed) {
            return Flow::Close;
        }
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                tracing::debug!(connection_id = %self.id, err = %e, "malformed frame");
                self.reply(OutboundMessage::error(format!("malformed event: {e}"))).await;
                Flow::Continue
            }
        }
    }

    /// Apply one parsed event to the state machine.
    pub async fn handle_event(&mut self, event: ClientEvent) -> Flow {
        let conn = match &self.state {
            SessionState::Closed => return Flow::Close,
            SessionState::Unauthenticated => None,
            SessionState::Authenticated(conn) => Some(Arc::clone(conn)),
        };

        let Some(conn) = conn else {
            return match event {
                ClientEvent::Authenticate { credential } => self.authenticate(&credential).await,
                other => {
                    tracing::debug!(
                        connection_id = %self.id,
                        event = other.name(),
                        "ignoring event before authentication"
                    );
                    Flow::Continue
                }
            };
        };

        conn.touch();
        match event {
            ClientEvent::Authenticate { .. } => {
                self.reply(OutboundMessage::error("already authenticated")).await;
                Flow::Continue
            }
            ClientEvent::RequestTopArtists { query } => {
                self.serve(&conn, ProviderRequest::TopArtists(query), OutboundMessage::top_artists)
                    .await
            }
            ClientEvent::RequestTopTracks { query } => {
                self.serve(&conn, ProviderRequest::TopTracks(query), OutboundMessage::top_tracks)
                    .await
            }
            ClientEvent::SubscribePlayback {} => {
                conn.set_playback(true);
                self.serve(&conn, ProviderRequest::CurrentlyPlaying, OutboundMessage::playback_update)
                    .await
            }
            ClientEvent::UnsubscribePlayback {} => {
                conn.set_playback(false);
                Flow::Continue
            }
        }
    }

    /// Leave the session: deregister if authenticated and cancel the channel.
    /// Safe to call any number of times.
    pub fn close(&mut self) {
        if let SessionState::Authenticated(conn) =
            std::mem::replace(&mut self.state, SessionState::Closed)
        {
            if self.coordinator.registry.deregister(&conn.id).is_some() {
                tracing::info!(
                    connection_id = %conn.id,
                    identity = conn.identity_id(),
                    "connection closed"
                );
            }
        }
        self.cancel.cancel();
    }

    async fn authenticate(&mut self, credential: &str) -> Flow {
        let identity = match self.coordinator.store.resolve_session(credential) {
            Ok(Some(identity)) => identity,
            Ok(None) => return self.reject("unknown or revoked credential").await,
            Err(e) => {
                tracing::warn!(connection_id = %self.id, err = %e, "identity lookup failed");
                return self.reject("identity lookup failed").await;
            }
        };

        let identity = if identity.needs_refresh(epoch_secs()) {
            let refreshed = tokio::select! {
                _ = self.cancel.cancelled() => return Flow::Close,
                r = self.coordinator.refresh_identity(&identity) => r,
            };
            match refreshed {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::warn!(connection_id = %self.id, identity = %identity.id, err = %e, "token refresh during authentication failed");
                    return self.reject(&format!("token refresh failed: {e}")).await;
                }
            }
        } else {
            identity
        };

        let conn = Arc::new(Connection::new(
            self.id.clone(),
            identity,
            self.outbound.clone(),
            self.cancel.clone(),
            Arc::clone(&self.last_seen),
        ));
        conn.touch();
        if let Err(e) = self.coordinator.registry.register(Arc::clone(&conn)) {
            tracing::error!(connection_id = %self.id, err = %e, "registration failed");
            debug_assert!(
                !matches!(e, SessionError::RegistryInvariant(_)),
                "connection registration failed: {e}"
            );
            return self.reject("internal error").await;
        }

        let view = conn.view();
        self.state = SessionState::Authenticated(conn);
        if self.cancel.is_cancelled() {
            return Flow::Close;
        }
        tracing::info!(connection_id = %self.id, identity = %view.id, "connection authenticated");
        self.reply(OutboundMessage::auth_ok(&view)).await;
        Flow::Continue
    }

    async fn reject(&mut self, reason: &str) -> Flow {
        tracing::info!(connection_id = %self.id, reason, "authentication rejected");
        self.reply(OutboundMessage::auth_error(reason)).await;
        Flow::Close
    }

    /// Fetch provider data and reply to this connection only.
    async fn serve(
        &self,
        conn: &Arc<Connection>,
        request: ProviderRequest,
        build: fn(serde_json::Value) -> OutboundMessage,
    ) -> Flow {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::debug!(connection_id = %self.id, "connection closed mid-request, discarding");
                return Flow::Close;
            }
            r = self.coordinator.fetch_for(conn, &request) => r,
        };

        if self.coordinator.registry.lookup(&conn.id).is_none() {
            tracing::debug!(connection_id = %self.id, "connection deregistered mid-request, discarding");
            return Flow::Close;
        }

        match result {
            Ok(payload) => {
                self.reply(build(payload)).await;
                Flow::Continue
            }
            Err(e) if e.closes_connection() => {
                tracing::warn!(connection_id = %self.id, identity = conn.identity_id(), err = %e, "provider authorization lost");
                self.reply(OutboundMessage::auth_error(e.to_string())).await;
                Flow::Close
            }
            Err(e) => {
                tracing::warn!(connection_id = %self.id, err = %e, ?request, "provider request failed");
                self.reply(OutboundMessage::error(e.to_string())).await;
                Flow::Continue
            }
        }
    }

    /// Queue a reply on this connection's outbound queue, in order.
    async fn reply(&self, message: OutboundMessage) {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(connection_id = %self.id, err = %e, "failed to encode reply");
                return;
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            r = self.outbound.send(Message::Text(frame)) => {
                if r.is_err() {
                    tracing::debug!(connection_id = %self.id, "reply dropped, writer gone");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
