// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real-time channel over WebSocket.
//!
//! Each socket runs three tasks: this reader loop, a writer draining the
//! connection's bounded outbound queue, and the session worker processing
//! inbound events in order.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::state::{epoch_ms, AppState};

/// Inbound frames buffered ahead of the session worker.
const INBOUND_CAPACITY: usize = 32;

/// `GET /ws` — WebSocket upgrade. Authentication happens in-band.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(state, socket))
}

/// Per-connection event loop.
async fn handle_ws(state: Arc<AppState>, socket: WebSocket) {
    let (session, outbound_rx) = state.coordinator.accept();
    let connection_id = session.id().to_owned();
    let cancel = session.cancel_token();
    let last_seen = session.last_seen();
    let pinger = session.outbound();

    let (ws_tx, mut ws_rx) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(INBOUND_CAPACITY);

    let worker = tokio::spawn(session.run(inbound_rx));
    let writer = tokio::spawn(write_loop(ws_tx, outbound_rx, cancel.clone()));

    let mut ping = tokio::time::interval(state.config.ping_interval());
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = state.shutdown.cancelled() => break,

            _ = ping.tick() => {
                if pinger.try_send(Message::Ping(Bytes::new())).is_err() {
                    tracing::debug!(connection_id = %connection_id, "ping skipped, outbound queue busy");
                }
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_seen.store(epoch_ms(), Ordering::Relaxed);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            sent = inbound_tx.send(text.as_str().to_owned()) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, err = %e, "websocket read failed");
                        break;
                    }
                    // Pong, ping, binary: liveness only.
                    Some(Ok(_)) => last_seen.store(epoch_ms(), Ordering::Relaxed),
                }
            }
        }
    }

    drop(inbound_tx);
    cancel.cancel();
    let _ = worker.await;
    let _ = writer.await;
    tracing::debug!(connection_id = %connection_id, "websocket closed");
}

/// Drain the outbound queue into the socket. On cancellation, flush what is
/// already queued and send a close frame.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            msg = outbound_rx.recv() => {
                let Some(msg) = msg else { break };
                if ws_tx.send(msg).await.is_err() {
                    return;
                }
            }
            _ = cancel.cancelled() => {
                while let Ok(msg) = outbound_rx.try_recv() {
                    if ws_tx.send(msg).await.is_err() {
                        return;
                    }
                }
                break;
            }
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}
