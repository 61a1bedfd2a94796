// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::identity::Identity;
use crate::registry::Connection;

struct Client {
    conn: Arc<Connection>,
    rx: mpsc::Receiver<Message>,
}

fn client(registry: &ConnectionRegistry, id: &str, identity: &str) -> anyhow::Result<Client> {
    let (tx, rx) = mpsc::channel(8);
    let conn = Arc::new(Connection::new(
        id.to_owned(),
        Identity::new(identity, identity),
        tx,
        CancellationToken::new(),
        Arc::new(AtomicU64::new(0)),
    ));
    registry.register(Arc::clone(&conn))?;
    Ok(Client { conn, rx })
}

fn received_events(rx: &mut mpsc::Receiver<Message>) -> anyhow::Result<Vec<String>> {
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        let Message::Text(text) = msg else { anyhow::bail!("expected text frame") };
        let value: serde_json::Value = serde_json::from_str(text.as_str())?;
        events.push(value["event"].as_str().unwrap_or_default().to_owned());
    }
    Ok(events)
}

#[test]
fn identity_target_reaches_every_device() -> anyhow::Result<()> {
    let registry = ConnectionRegistry::new();
    let mut phone = client(&registry, "c1", "alice")?;
    let mut laptop = client(&registry, "c2", "alice")?;
    let mut other = client(&registry, "c3", "bob")?;

    let msg = OutboundMessage::playback_update(serde_json::json!({ "is_playing": true }));
    let report = send(&registry, &msg, &Target::identity("alice"))?;

    assert_eq!(report.resolved, 2);
    assert_eq!(report.delivered, 2);
    assert!(report.skipped.is_empty());
    assert_eq!(received_events(&mut phone.rx)?, vec!["playback_update"]);
    assert_eq!(received_events(&mut laptop.rx)?, vec!["playback_update"]);
    assert!(received_events(&mut other.rx)?.is_empty());
    Ok(())
}

#[test]
fn stale_connection_is_skipped_once() -> anyhow::Result<()> {
    let registry = ConnectionRegistry::new();
    let mut live = client(&registry, "c1", "alice")?;
    let stale = client(&registry, "c2", "alice")?;
    // Closed but not yet deregistered.
    drop(stale.rx);

    let msg = OutboundMessage::playback_update(serde_json::Value::Null);
    let report = send(&registry, &msg, &Target::identity("alice"))?;

    assert_eq!(report.resolved, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(
        report.skipped,
        vec![Skipped { connection_id: "c2".to_owned(), reason: SkipReason::Closed }]
    );
    assert_eq!(received_events(&mut live.rx)?.len(), 1);
    drop(stale.conn);
    Ok(())
}

#[test]
fn cancelled_connection_counts_as_closed() -> anyhow::Result<()> {
    let registry = ConnectionRegistry::new();
    let victim = client(&registry, "c1", "alice")?;
    victim.conn.cancel_token().cancel();

    let report = send(&registry, &OutboundMessage::error("x"), &Target::All)?;
    assert_eq!(report.delivered, 0);
    assert_eq!(report.skipped[0].reason, SkipReason::Closed);
    Ok(())
}

#[test]
fn unknown_connection_target_is_not_found() -> anyhow::Result<()> {
    let registry = ConnectionRegistry::new();
    let report = send(&registry, &OutboundMessage::error("x"), &Target::connection("ghost"))?;
    assert_eq!(report.resolved, 1);
    assert_eq!(report.skipped[0].reason, SkipReason::NotFound);
    Ok(())
}

#[test]
fn full_queue_is_reported() -> anyhow::Result<()> {
    let registry = ConnectionRegistry::new();
    let _slow = client(&registry, "c1", "alice")?;
    let msg = OutboundMessage::error("flood");
    for _ in 0..8 {
        send(&registry, &msg, &Target::All)?;
    }
    let report = send(&registry, &msg, &Target::All)?;
    assert_eq!(report.skipped[0].reason, SkipReason::QueueFull);
    Ok(())
}

#[test]
fn identities_target_dedupes_and_ignores_unknown() -> anyhow::Result<()> {
    let registry = ConnectionRegistry::new();
    let _a = client(&registry, "c1", "alice")?;
    let _b = client(&registry, "c2", "bob")?;
    let _c = client(&registry, "c3", "carol")?;

    let target = Target::Identities {
        ids: vec!["alice".into(), "bob".into(), "alice".into(), "nobody".into()],
    };
    let mut ids = resolve(&registry, &target);
    ids.sort();
    assert_eq!(ids, vec!["c1".to_owned(), "c2".to_owned()]);
    Ok(())
}

#[test]
fn per_target_order_is_send_order() -> anyhow::Result<()> {
    let registry = ConnectionRegistry::new();
    let mut alice = client(&registry, "c1", "alice")?;
    send(&registry, &OutboundMessage::top_artists(serde_json::json!({})), &Target::All)?;
    send(&registry, &OutboundMessage::top_tracks(serde_json::json!({})), &Target::All)?;
    send(&registry, &OutboundMessage::error("last"), &Target::All)?;
    assert_eq!(received_events(&mut alice.rx)?, vec!["top_artists", "top_tracks", "error"]);
    Ok(())
}

#[test]
fn target_wire_format() -> anyhow::Result<()> {
    let target: Target = serde_json::from_str(r#"{"type":"identity","id":"alice"}"#)?;
    assert_eq!(target, Target::identity("alice"));
    let all: Target = serde_json::from_str(r#"{"type":"all"}"#)?;
    assert_eq!(all, Target::All);
    Ok(())
}
