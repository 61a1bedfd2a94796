// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out: deliver one outbound message to a computed set of connections.
//!
//! Targets are resolved through the registry's identity index, so work is
//! proportional to the number of targets, not to the number of connections.
//! Individual delivery failures are recorded in the [`DeliveryReport`] and
//! never fail the whole send.

use std::collections::HashSet;

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::protocol::OutboundMessage;
use crate::registry::{ConnectionId, ConnectionRegistry, SkipReason};

/// Which connections a message is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    /// A single connection.
    Connection { id: ConnectionId },
    /// Every connection of one identity.
    Identity { id: String },
    /// Every connection of each listed identity.
    Identities { ids: Vec<String> },
    /// Every registered connection.
    All,
}

impl Target {
    pub fn identity(id: impl Into<String>) -> Self {
        Self::Identity { id: id.into() }
    }

    pub fn connection(id: impl Into<ConnectionId>) -> Self {
        Self::Connection { id: id.into() }
    }
}

/// A target that did not receive the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub connection_id: ConnectionId,
    pub reason: SkipReason,
}

/// Outcome of a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Connection ids the target resolved to.
    pub resolved: usize,
    pub delivered: usize,
    pub skipped: Vec<Skipped>,
}

/// Resolve a target to connection ids against a registry snapshot.
pub fn resolve(registry: &ConnectionRegistry, target: &Target) -> Vec<ConnectionId> {
    match target {
        Target::Connection { id } => vec![id.clone()],
        Target::Identity { id } => registry.connections_for(id).into_iter().collect(),
        Target::Identities { ids } => {
            let mut seen = HashSet::new();
            ids.iter()
                .flat_map(|id| registry.connections_for(id))
                .filter(|cid| seen.insert(cid.clone()))
                .collect()
        }
        Target::All => registry.all_connection_ids(),
    }
}

/// Deliver `message` to every live connection `target` resolves to.
///
/// The message is serialized once; that is the only failure that aborts
/// the send.
pub fn send(
    registry: &ConnectionRegistry,
    message: &OutboundMessage,
    target: &Target,
) -> Result<DeliveryReport, SessionError> {
    let frame = message.to_frame()?;
    let ids = resolve(registry, target);
    let mut report = DeliveryReport { resolved: ids.len(), ..Default::default() };

    for id in ids {
        let outcome = match registry.lookup(&id) {
            Some(conn) => conn.deliver(Message::Text(frame.clone())),
            None => Err(SkipReason::NotFound),
        };
        match outcome {
            Ok(()) => report.delivered += 1,
            Err(reason) => {
                tracing::debug!(connection_id = %id, ?reason, event = message.event(), "delivery skipped");
                report.skipped.push(Skipped { connection_id: id, reason });
            }
        }
    }

    if !report.skipped.is_empty() {
        tracing::debug!(
            event = message.event(),
            resolved = report.resolved,
            delivered = report.delivered,
            skipped = report.skipped.len(),
            "fan-out partially delivered"
        );
    }
    Ok(report)
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
