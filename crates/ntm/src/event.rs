// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic-tagged events carried by the process-wide bus.
//!
//! Topics are dotted strings (`pane.state`, `mail.received`, ...). The
//! serialized form tags each event with its topic so WebSocket clients can
//! filter without knowing the Rust enum.

use serde::{Deserialize, Serialize};

use crate::observer::PaneState;
use crate::provider::AgentType;

/// A single bus event: process-wide sequence number, wall-clock stamp,
/// optional session/pane scoping, and the topic-tagged payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub ts_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pane: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Topic-tagged event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum EventKind {
    #[serde(rename = "pane.state")]
    PaneState { prev: PaneState, next: PaneState, reason: String },
    #[serde(rename = "pane.output")]
    PaneOutput { lines: Vec<String> },
    #[serde(rename = "pane.context")]
    PaneContext { used: u64, limit: u64, threshold: u8 },
    #[serde(rename = "pane.read_failed")]
    PaneReadFailed { consecutive: u32 },
    #[serde(rename = "agent.spawned")]
    AgentSpawned { agent_name: String, agent_type: AgentType },
    #[serde(rename = "agent.crashed")]
    AgentCrashed { agent_name: String, restarts: u32 },
    #[serde(rename = "session.created")]
    SessionCreated { name: String },
    #[serde(rename = "session.killed")]
    SessionKilled { name: String },
    #[serde(rename = "mail.received")]
    MailReceived {
        id: String,
        project_key: String,
        from_agent: String,
        to: Vec<String>,
        subject: String,
        importance: String,
    },
    #[serde(rename = "bead.updated")]
    BeadUpdated { id: String, project_key: String, action: String, agent: String },
    #[serde(rename = "alert.fired")]
    AlertFired { category: String, detail: String },
    #[serde(rename = "lock.acquired")]
    LockAcquired { resource: String, holder: String },
    #[serde(rename = "lock.released")]
    LockReleased { resource: String, holder: String, reason: String },
    #[serde(rename = "account.rotation")]
    AccountRotation { provider: String, prev: String, next: String, automatic: bool },
    #[serde(rename = "message.delivered")]
    MessageDelivered { message_id: String },
    #[serde(rename = "message.acked")]
    MessageAcked { message_id: String },
    #[serde(rename = "bus.overflow")]
    BusOverflow { dropped: u64 },
}

impl EventKind {
    /// The dotted topic string for this event.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::PaneState { .. } => "pane.state",
            Self::PaneOutput { .. } => "pane.output",
            Self::PaneContext { .. } => "pane.context",
            Self::PaneReadFailed { .. } => "pane.read_failed",
            Self::AgentSpawned { .. } => "agent.spawned",
            Self::AgentCrashed { .. } => "agent.crashed",
            Self::SessionCreated { .. } => "session.created",
            Self::SessionKilled { .. } => "session.killed",
            Self::MailReceived { .. } => "mail.received",
            Self::BeadUpdated { .. } => "bead.updated",
            Self::AlertFired { .. } => "alert.fired",
            Self::LockAcquired { .. } => "lock.acquired",
            Self::LockReleased { .. } => "lock.released",
            Self::AccountRotation { .. } => "account.rotation",
            Self::MessageDelivered { .. } => "message.delivered",
            Self::MessageAcked { .. } => "message.acked",
            Self::BusOverflow { .. } => "bus.overflow",
        }
    }
}

/// Return the current UTC time as milliseconds since the Unix epoch.
pub fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
