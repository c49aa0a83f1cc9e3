// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inter-agent mailboxes, per project key.
//!
//! Envelopes live in one JSONL store per project, atomically rewritten on
//! mutation. A sweep raises `alert.fired(mail_unacked)` for ack-required
//! mail that outlives the project TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::Bus;
use crate::error::{ApiError, ErrorCode};
use crate::event::{now_epoch_ms, EventKind};
use crate::persist::{read_jsonl, rewrite_jsonl, StateDir};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Importance {
    fn default() -> Self {
        Self::Normal
    }
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// One mail envelope. `read_by`/`acked_by` accumulate recipient names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailEnvelope {
    pub id: String,
    pub project_key: String,
    pub from_agent: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body_md: String,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default)]
    pub ack_required: bool,
    pub thread_id: String,
    pub created_at_ms: u64,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub acked_by: Vec<String>,
    /// Set once an unacked alert has fired, so it fires once.
    #[serde(default)]
    pub unacked_alerted: bool,
}

impl MailEnvelope {
    /// All recipients (to + cc + bcc), deduplicated, order preserved.
    pub fn recipients(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for name in self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter()) {
            if !seen.contains(name) {
                seen.push(name.clone());
            }
        }
        seen
    }

    fn fully_acked(&self) -> bool {
        self.recipients().iter().all(|r| self.acked_by.contains(r))
    }
}

/// A send request, before stamping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSendRequest {
    pub project_key: String,
    pub from_agent: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body_md: String,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default)]
    pub ack_required: bool,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Skip redaction for this body (`--allow-secret`). Transport-level;
    /// never persisted on the envelope.
    #[serde(default)]
    pub allow_secret: bool,
}

/// Stable thread id: first 8 hex chars of sha256(subject).
pub fn thread_id_for_subject(subject: &str) -> String {
    let digest = Sha256::digest(subject.as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

/// The mail layer. Envelopes are cached per project and projected to the
/// per-project JSONL store on mutation.
pub struct MailStore {
    state_dir: StateDir,
    bus: Arc<Bus>,
    inboxes: Mutex<HashMap<String, Vec<MailEnvelope>>>,
    ack_ttl: Duration,
}

impl MailStore {
    pub fn new(state_dir: StateDir, bus: Arc<Bus>, ack_ttl: Duration) -> Arc<Self> {
        Arc::new(Self { state_dir, bus, inboxes: Mutex::new(HashMap::new()), ack_ttl })
    }

    async fn with_project<R>(
        &self,
        project_key: &str,
        f: impl FnOnce(&mut Vec<MailEnvelope>) -> R,
    ) -> R {
        let mut inboxes = self.inboxes.lock().await;
        let envelopes = match inboxes.get_mut(project_key) {
            Some(envelopes) => envelopes,
            None => {
                let loaded = read_jsonl(&self.state_dir.mail_path(project_key));
                inboxes.entry(project_key.to_owned()).or_insert(loaded)
            }
        };
        let result = f(envelopes);
        let _ = rewrite_jsonl(&self.state_dir.mail_path(project_key), envelopes);
        result
    }

    /// Validate, stamp, store, and announce a new envelope. The body must
    /// already have passed redaction (the transport applies it).
    pub async fn send(&self, request: MailSendRequest) -> Result<MailEnvelope, ApiError> {
        if request.to.is_empty() {
            return Err(ApiError::new(ErrorCode::InvalidArgument, "mail requires at least one recipient"));
        }
        if request.subject.trim().is_empty() {
            return Err(ApiError::new(ErrorCode::InvalidArgument, "mail requires a subject"));
        }
        for name in request.to.iter().chain(request.cc.iter()).chain(request.bcc.iter()) {
            if name.trim().is_empty() {
                return Err(ApiError::new(ErrorCode::InvalidArgument, "empty recipient name"));
            }
        }
        let envelope = MailEnvelope {
            id: Uuid::new_v4().to_string(),
            project_key: request.project_key.clone(),
            from_agent: request.from_agent,
            to: request.to,
            cc: request.cc,
            bcc: request.bcc,
            thread_id: request
                .thread_id
                .unwrap_or_else(|| thread_id_for_subject(&request.subject)),
            subject: request.subject,
            body_md: request.body_md,
            importance: request.importance,
            ack_required: request.ack_required,
            created_at_ms: now_epoch_ms(),
            read_by: Vec::new(),
            acked_by: Vec::new(),
            unacked_alerted: false,
        };
        self.with_project(&request.project_key, |envelopes| {
            envelopes.push(envelope.clone());
        })
        .await;
        self.bus.publish(
            None,
            None,
            EventKind::MailReceived {
                id: envelope.id.clone(),
                project_key: envelope.project_key.clone(),
                from_agent: envelope.from_agent.clone(),
                to: envelope.to.clone(),
                subject: envelope.subject.clone(),
                importance: envelope.importance.as_str().to_owned(),
            },
        );
        Ok(envelope)
    }

    /// Inbox view for one agent (recipient or sender when `sent` is set).
    pub async fn inbox(
        &self,
        project_key: &str,
        agent: &str,
        unread_only: bool,
    ) -> Vec<MailEnvelope> {
        self.with_project(project_key, |envelopes| {
            envelopes
                .iter()
                .filter(|e| e.recipients().iter().any(|r| r == agent))
                .filter(|e| !unread_only || !e.read_by.iter().any(|r| r == agent))
                .cloned()
                .collect()
        })
        .await
    }

    /// Mark an envelope read by `agent`.
    pub async fn mark_read(&self, project_key: &str, mail_id: &str, agent: &str) -> bool {
        let updated = self
            .with_project(project_key, |envelopes| {
                for envelope in envelopes.iter_mut() {
                    if envelope.id == mail_id && !envelope.read_by.iter().any(|r| r == agent) {
                        envelope.read_by.push(agent.to_owned());
                        return true;
                    }
                }
                false
            })
            .await;
        if updated {
            self.bus.publish(
                None,
                None,
                EventKind::BeadUpdated {
                    id: mail_id.to_owned(),
                    project_key: project_key.to_owned(),
                    action: "read".to_owned(),
                    agent: agent.to_owned(),
                },
            );
        }
        updated
    }

    /// Acknowledge an envelope.
    pub async fn ack(&self, project_key: &str, mail_id: &str, agent: &str) -> bool {
        let updated = self
            .with_project(project_key, |envelopes| {
                for envelope in envelopes.iter_mut() {
                    if envelope.id == mail_id && !envelope.acked_by.iter().any(|r| r == agent) {
                        envelope.acked_by.push(agent.to_owned());
                        return true;
                    }
                }
                false
            })
            .await;
        if updated {
            self.bus.publish(
                None,
                None,
                EventKind::BeadUpdated {
                    id: mail_id.to_owned(),
                    project_key: project_key.to_owned(),
                    action: "acked".to_owned(),
                    agent: agent.to_owned(),
                },
            );
        }
        updated
    }

    /// Raise `alert.fired(mail_unacked)` for overdue ack-required mail in
    /// every loaded project. Each envelope alerts once.
    pub async fn sweep_unacked(&self) -> usize {
        let now = now_epoch_ms();
        let ttl_ms = self.ack_ttl.as_millis() as u64;
        let mut fired = Vec::new();
        {
            let mut inboxes = self.inboxes.lock().await;
            for (project_key, envelopes) in inboxes.iter_mut() {
                let mut dirty = false;
                for envelope in envelopes.iter_mut() {
                    if envelope.ack_required
                        && !envelope.unacked_alerted
                        && !envelope.fully_acked()
                        && now.saturating_sub(envelope.created_at_ms) >= ttl_ms
                    {
                        envelope.unacked_alerted = true;
                        dirty = true;
                        fired.push((envelope.id.clone(), envelope.subject.clone()));
                    }
                }
                if dirty {
                    let _ = rewrite_jsonl(&self.state_dir.mail_path(project_key), envelopes);
                }
            }
        }
        for (id, subject) in &fired {
            self.bus.publish(
                None,
                None,
                EventKind::AlertFired {
                    category: "mail_unacked".to_owned(),
                    detail: format!("mail {id} ({subject}) not acknowledged in time"),
                },
            );
        }
        fired.len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                store.sweep_unacked().await;
            }
        });
    }
}

#[cfg(test)]
#[path = "mail_tests.rs"]
mod tests;
