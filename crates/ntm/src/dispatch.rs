// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Robot dispatcher: at-most-once message delivery to panes.
//!
//! Every delivery flows through a per-pane write lock, gated on the
//! input-safety predicate with exponential backoff. A pane whose gate never
//! opens gets a single queued slot, re-armed by the next `pane.state →
//! waiting` event; further sends return `busy`. Cancellation is
//! cooperative: an in-flight keystroke write always completes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::bus::{Bus, Filter};
use crate::error::{ApiError, ErrorCode};
use crate::event::{now_epoch_ms, EventKind};
use crate::mux::{Multiplexer, MuxError};
use crate::observer::{PaneState, RuntimeTable};
use crate::persist::append_jsonl;
use crate::redact::Redactor;
use crate::registry::{Pane, Registry, Targets};

/// Backoff bounds for the injection gate.
const BACKOFF_START: Duration = Duration::from_millis(50);
const BACKOFF_CAP: Duration = Duration::from_secs(1);
/// How long a queued send waits for the pane to become safe before failing.
const QUEUE_WAIT_CAP: Duration = Duration::from_secs(300);

/// Dispatcher tunables.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub inject_deadline: Duration,
    pub quiet_window: Duration,
    pub default_ack_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            inject_deadline: Duration::from_secs(10),
            quiet_window: Duration::from_millis(600),
            default_ack_timeout: Duration::from_secs(30),
        }
    }
}

/// Options on a send call.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub track: bool,
    pub ack_token: Option<String>,
    pub ack_timeout: Option<Duration>,
    pub inject_deadline: Option<Duration>,
    /// Skip redaction for this payload (`--allow-secret`).
    pub allow_secret: bool,
}

/// Terminal (or queued) status of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Queued,
    Acked,
    Timeout,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Queued => "queued",
            Self::Acked => "acked",
            Self::Timeout => "timeout",
            Self::Failed => "failed",
        }
    }
}

/// Per-target outcome of a send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub pane_id: String,
    pub index: usize,
    pub agent_name: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

/// Result of a send call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub message_id: String,
    pub ack_token: String,
    pub results: Vec<TargetOutcome>,
}

impl SendResult {
    /// Pane ids that reached `delivered`.
    pub fn delivered(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.status == DeliveryStatus::Delivered)
            .map(|r| r.pane_id.clone())
            .collect()
    }
}

/// Per-pane ack outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckOutcome {
    pub pane_id: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// History record. Persisted only once the message reaches a terminal
/// status (`delivered`, `acked`, `timeout`, or `failed`) — a send with a
/// queued target stays in memory until its deferred delivery resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub session: String,
    pub target_pane_ids: Vec<String>,
    pub body: String,
    pub track: bool,
    pub ack_token: String,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acked_at_ms: Option<u64>,
    pub status: DeliveryStatus,
}

/// A message with at least one queued target, waiting for its deferred
/// deliveries to finish. The last retry to resolve persists the terminal
/// record.
struct PendingMessage {
    record: parking_lot::Mutex<MessageRecord>,
    remaining: std::sync::atomic::AtomicUsize,
    history_path: Option<PathBuf>,
}

impl PendingMessage {
    /// Record one queued target's outcome. When this was the last
    /// outstanding target, stamp the terminal status and append to history.
    fn resolve(&self, delivered_at_ms: Option<u64>) {
        use std::sync::atomic::Ordering;

        let last = self.remaining.fetch_sub(1, Ordering::AcqRel) == 1;
        let mut record = self.record.lock();
        if let Some(at) = delivered_at_ms {
            record.delivered_at_ms =
                Some(record.delivered_at_ms.map_or(at, |prev| prev.max(at)));
        }
        if last {
            record.status = if record.delivered_at_ms.is_some() {
                DeliveryStatus::Delivered
            } else {
                DeliveryStatus::Failed
            };
            if let Some(ref path) = self.history_path {
                append_jsonl(path, &*record);
            }
        }
    }
}

struct PaneLane {
    /// Serialises keystroke injection for one pane.
    write_lock: Mutex<()>,
    /// Message id of the active (in-flight or queued) send, if any.
    active: parking_lot::Mutex<Option<String>>,
}

impl PaneLane {
    fn new() -> Arc<Self> {
        Arc::new(Self { write_lock: Mutex::new(()), active: parking_lot::Mutex::new(None) })
    }
}

/// The dispatcher.
pub struct Dispatcher {
    mux: Arc<dyn Multiplexer>,
    registry: Arc<Registry>,
    runtimes: Arc<RuntimeTable>,
    bus: Arc<Bus>,
    redactor: Arc<RwLock<Arc<Redactor>>>,
    settings: DispatchSettings,
    lanes: parking_lot::Mutex<HashMap<String, Arc<PaneLane>>>,
    history_path: Option<PathBuf>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        registry: Arc<Registry>,
        runtimes: Arc<RuntimeTable>,
        bus: Arc<Bus>,
        redactor: Arc<RwLock<Arc<Redactor>>>,
        settings: DispatchSettings,
        history_path: Option<PathBuf>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            mux,
            registry,
            runtimes,
            bus,
            redactor,
            settings,
            lanes: parking_lot::Mutex::new(HashMap::new()),
            history_path,
            shutdown,
        })
    }

    fn lane(&self, pane_id: &str) -> Arc<PaneLane> {
        let mut lanes = self.lanes.lock();
        Arc::clone(lanes.entry(pane_id.to_owned()).or_insert_with(PaneLane::new))
    }

    /// Message id of the queued/in-flight send for a pane, if any.
    pub fn active_message(&self, pane_id: &str) -> Option<String> {
        self.lanes.lock().get(pane_id).and_then(|lane| lane.active.lock().clone())
    }

    /// Stable ack token derived from a message id.
    pub fn derived_ack_token(message_id: &str) -> String {
        let digest = Sha256::digest(message_id.as_bytes());
        let hash: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
        format!("ack-{hash}")
    }

    /// Deliver `body` to every resolved target with at-most-once semantics.
    pub async fn send(
        &self,
        session: &str,
        targets: &Targets,
        body: &str,
        opts: &SendOptions,
        cancel: CancellationToken,
    ) -> Result<SendResult, ApiError> {
        let panes = self.registry.resolve_targets(session, targets).await?;
        if panes.is_empty() {
            return Err(ApiError::new(ErrorCode::PaneNotFound, "no target panes resolved"));
        }

        let body = if opts.allow_secret {
            body.to_owned()
        } else {
            let scan = {
                let redactor = self.redactor.read().await;
                redactor.scan("send.prompt", body)
            };
            if scan.blocked {
                return Err(ApiError::new(
                    ErrorCode::RedactionBlocked,
                    "prompt contains detected secrets (see details; --allow-secret to override)",
                )
                .with_details(serde_json::json!({ "findings": scan.findings })));
            }
            scan.text
        };

        let message_id = Uuid::new_v4().to_string();
        let ack_token = opts
            .ack_token
            .clone()
            .unwrap_or_else(|| Self::derived_ack_token(&message_id));
        let deadline = opts.inject_deadline.unwrap_or(self.settings.inject_deadline);
        let created_at_ms = now_epoch_ms();

        let mut results = Vec::with_capacity(panes.len());
        for pane in &panes {
            let outcome = self
                .deliver_to_pane(pane, &body, &message_id, deadline, cancel.clone())
                .await;
            results.push(outcome);
        }

        let delivered_at_ms =
            results.iter().filter_map(|r| r.delivered_at_ms).max();
        let any_delivered = results.iter().any(|r| r.status == DeliveryStatus::Delivered);
        let queued_panes: Vec<Pane> = panes
            .iter()
            .zip(&results)
            .filter(|(_, r)| r.status == DeliveryStatus::Queued)
            .map(|(p, _)| p.clone())
            .collect();

        let mut record = MessageRecord {
            id: message_id.clone(),
            session: session.to_owned(),
            target_pane_ids: panes.iter().map(|p| p.id.clone()).collect(),
            body: body.clone(),
            track: opts.track,
            ack_token: ack_token.clone(),
            created_at_ms,
            delivered_at_ms,
            acked_at_ms: None,
            status: DeliveryStatus::Pending,
        };
        if queued_panes.is_empty() {
            // Every target resolved inline: persist the terminal record now.
            record.status =
                if any_delivered { DeliveryStatus::Delivered } else { DeliveryStatus::Failed };
            self.persist_record(&record);
        } else {
            // Deferred targets keep the record pending in memory; the last
            // retry to resolve writes the terminal record.
            let pending = Arc::new(PendingMessage {
                record: parking_lot::Mutex::new(record),
                remaining: std::sync::atomic::AtomicUsize::new(queued_panes.len()),
                history_path: self.history_path.clone(),
            });
            for pane in queued_panes {
                let lane = self.lane(&pane.id);
                self.spawn_queued_retry(lane, pane, body.clone(), Arc::clone(&pending));
            }
        }
        if any_delivered {
            self.bus.publish(
                Some(session),
                None,
                EventKind::MessageDelivered { message_id: message_id.clone() },
            );
        }

        Ok(SendResult { message_id, ack_token, results })
    }

    async fn deliver_to_pane(
        &self,
        pane: &Pane,
        body: &str,
        message_id: &str,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> TargetOutcome {
        let lane = self.lane(&pane.id);
        {
            let mut active = lane.active.lock();
            if active.is_some() {
                return outcome(pane, DeliveryStatus::Failed, None, Some(ErrorCode::Busy));
            }
            *active = Some(message_id.to_owned());
        }

        let result = self.try_deliver(&lane, pane, body, deadline, &cancel).await;
        match result {
            Ok(at) => {
                *lane.active.lock() = None;
                outcome(pane, DeliveryStatus::Delivered, Some(at), None)
            }
            Err(ErrorCode::UnsafeDeadline) => {
                // Keep the slot; the caller arms a queued retry that also
                // owns the pending history record.
                outcome(pane, DeliveryStatus::Queued, None, None)
            }
            Err(code) => {
                *lane.active.lock() = None;
                outcome(pane, DeliveryStatus::Failed, None, Some(code))
            }
        }
    }

    /// Poll the safety gate with exponential backoff, then write under the
    /// pane write lock.
    async fn try_deliver(
        &self,
        lane: &PaneLane,
        pane: &Pane,
        body: &str,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<u64, ErrorCode> {
        let started = tokio::time::Instant::now();
        let mut backoff = BACKOFF_START;
        loop {
            if cancel.is_cancelled() || self.shutdown.is_cancelled() {
                return Err(ErrorCode::Cancelled);
            }
            if self.safe_now(&pane.id).await {
                let _guard = lane.write_lock.lock().await;
                // Re-verify under the lock: the state may have moved while
                // we waited.
                if self.safe_now(&pane.id).await {
                    return match self.mux.send_keys(&pane.id, body, true).await {
                        Ok(()) => Ok(now_epoch_ms()),
                        Err(MuxError::PaneGone(_)) => Err(ErrorCode::PaneNotFound),
                        Err(MuxError::SessionGone(_)) => Err(ErrorCode::SessionNotFound),
                        Err(MuxError::Unavailable(_)) => Err(ErrorCode::MultiplexerUnavailable),
                    };
                }
            }
            if started.elapsed() >= deadline {
                return Err(ErrorCode::UnsafeDeadline);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(ErrorCode::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(BACKOFF_CAP);
        }
    }

    async fn safe_now(&self, pane_id: &str) -> bool {
        match self.runtimes.get(pane_id).await {
            Some(runtime) => runtime.read().await.is_safe_to_inject(self.settings.quiet_window),
            None => false,
        }
    }

    /// A deferred delivery: hold the lane slot until the pane turns safe
    /// (signalled by `pane.state → waiting` or found by the fallback poll),
    /// then deliver once and resolve the pending history record.
    fn spawn_queued_retry(
        &self,
        lane: Arc<PaneLane>,
        pane: Pane,
        body: String,
        pending: Arc<PendingMessage>,
    ) {
        let mux = Arc::clone(&self.mux);
        let runtimes = Arc::clone(&self.runtimes);
        let bus = Arc::clone(&self.bus);
        let quiet_window = self.settings.quiet_window;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut subscription = bus.subscribe(Filter::for_topics(["pane.state"]));
            let deadline = tokio::time::Instant::now() + QUEUE_WAIT_CAP;
            let mut delivered_at: Option<u64> = None;
            while tokio::time::Instant::now() < deadline && !shutdown.is_cancelled() {
                let safe = match runtimes.get(&pane.id).await {
                    Some(runtime) => runtime.read().await.is_safe_to_inject(quiet_window),
                    None => break,
                };
                if safe {
                    let _guard = lane.write_lock.lock().await;
                    if mux.send_keys(&pane.id, &body, true).await.is_ok() {
                        delivered_at = Some(now_epoch_ms());
                    }
                    break;
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                    event = subscription.recv() => {
                        // Any waiting transition for this pane re-checks the
                        // gate immediately; other events keep waiting.
                        let Some(event) = event else { break };
                        let relevant = event.pane.as_deref() == Some(pane.id.as_str())
                            && matches!(
                                event.kind,
                                EventKind::PaneState { next: PaneState::Waiting, .. }
                            );
                        if !relevant {
                            continue;
                        }
                    }
                }
            }
            if delivered_at.is_some() {
                if let Some(message_id) = lane.active.lock().clone() {
                    bus.publish(
                        Some(&pane.session_name),
                        Some(&pane.id),
                        EventKind::MessageDelivered { message_id },
                    );
                }
            } else {
                debug!(pane = %pane.id, "queued send expired without a safe window");
            }
            pending.resolve(delivered_at);
            *lane.active.lock() = None;
        });
    }

    /// Wait for `token` to appear in the tail of each target pane.
    ///
    /// `timeout` of zero returns immediately: `received` only when the token
    /// is already visible.
    pub async fn ack(
        &self,
        session: &str,
        targets: &Targets,
        token: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Vec<AckOutcome>, ApiError> {
        let panes = self.registry.resolve_targets(session, targets).await?;
        let deadline = tokio::time::Instant::now() + timeout;
        let mut outcomes = Vec::with_capacity(panes.len());
        for pane in &panes {
            outcomes.push(self.ack_one(pane, token, deadline, &cancel).await);
        }
        Ok(outcomes)
    }

    async fn ack_one(
        &self,
        pane: &Pane,
        token: &str,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
    ) -> AckOutcome {
        loop {
            if let Some(runtime) = self.runtimes.get(&pane.id).await {
                let tail = runtime.read().await.last_tail.clone();
                if let Some(line) = tail.iter().rev().find(|l| l.contains(token)) {
                    return AckOutcome {
                        pane_id: pane.id.clone(),
                        status: DeliveryStatus::Acked,
                        received_at_ms: Some(now_epoch_ms()),
                        text: Some(line.clone()),
                    };
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return AckOutcome {
                    pane_id: pane.id.clone(),
                    status: DeliveryStatus::Timeout,
                    received_at_ms: None,
                    text: None,
                };
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    return AckOutcome {
                        pane_id: pane.id.clone(),
                        status: DeliveryStatus::Timeout,
                        received_at_ms: None,
                        text: None,
                    };
                }
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
        }
    }

    /// `send` then `ack` with the same token.
    pub async fn track(
        &self,
        session: &str,
        targets: &Targets,
        body: &str,
        opts: &SendOptions,
        cancel: CancellationToken,
    ) -> Result<(SendResult, Vec<AckOutcome>), ApiError> {
        let send_result = self.send(session, targets, body, opts, cancel.clone()).await?;
        let timeout = opts.ack_timeout.unwrap_or(self.settings.default_ack_timeout);
        let acks = self
            .ack(session, targets, &send_result.ack_token, timeout, cancel)
            .await?;
        if acks.iter().any(|a| a.status == DeliveryStatus::Acked) {
            self.bus.publish(
                Some(session),
                None,
                EventKind::MessageAcked { message_id: send_result.message_id.clone() },
            );
        }
        Ok((send_result, acks))
    }

    /// Interrupt delivery: bypasses the safety gate (interrupts are
    /// corrective) but still serialises with in-flight writes.
    pub async fn interrupt(&self, pane: &Pane) -> Result<(), ApiError> {
        let lane = self.lane(&pane.id);
        let _guard = lane.write_lock.lock().await;
        self.mux.send_interrupt(&pane.id).await.map_err(|e| match e {
            MuxError::PaneGone(_) => ApiError::new(ErrorCode::PaneNotFound, e.to_string()),
            MuxError::SessionGone(_) => ApiError::new(ErrorCode::SessionNotFound, e.to_string()),
            MuxError::Unavailable(_) => {
                ApiError::new(ErrorCode::MultiplexerUnavailable, e.to_string())
            }
        })
    }

    fn persist_record(&self, record: &MessageRecord) {
        if let Some(ref path) = self.history_path {
            append_jsonl(path, record);
        }
    }
}

fn outcome(
    pane: &Pane,
    status: DeliveryStatus,
    delivered_at_ms: Option<u64>,
    error: Option<ErrorCode>,
) -> TargetOutcome {
    TargetOutcome {
        pane_id: pane.id.clone(),
        index: pane.index,
        agent_name: pane.agent_name.clone(),
        status,
        delivered_at_ms,
        error,
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
