// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-pane state machine: classifies terminal scrollback into a bounded
//! state set, tracks context-window usage, and exposes the input-safety
//! predicate used by the dispatcher.

pub mod classify;
pub mod context;
pub mod monitor;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::event::now_epoch_ms;

pub use classify::{classify, Classification, Observation};
pub use context::{ContextTracker, ThresholdCrossing};

/// Classified behaviour of a pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaneState {
    Waiting,
    UserTyping,
    Generating,
    Thinking,
    ToolRunning,
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
    Stalled,
    Error {
        detail: String,
    },
    Crashed,
    Unknown,
}

impl PaneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::UserTyping => "user_typing",
            Self::Generating => "generating",
            Self::Thinking => "thinking",
            Self::ToolRunning => "tool_running",
            Self::RateLimited { .. } => "rate_limited",
            Self::Stalled => "stalled",
            Self::Error { .. } => "error",
            Self::Crashed => "crashed",
            Self::Unknown => "unknown",
        }
    }

    /// States in which the agent is actively producing output; a frozen
    /// scrollback in one of these becomes `stalled`.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Generating | Self::Thinking | Self::ToolRunning)
    }
}

impl std::fmt::Display for PaneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for the observer loop.
#[derive(Debug, Clone)]
pub struct ObserverSettings {
    pub tail_lines: usize,
    pub poll_active: Duration,
    pub poll_idle: Duration,
    pub poll_stalled: Duration,
    pub stall_threshold: Duration,
    pub typing_window: Duration,
    pub unknown_hold: Duration,
    /// No injection within this window after any scrollback change.
    pub quiet_window: Duration,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            tail_lines: 200,
            poll_active: Duration::from_millis(250),
            poll_idle: Duration::from_secs(2),
            poll_stalled: Duration::from_secs(30),
            stall_threshold: Duration::from_secs(60),
            typing_window: Duration::from_millis(1500),
            unknown_hold: Duration::from_secs(10),
            quiet_window: Duration::from_millis(600),
        }
    }
}

/// Mutable per-pane runtime state owned by the state machine.
#[derive(Debug, Clone)]
pub struct PaneRuntime {
    pub pane_id: String,
    pub state: PaneState,
    pub last_transition_ms: u64,
    pub last_scroll_hash: u64,
    pub context_used: u64,
    pub context_limit: u64,
    pub tokens_per_min: u64,
    pub last_activity_ms: u64,
    /// Most recent ANSI-stripped tail (serves output reads and ack scans).
    pub last_tail: Vec<String>,
    /// Instant of the last observed scrollback change.
    pub last_change: Option<Instant>,
    /// True when the last prompt line had no text after the marker.
    pub prompt_empty: bool,
    pub captured_at: Option<Instant>,
}

impl PaneRuntime {
    pub fn new(pane_id: impl Into<String>, context_limit: u64) -> Self {
        Self {
            pane_id: pane_id.into(),
            state: PaneState::Unknown,
            last_transition_ms: now_epoch_ms(),
            last_scroll_hash: 0,
            context_used: 0,
            context_limit,
            tokens_per_min: 0,
            last_activity_ms: now_epoch_ms(),
            last_tail: Vec::new(),
            last_change: None,
            prompt_empty: false,
            captured_at: None,
        }
    }

    /// The input-safety predicate: true only when the pane is waiting, the
    /// prompt line is bare, and no scrollback change occurred within
    /// `quiet_window`.
    pub fn is_safe_to_inject(&self, quiet_window: Duration) -> bool {
        if self.state != PaneState::Waiting || !self.prompt_empty {
            return false;
        }
        match self.last_change {
            Some(changed) => changed.elapsed() >= quiet_window,
            None => false,
        }
    }

    /// Wire-format snapshot for the robot surface.
    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            pane_id: self.pane_id.clone(),
            state: self.state.clone(),
            last_transition_ms: self.last_transition_ms,
            context_used: self.context_used,
            context_limit: self.context_limit,
            tokens_per_min: self.tokens_per_min,
            last_activity_ms: self.last_activity_ms,
        }
    }
}

/// Serializable projection of [`PaneRuntime`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    pub pane_id: String,
    #[serde(flatten)]
    pub state: PaneState,
    pub last_transition_ms: u64,
    pub context_used: u64,
    pub context_limit: u64,
    pub tokens_per_min: u64,
    pub last_activity_ms: u64,
}

/// Shared table of live pane runtimes.
#[derive(Default)]
pub struct RuntimeTable {
    map: RwLock<HashMap<String, Arc<RwLock<PaneRuntime>>>>,
}

impl RuntimeTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, pane_id: &str, context_limit: u64) -> Arc<RwLock<PaneRuntime>> {
        let runtime = Arc::new(RwLock::new(PaneRuntime::new(pane_id, context_limit)));
        self.map.write().await.insert(pane_id.to_owned(), Arc::clone(&runtime));
        runtime
    }

    pub async fn remove(&self, pane_id: &str) {
        self.map.write().await.remove(pane_id);
    }

    pub async fn get(&self, pane_id: &str) -> Option<Arc<RwLock<PaneRuntime>>> {
        self.map.read().await.get(pane_id).cloned()
    }

    pub async fn snapshot_all(&self) -> Vec<RuntimeSnapshot> {
        let map = self.map.read().await;
        let mut snapshots = Vec::with_capacity(map.len());
        for runtime in map.values() {
            snapshots.push(runtime.read().await.snapshot());
        }
        snapshots.sort_by(|a, b| a.pane_id.cmp(&b.pane_id));
        snapshots
    }
}

/// Hash a scrollback tail for change detection.
pub fn tail_hash(lines: &[String]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for line in lines {
        line.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
