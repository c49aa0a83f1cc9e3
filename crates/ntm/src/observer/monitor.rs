// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-pane monitor loop: poll → classify → publish.
//!
//! One monitor task runs per registered pane, driving the state machine at
//! an adaptive cadence. Transitions require two consecutive agreeing
//! classifications, except `crashed` (supervisor-driven) and `rate_limited`
//! (one-shot).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bus::Bus;
use crate::event::{now_epoch_ms, EventKind};
use crate::mux::{Multiplexer, MuxError};
use crate::provider::ProviderProfile;
use crate::registry::Pane;

use super::classify::{classify, Observation};
use super::context::ContextTracker;
use super::{tail_hash, ObserverSettings, PaneRuntime, PaneState, RuntimeTable};

/// Consecutive read failures before a debug log entry.
const FAILURES_LOG: u32 = 2;
/// Consecutive read failures before `pane.read_failed` is published.
const FAILURES_EVENT: u32 = 5;

/// Why a monitor loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The pane disappeared from the multiplexer.
    PaneGone,
    /// Shutdown or unregister.
    Cancelled,
}

/// Dependencies shared by every monitor.
pub struct MonitorDeps {
    pub mux: Arc<dyn Multiplexer>,
    pub bus: Arc<Bus>,
    pub runtimes: Arc<RuntimeTable>,
    pub settings: ObserverSettings,
}

/// Run the monitor loop for one pane until cancellation or pane death.
pub async fn run_monitor(
    pane: Pane,
    profile: Arc<ProviderProfile>,
    deps: Arc<MonitorDeps>,
    cancel: CancellationToken,
) -> MonitorExit {
    let runtime = match deps.runtimes.get(&pane.id).await {
        Some(runtime) => runtime,
        None => deps.runtimes.register(&pane.id, profile.context_limit).await,
    };
    let mut tracker = ContextTracker::new(profile.context_limit);
    let mut failures: u32 = 0;
    let mut pending: Option<PaneState> = None;
    let mut last_classified = Instant::now();

    loop {
        let interval = {
            let rt = runtime.read().await;
            poll_interval(&rt.state, &deps.settings)
        };
        tokio::select! {
            _ = cancel.cancelled() => return MonitorExit::Cancelled,
            _ = tokio::time::sleep(interval) => {}
        }

        let captured = match deps.mux.capture_tail(&pane.id, deps.settings.tail_lines).await {
            Ok(captured) => captured,
            Err(MuxError::PaneGone(_)) | Err(MuxError::SessionGone(_)) => {
                apply_transition(
                    &deps,
                    &pane,
                    &runtime,
                    PaneState::Crashed,
                    "pane_closed",
                )
                .await;
                return MonitorExit::PaneGone;
            }
            Err(e) => {
                failures += 1;
                if failures == FAILURES_LOG {
                    debug!(pane = %pane.id, error = %e, "scrollback read failing");
                }
                if failures == FAILURES_EVENT {
                    deps.bus.publish(
                        Some(&pane.session_name),
                        Some(&pane.id),
                        EventKind::PaneReadFailed { consecutive: failures },
                    );
                }
                continue;
            }
        };
        failures = 0;

        // Update hashes, activity, and the safety-predicate inputs.
        let hash = tail_hash(&captured.lines);
        let (prev_hash, elapsed_since_change, new_lines, new_chars, current_state) = {
            let mut rt = runtime.write().await;
            let prev_hash = rt.last_scroll_hash;
            let changed = hash != prev_hash;
            if changed || rt.last_change.is_none() {
                if changed {
                    rt.last_activity_ms = now_epoch_ms();
                }
                rt.last_change = Some(Instant::now());
            }
            let new_lines = diff_new_lines(&rt.last_tail, &captured.lines);
            let new_chars: u64 = if changed {
                captured
                    .lines
                    .iter()
                    .skip(captured.lines.len().saturating_sub(new_lines.max(1)))
                    .map(|l| l.len() as u64)
                    .sum()
            } else {
                0
            };
            let elapsed = rt
                .last_change
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO);
            rt.prompt_empty = profile
                .prompt_line(&captured.lines)
                .map(|p| p.after.is_empty())
                .unwrap_or(false);
            if changed {
                let publish_lines = tail_suffix(&captured.lines, new_lines);
                if !publish_lines.is_empty() {
                    deps.bus.publish(
                        Some(&pane.session_name),
                        Some(&pane.id),
                        EventKind::PaneOutput { lines: publish_lines },
                    );
                }
            }
            rt.last_tail = captured.lines.clone();
            rt.last_scroll_hash = hash;
            rt.captured_at = Some(captured.captured_at);
            (prev_hash, elapsed, new_lines, new_chars, rt.state.clone())
        };

        // Context tracking.
        for crossing in tracker.observe(&profile, &captured.lines, new_chars) {
            deps.bus.publish(
                Some(&pane.session_name),
                Some(&pane.id),
                EventKind::PaneContext {
                    used: crossing.used,
                    limit: crossing.limit,
                    threshold: crossing.threshold,
                },
            );
        }
        {
            let mut rt = runtime.write().await;
            rt.context_used = tracker.used();
            rt.context_limit = tracker.limit();
            rt.tokens_per_min = tracker.tokens_per_min();
        }

        // Classification with two-snapshot agreement.
        let observation = Observation {
            tail: &captured.lines,
            tail_hash: hash,
            prev_hash,
            elapsed_since_change,
            new_lines,
            current: &current_state,
            stall_threshold: deps.settings.stall_threshold,
            typing_window: deps.settings.typing_window,
            profile: profile.as_ref(),
        };
        match classify(&observation) {
            Some(classification) => {
                last_classified = Instant::now();
                let next = classification.state;
                if next == current_state {
                    pending = None;
                    continue;
                }
                let one_shot = matches!(next, PaneState::RateLimited { .. });
                if one_shot || pending.as_ref() == Some(&next) {
                    pending = None;
                    apply_transition(&deps, &pane, &runtime, next, classification.reason).await;
                } else {
                    pending = Some(next);
                }
            }
            None => {
                pending = None;
                // Unclassifiable tails degrade to waiting only after the
                // unknown hold elapses.
                if current_state == PaneState::Unknown
                    && last_classified.elapsed() >= deps.settings.unknown_hold
                {
                    apply_transition(&deps, &pane, &runtime, PaneState::Waiting, "unknown_hold")
                        .await;
                }
            }
        }
    }
}

/// Apply a state transition and publish `pane.state`.
pub async fn apply_transition(
    deps: &MonitorDeps,
    pane: &Pane,
    runtime: &Arc<tokio::sync::RwLock<PaneRuntime>>,
    next: PaneState,
    reason: &str,
) {
    let prev = {
        let mut rt = runtime.write().await;
        let prev = rt.state.clone();
        if prev == next {
            return;
        }
        rt.state = next.clone();
        rt.last_transition_ms = now_epoch_ms();
        prev
    };
    deps.bus.publish(
        Some(&pane.session_name),
        Some(&pane.id),
        EventKind::PaneState { prev, next, reason: reason.to_owned() },
    );
}

fn poll_interval(state: &PaneState, settings: &ObserverSettings) -> Duration {
    match state {
        PaneState::Generating
        | PaneState::Thinking
        | PaneState::ToolRunning
        | PaneState::UserTyping => settings.poll_active,
        PaneState::Stalled => settings.poll_stalled,
        _ => settings.poll_idle,
    }
}

/// Count trailing lines of `next` that differ from `prev` at the same
/// position, plus any net growth.
fn diff_new_lines(prev: &[String], next: &[String]) -> usize {
    let changed = next
        .iter()
        .zip(prev.iter())
        .filter(|(a, b)| a != b)
        .filter(|(a, _)| !a.trim().is_empty())
        .count();
    let grown = next
        .iter()
        .skip(prev.len())
        .filter(|l| !l.trim().is_empty())
        .count();
    changed + grown
}

/// The last `count` non-empty lines (capped) for `pane.output` events.
fn tail_suffix(lines: &[String], count: usize) -> Vec<String> {
    let count = count.clamp(0, 20);
    let skip = lines.len().saturating_sub(count);
    lines[skip..].iter().filter(|l| !l.trim().is_empty()).cloned().collect()
}
