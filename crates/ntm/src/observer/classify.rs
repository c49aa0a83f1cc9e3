// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table-driven scrollback classifier.
//!
//! Each rule is a named predicate over one [`Observation`]; rules are
//! evaluated in table order and the first match wins. The two-consecutive-
//! agreement requirement lives in the monitor loop, not here.

use std::time::Duration;

use crate::provider::{extract_retry_after, ProviderProfile};

use super::PaneState;

/// Marker checks are confined to this many trailing lines so sentinels from
/// earlier turns don't bleed into the current classification.
const MARKER_WINDOW: usize = 8;

/// Fewer new lines than this per observation counts as "changing slowly".
const SLOW_CHANGE_LINES: usize = 3;

/// One observation of a pane, assembled by the monitor from two consecutive
/// snapshots.
pub struct Observation<'a> {
    pub tail: &'a [String],
    pub tail_hash: u64,
    pub prev_hash: u64,
    /// Time since the scrollback hash last changed.
    pub elapsed_since_change: Duration,
    /// Non-blank lines that differ from the previous snapshot.
    pub new_lines: usize,
    /// The state the pane currently holds (stall detection needs it).
    pub current: &'a PaneState,
    pub stall_threshold: Duration,
    pub typing_window: Duration,
    pub profile: &'a ProviderProfile,
}

impl Observation<'_> {
    fn marker_window(&self) -> &[String] {
        let skip = self.tail.len().saturating_sub(MARKER_WINDOW);
        &self.tail[skip..]
    }

    fn hash_stable(&self) -> bool {
        self.tail_hash == self.prev_hash
    }
}

/// A classified state plus the rule that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub state: PaneState,
    pub reason: &'static str,
}

type Rule = (&'static str, fn(&Observation) -> Option<PaneState>);

/// The classification table. Order is priority: the first matching rule wins.
pub const RULES: &[Rule] = &[
    ("rate_limit_phrase", rule_rate_limited),
    ("error_sentinel", rule_error),
    ("stall_threshold", rule_stalled),
    ("tool_sentinel", rule_tool_running),
    ("response_marker_advancing", rule_generating),
    ("thinking_marker_slow", rule_thinking),
    ("prompt_text_or_recent_change", rule_user_typing),
    ("bare_prompt_stable", rule_waiting),
];

/// Classify one observation, or `None` when no rule matches.
pub fn classify(obs: &Observation) -> Option<Classification> {
    for (reason, rule) in RULES {
        if let Some(state) = rule(obs) {
            return Some(Classification { state, reason });
        }
    }
    None
}

fn rule_rate_limited(obs: &Observation) -> Option<PaneState> {
    let line = obs.profile.rate_limit_line(obs.marker_window())?;
    let retry_after_ms = extract_retry_after(line).map(|d| d.as_millis() as u64);
    Some(PaneState::RateLimited { retry_after_ms })
}

fn rule_error(obs: &Observation) -> Option<PaneState> {
    let line = obs.profile.error_line(obs.marker_window())?;
    Some(PaneState::Error { detail: line.trim().to_owned() })
}

fn rule_stalled(obs: &Observation) -> Option<PaneState> {
    if obs.current.is_active() && obs.elapsed_since_change >= obs.stall_threshold {
        return Some(PaneState::Stalled);
    }
    None
}

fn rule_tool_running(obs: &Observation) -> Option<PaneState> {
    let window = obs.marker_window();
    if obs.profile.has_tool_marker(window) && !obs.profile.has_response_marker(window) {
        return Some(PaneState::ToolRunning);
    }
    None
}

fn rule_generating(obs: &Observation) -> Option<PaneState> {
    if obs.profile.has_response_marker(obs.marker_window()) && obs.new_lines > 0 {
        return Some(PaneState::Generating);
    }
    None
}

fn rule_thinking(obs: &Observation) -> Option<PaneState> {
    if obs.profile.has_thinking_marker(obs.marker_window())
        && obs.new_lines < SLOW_CHANGE_LINES
    {
        return Some(PaneState::Thinking);
    }
    None
}

fn rule_user_typing(obs: &Observation) -> Option<PaneState> {
    if let Some(prompt) = obs.profile.prompt_line(obs.tail) {
        if !prompt.after.is_empty() {
            return Some(PaneState::UserTyping);
        }
    }
    if !obs.hash_stable()
        && obs.elapsed_since_change <= obs.typing_window
        && !obs.profile.has_response_marker(obs.marker_window())
        && obs.profile.prompt_line(obs.tail).is_some()
    {
        return Some(PaneState::UserTyping);
    }
    None
}

fn rule_waiting(obs: &Observation) -> Option<PaneState> {
    if !obs.hash_stable() {
        return None;
    }
    let prompt = obs.profile.prompt_line(obs.tail)?;
    if prompt.after.is_empty() {
        return Some(PaneState::Waiting);
    }
    None
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
