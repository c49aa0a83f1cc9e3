// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`Multiplexer`] with scriptable pane scrollback, used by unit
//! and end-to-end tests in place of a real tmux server.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CapturedTail, MuxError, MuxPane, Multiplexer};

#[derive(Debug, Clone)]
struct FakePane {
    session: String,
    index: usize,
    title: String,
    tail: Vec<String>,
    sent: Vec<String>,
    interrupts: u32,
    alive: bool,
}

#[derive(Default)]
struct FakeState {
    sessions: HashMap<String, Vec<String>>,
    panes: HashMap<String, FakePane>,
    next_pane: u64,
    /// Spawn indices (per spawn_pane call order) that should fail.
    fail_spawns: Vec<u64>,
    spawn_calls: u64,
    /// Remaining capture calls that should fail per pane.
    capture_failures: HashMap<String, u32>,
    /// When set, submitted keystrokes are echoed into the pane tail.
    echo_input: bool,
}

/// Scriptable in-memory multiplexer.
#[derive(Default)]
pub struct FakeMux {
    state: Mutex<FakeState>,
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo submitted input into the pane tail (simulates the terminal
    /// echoing the typed prompt).
    pub fn with_echo_input(self) -> Self {
        self.state.lock().echo_input = true;
        self
    }

    /// Replace a pane's scrollback tail.
    pub fn set_tail(&self, pane_id: &str, lines: &[&str]) {
        let mut state = self.state.lock();
        if let Some(pane) = state.panes.get_mut(pane_id) {
            pane.tail = lines.iter().map(|s| s.to_string()).collect();
        }
    }

    /// Append one line to a pane's scrollback tail.
    pub fn push_line(&self, pane_id: &str, line: &str) {
        let mut state = self.state.lock();
        if let Some(pane) = state.panes.get_mut(pane_id) {
            pane.tail.push(line.to_owned());
        }
    }

    /// Everything sent to the pane via `send_keys` in call order.
    pub fn sent_keys(&self, pane_id: &str) -> Vec<String> {
        self.state
            .lock()
            .panes
            .get(pane_id)
            .map(|p| p.sent.clone())
            .unwrap_or_default()
    }

    pub fn interrupt_count(&self, pane_id: &str) -> u32 {
        self.state.lock().panes.get(pane_id).map(|p| p.interrupts).unwrap_or(0)
    }

    /// Mark a pane dead: captures and writes start failing with PaneGone.
    pub fn close_pane(&self, pane_id: &str) {
        let mut state = self.state.lock();
        if let Some(pane) = state.panes.get_mut(pane_id) {
            pane.alive = false;
        }
    }

    /// Make the Nth spawn_pane call (0-based, across all sessions) fail.
    pub fn fail_spawn_at(&self, call_index: u64) {
        self.state.lock().fail_spawns.push(call_index);
    }

    /// Make the next `count` captures of `pane_id` fail transiently.
    pub fn fail_captures(&self, pane_id: &str, count: u32) {
        self.state.lock().capture_failures.insert(pane_id.to_owned(), count);
    }

    fn check_pane(state: &FakeState, pane_id: &str) -> Result<(), MuxError> {
        match state.panes.get(pane_id) {
            Some(pane) if pane.alive => Ok(()),
            _ => Err(MuxError::PaneGone(pane_id.to_owned())),
        }
    }
}

#[async_trait]
impl Multiplexer for FakeMux {
    async fn create_session(&self, name: &str, _cwd: &Path) -> Result<(), MuxError> {
        self.state.lock().sessions.entry(name.to_owned()).or_default();
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        let mut state = self.state.lock();
        let Some(pane_ids) = state.sessions.remove(name) else {
            return Err(MuxError::SessionGone(name.to_owned()));
        };
        for pane_id in pane_ids {
            state.panes.remove(&pane_id);
        }
        Ok(())
    }

    async fn has_session(&self, name: &str) -> Result<bool, MuxError> {
        Ok(self.state.lock().sessions.contains_key(name))
    }

    async fn spawn_pane(
        &self,
        session: &str,
        _cwd: &Path,
        command: &str,
    ) -> Result<String, MuxError> {
        let mut state = self.state.lock();
        if !state.sessions.contains_key(session) {
            return Err(MuxError::SessionGone(session.to_owned()));
        }
        let call = state.spawn_calls;
        state.spawn_calls += 1;
        if state.fail_spawns.contains(&call) {
            return Err(MuxError::Unavailable(format!("scripted spawn failure at call {call}")));
        }
        let pane_id = format!("%{}", state.next_pane);
        state.next_pane += 1;
        let index = state.sessions.get(session).map(|p| p.len()).unwrap_or(0);
        state.panes.insert(
            pane_id.clone(),
            FakePane {
                session: session.to_owned(),
                index,
                title: command.to_owned(),
                tail: Vec::new(),
                sent: Vec::new(),
                interrupts: 0,
                alive: true,
            },
        );
        if let Some(panes) = state.sessions.get_mut(session) {
            panes.push(pane_id.clone());
        }
        Ok(pane_id)
    }

    async fn kill_pane(&self, pane_id: &str) -> Result<(), MuxError> {
        let mut state = self.state.lock();
        let Some(pane) = state.panes.remove(pane_id) else {
            return Err(MuxError::PaneGone(pane_id.to_owned()));
        };
        if let Some(panes) = state.sessions.get_mut(&pane.session) {
            panes.retain(|p| p != pane_id);
        }
        Ok(())
    }

    async fn list_panes(&self, session: &str) -> Result<Vec<MuxPane>, MuxError> {
        let state = self.state.lock();
        let Some(pane_ids) = state.sessions.get(session) else {
            return Err(MuxError::SessionGone(session.to_owned()));
        };
        Ok(pane_ids
            .iter()
            .filter_map(|id| {
                state.panes.get(id).map(|p| MuxPane {
                    pane_id: id.clone(),
                    index: p.index,
                    title: p.title.clone(),
                })
            })
            .collect())
    }

    async fn capture_tail(&self, pane_id: &str, lines: usize) -> Result<CapturedTail, MuxError> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.capture_failures.get_mut(pane_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MuxError::Unavailable("scripted capture failure".to_owned()));
            }
        }
        Self::check_pane(&state, pane_id)?;
        let tail = state
            .panes
            .get(pane_id)
            .map(|p| {
                let skip = p.tail.len().saturating_sub(lines);
                p.tail.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default();
        Ok(CapturedTail { lines: tail, captured_at: Instant::now() })
    }

    async fn send_keys(&self, pane_id: &str, text: &str, submit: bool) -> Result<(), MuxError> {
        let mut state = self.state.lock();
        Self::check_pane(&state, pane_id)?;
        let echo = state.echo_input;
        if let Some(pane) = state.panes.get_mut(pane_id) {
            pane.sent.push(text.to_owned());
            if submit && echo {
                pane.tail.push(text.to_owned());
            }
        }
        Ok(())
    }

    async fn send_interrupt(&self, pane_id: &str) -> Result<(), MuxError> {
        let mut state = self.state.lock();
        Self::check_pane(&state, pane_id)?;
        if let Some(pane) = state.panes.get_mut(pane_id) {
            pane.interrupts += 1;
        }
        Ok(())
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<(), MuxError> {
        let mut state = self.state.lock();
        Self::check_pane(&state, pane_id)?;
        if let Some(pane) = state.panes.get_mut(pane_id) {
            pane.title = title.to_owned();
        }
        Ok(())
    }
}
