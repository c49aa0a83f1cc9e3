// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal-multiplexer adapter.
//!
//! The multiplexer owns sessions, windows, and panes; NTM drives it through
//! its CLI and reads only the text it has already captured. The trait seam
//! keeps the orchestrator testable against [`fake::FakeMux`].

pub mod fake;
pub mod tmux;

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;

pub use fake::FakeMux;
pub use tmux::TmuxMux;

/// Adapter-level errors. Transient failures are retried inside the tmux
/// adapter; what surfaces here is already terminal for the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    /// The multiplexer binary or server is unreachable.
    Unavailable(String),
    /// The referenced session does not exist.
    SessionGone(String),
    /// The referenced pane does not exist (closed or never created).
    PaneGone(String),
}

impl std::fmt::Display for MuxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(detail) => write!(f, "multiplexer unavailable: {detail}"),
            Self::SessionGone(name) => write!(f, "session gone: {name}"),
            Self::PaneGone(id) => write!(f, "pane gone: {id}"),
        }
    }
}

impl std::error::Error for MuxError {}

/// A pane as reported by the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxPane {
    pub pane_id: String,
    pub index: usize,
    pub title: String,
}

/// The last N lines of a pane's scrollback, ANSI-stripped.
#[derive(Debug, Clone)]
pub struct CapturedTail {
    pub lines: Vec<String>,
    pub captured_at: Instant,
}

/// Commands NTM issues against the multiplexer.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    async fn create_session(&self, name: &str, cwd: &Path) -> Result<(), MuxError>;

    async fn kill_session(&self, name: &str) -> Result<(), MuxError>;

    async fn has_session(&self, name: &str) -> Result<bool, MuxError>;

    /// Provision a new pane in `session` running `command`, returning the
    /// multiplexer's pane id.
    async fn spawn_pane(&self, session: &str, cwd: &Path, command: &str)
        -> Result<String, MuxError>;

    async fn kill_pane(&self, pane_id: &str) -> Result<(), MuxError>;

    async fn list_panes(&self, session: &str) -> Result<Vec<MuxPane>, MuxError>;

    /// Capture the last `lines` lines of scrollback, ANSI-stripped.
    async fn capture_tail(&self, pane_id: &str, lines: usize) -> Result<CapturedTail, MuxError>;

    /// Write `text` as keystrokes; when `submit` is set, follow with Enter.
    /// The write is atomic from the caller's perspective: keystrokes are
    /// never split across other writers of the same pane.
    async fn send_keys(&self, pane_id: &str, text: &str, submit: bool) -> Result<(), MuxError>;

    /// Send an interrupt (Escape) keystroke.
    async fn send_interrupt(&self, pane_id: &str) -> Result<(), MuxError>;

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<(), MuxError>;
}

/// Strip ANSI CSI/OSC escape sequences from captured scrollback.
pub fn strip_ansi(input: &str) -> String {
    // CSI: ESC [ params intermediates final; OSC: ESC ] ... (BEL | ESC \).
    static PATTERN: &str = "\u{1b}(?:\\[[0-9;?]*[ -/]*[@-~]|\\][^\u{7}\u{1b}]*(?:\u{7}|\u{1b}\\\\)?)";
    static RE: std::sync::OnceLock<Option<Regex>> = std::sync::OnceLock::new();
    match RE.get_or_init(|| Regex::new(PATTERN).ok()) {
        Some(re) => re.replace_all(input, "").into_owned(),
        None => input.to_owned(),
    }
}

/// Split captured text into trimmed-right lines, keeping at most `max`
/// trailing lines.
pub fn tail_lines(text: &str, max: usize) -> Vec<String> {
    let lines: Vec<String> = text.lines().map(|l| l.trim_end().to_owned()).collect();
    let skip = lines.len().saturating_sub(max);
    lines.into_iter().skip(skip).collect()
}

#[cfg(test)]
#[path = "mux_tests.rs"]
mod tests;
