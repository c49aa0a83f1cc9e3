// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tmux-backed [`Multiplexer`] implementation.
//!
//! Every operation shells out to the tmux CLI. Transient failures (server
//! busy, fork pressure) are retried with decorrelated jitter up to three
//! times before surfacing as [`MuxError::Unavailable`].

use std::path::Path;
use std::time::{Duration, Instant};

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{strip_ansi, tail_lines, CapturedTail, MuxError, MuxPane, Multiplexer};

const MAX_ATTEMPTS: u32 = 3;
const BASE_RETRY: Duration = Duration::from_millis(50);
const MAX_RETRY: Duration = Duration::from_millis(750);

/// Cap on concurrent tmux subprocesses across all pane monitors.
const DEFAULT_SUBPROCESS_LIMIT: usize = 8;

/// Drives a local tmux server through its CLI.
pub struct TmuxMux {
    binary: String,
    socket_name: Option<String>,
    subprocess_permits: Arc<Semaphore>,
}

impl TmuxMux {
    pub fn new() -> Self {
        Self {
            binary: "tmux".to_owned(),
            socket_name: None,
            subprocess_permits: Arc::new(Semaphore::new(DEFAULT_SUBPROCESS_LIMIT)),
        }
    }

    /// Target a non-default tmux socket (isolated test servers).
    pub fn with_socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = Some(name.into());
        self
    }

    /// Override the concurrent-subprocess cap.
    pub fn with_subprocess_limit(mut self, limit: usize) -> Self {
        self.subprocess_permits = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(ref socket) = self.socket_name {
            cmd.arg("-L").arg(socket);
        }
        cmd.args(args);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run a tmux command, retrying transient failures.
    async fn run(&self, args: &[&str]) -> Result<String, MuxError> {
        let _permit = self
            .subprocess_permits
            .acquire()
            .await
            .map_err(|_| MuxError::Unavailable("subprocess pool closed".to_owned()))?;
        let mut last_err = String::new();
        let mut delay = BASE_RETRY;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
                // Decorrelated jitter: next delay in [base, 3 * previous].
                let upper = (delay * 3).min(MAX_RETRY);
                let range_ms = upper.as_millis().max(BASE_RETRY.as_millis() + 1) as u64;
                let picked = rand::rng().random_range(BASE_RETRY.as_millis() as u64..range_ms);
                delay = Duration::from_millis(picked);
            }
            let output = match self.command(args).output().await {
                Ok(output) => output,
                Err(e) => {
                    last_err = e.to_string();
                    continue;
                }
            };
            if output.status.success() {
                return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
            }
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if let Some(err) = classify_failure(&stderr) {
                return Err(err);
            }
            debug!(attempt, stderr = %stderr.trim(), "tmux transient failure");
            last_err = stderr;
        }
        Err(MuxError::Unavailable(last_err.trim().to_owned()))
    }
}

impl Default for TmuxMux {
    fn default() -> Self {
        Self::new()
    }
}

/// Map tmux stderr to a terminal error, or `None` when retryable.
fn classify_failure(stderr: &str) -> Option<MuxError> {
    let lower = stderr.to_lowercase();
    if lower.contains("can't find pane") || lower.contains("unknown pane") {
        return Some(MuxError::PaneGone(stderr.trim().to_owned()));
    }
    if lower.contains("can't find session")
        || lower.contains("session not found")
        || lower.contains("no such session")
    {
        return Some(MuxError::SessionGone(stderr.trim().to_owned()));
    }
    None
}

#[async_trait]
impl Multiplexer for TmuxMux {
    async fn create_session(&self, name: &str, cwd: &Path) -> Result<(), MuxError> {
        let cwd = cwd.to_string_lossy().into_owned();
        self.run(&["new-session", "-d", "-s", name, "-c", cwd.as_str()]).await?;
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        self.run(&["kill-session", "-t", name]).await?;
        Ok(())
    }

    async fn has_session(&self, name: &str) -> Result<bool, MuxError> {
        match self.run(&["has-session", "-t", name]).await {
            Ok(_) => Ok(true),
            Err(MuxError::SessionGone(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn spawn_pane(
        &self,
        session: &str,
        cwd: &Path,
        command: &str,
    ) -> Result<String, MuxError> {
        let cwd = cwd.to_string_lossy().into_owned();
        let mut args =
            vec!["split-window", "-d", "-t", session, "-c", cwd.as_str(), "-P", "-F", "#{pane_id}"];
        if !command.is_empty() {
            args.push(command);
        }
        let output = self.run(&args).await?;
        Ok(output.trim().to_owned())
    }

    async fn kill_pane(&self, pane_id: &str) -> Result<(), MuxError> {
        self.run(&["kill-pane", "-t", pane_id]).await?;
        Ok(())
    }

    async fn list_panes(&self, session: &str) -> Result<Vec<MuxPane>, MuxError> {
        let output = self
            .run(&[
                "list-panes",
                "-s",
                "-t",
                session,
                "-F",
                "#{pane_id}\t#{pane_index}\t#{pane_title}",
            ])
            .await?;
        let mut panes = Vec::new();
        for line in output.lines() {
            let mut parts = line.splitn(3, '\t');
            let pane_id = parts.next().unwrap_or_default().to_owned();
            let index = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let title = parts.next().unwrap_or_default().to_owned();
            if !pane_id.is_empty() {
                panes.push(MuxPane { pane_id, index, title });
            }
        }
        Ok(panes)
    }

    async fn capture_tail(&self, pane_id: &str, lines: usize) -> Result<CapturedTail, MuxError> {
        let start = format!("-{lines}");
        let output = self
            .run(&["capture-pane", "-p", "-t", pane_id, "-S", &start, "-E", "-"])
            .await?;
        Ok(CapturedTail {
            lines: tail_lines(&strip_ansi(&output), lines),
            captured_at: Instant::now(),
        })
    }

    async fn send_keys(&self, pane_id: &str, text: &str, submit: bool) -> Result<(), MuxError> {
        // -l sends the payload literally so tmux key names inside the text
        // are not interpreted.
        self.run(&["send-keys", "-t", pane_id, "-l", text]).await?;
        if submit {
            self.run(&["send-keys", "-t", pane_id, "Enter"]).await?;
        }
        Ok(())
    }

    async fn send_interrupt(&self, pane_id: &str) -> Result<(), MuxError> {
        self.run(&["send-keys", "-t", pane_id, "Escape"]).await?;
        Ok(())
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<(), MuxError> {
        self.run(&["select-pane", "-t", pane_id, "-T", title]).await?;
        Ok(())
    }
}
