// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use crate::dispatch::DispatchSettings;
use crate::observer::ObserverSettings;

/// Multi-agent terminal-session orchestrator.
#[derive(Debug, Clone, Parser)]
#[command(name = "ntm", version, about)]
pub struct Config {
    /// HTTP port to listen on.
    #[arg(long, env = "NTM_PORT", default_value = "9123")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "NTM_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// State directory (defaults to $XDG_STATE_HOME/ntm).
    #[arg(long, env = "NTM_STATE_DIR")]
    pub state_dir: Option<String>,

    /// Base URL the CLI talks to (defaults to the local server).
    #[arg(long, env = "NTM_URL")]
    pub url: Option<String>,

    /// tmux socket name (isolated servers, tests).
    #[arg(long, env = "NTM_TMUX_SOCKET")]
    pub tmux_socket: Option<String>,

    /// Scrollback lines captured per snapshot.
    #[arg(long, env = "NTM_TAIL_LINES", default_value = "200")]
    pub tail_lines: usize,

    /// Poll cadence while a pane is generating, in milliseconds.
    #[arg(long, env = "NTM_POLL_ACTIVE_MS", default_value = "250")]
    pub poll_active_ms: u64,

    /// Poll cadence while a pane is waiting, in milliseconds.
    #[arg(long, env = "NTM_POLL_IDLE_MS", default_value = "2000")]
    pub poll_idle_ms: u64,

    /// Poll cadence while a pane is stalled, in milliseconds.
    #[arg(long, env = "NTM_POLL_STALLED_MS", default_value = "30000")]
    pub poll_stalled_ms: u64,

    /// Seconds without scrollback change before an active pane is stalled.
    #[arg(long, env = "NTM_STALL_THRESHOLD_SECS", default_value = "60")]
    pub stall_threshold_secs: u64,

    /// Window after a tail change during which a pane counts as user_typing.
    #[arg(long, env = "NTM_TYPING_WINDOW_MS", default_value = "1500")]
    pub typing_window_ms: u64,

    /// Seconds an unclassifiable tail holds before degrading to waiting.
    #[arg(long, env = "NTM_UNKNOWN_HOLD_SECS", default_value = "10")]
    pub unknown_hold_secs: u64,

    /// Quiet window (ms) required after any scrollback change before
    /// keystroke injection.
    #[arg(long, env = "NTM_QUIET_WINDOW_MS", default_value = "600")]
    pub quiet_window_ms: u64,

    /// Seconds a send waits for the injection gate before queueing.
    #[arg(long, env = "NTM_INJECT_DEADLINE_SECS", default_value = "10")]
    pub inject_deadline_secs: u64,

    /// Default ack timeout in seconds.
    #[arg(long, env = "NTM_ACK_TIMEOUT_SECS", default_value = "30")]
    pub ack_timeout_secs: u64,

    /// Watchdog sweep interval in seconds.
    #[arg(long, env = "NTM_WATCHDOG_INTERVAL_SECS", default_value = "30")]
    pub watchdog_interval_secs: u64,

    /// Global cap on concurrent agent provisioning.
    #[arg(long, env = "NTM_MAX_CONCURRENT_SPAWNS", default_value = "4")]
    pub max_concurrent_spawns: usize,

    /// Seconds to wait for a spawn admission permit.
    #[arg(long, env = "NTM_SPAWN_ADMISSION_SECS", default_value = "30")]
    pub spawn_admission_secs: u64,

    /// TTL in seconds before unacked ack-required mail raises an alert.
    #[arg(long, env = "NTM_MAIL_ACK_TTL_SECS", default_value = "3600")]
    pub mail_ack_ttl_secs: u64,

    /// Redaction mode override (off, warn, redact, block).
    #[arg(long, env = "NTM_REDACTION_MODE")]
    pub redaction_mode: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "NTM_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "NTM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tail_lines == 0 {
            anyhow::bail!("--tail-lines must be positive");
        }
        if self.poll_active_ms == 0 || self.poll_idle_ms == 0 {
            anyhow::bail!("poll cadences must be positive");
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {} (expected json or text)", self.log_format);
        }
        if let Some(ref mode) = self.redaction_mode {
            mode.parse::<crate::redact::RedactionMode>()?;
        }
        Ok(())
    }

    pub fn observer_settings(&self) -> ObserverSettings {
        ObserverSettings {
            tail_lines: self.tail_lines,
            poll_active: Duration::from_millis(self.poll_active_ms),
            poll_idle: Duration::from_millis(self.poll_idle_ms),
            poll_stalled: Duration::from_millis(self.poll_stalled_ms),
            stall_threshold: Duration::from_secs(self.stall_threshold_secs),
            typing_window: Duration::from_millis(self.typing_window_ms),
            unknown_hold: Duration::from_secs(self.unknown_hold_secs),
            quiet_window: Duration::from_millis(self.quiet_window_ms),
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            inject_deadline: Duration::from_secs(self.inject_deadline_secs),
            quiet_window: Duration::from_millis(self.quiet_window_ms),
            default_ack_timeout: Duration::from_secs(self.ack_timeout_secs),
        }
    }

    /// Base URL the CLI client targets.
    pub fn client_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
