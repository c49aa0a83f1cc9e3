// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::AtomicI32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::account::AccountTable;
use crate::bus::Bus;
use crate::dispatch::Dispatcher;
use crate::lock::LockTable;
use crate::mail::MailStore;
use crate::mux::Multiplexer;
use crate::observer::RuntimeTable;
use crate::persist::{EventLog, StateDir};
use crate::redact::{RedactionConfig, Redactor};
use crate::registry::Registry;
use crate::spawn::SpawnController;
use crate::supervisor::Supervisor;

/// WebSocket hub tunables.
#[derive(Debug, Clone)]
pub struct WsSettings {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub batch_size: usize,
    pub batch_window: Duration,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            batch_size: 100,
            batch_window: Duration::from_millis(50),
        }
    }
}

/// Shared application state passed to all handlers via the axum `State`
/// extractor. One instance per orchestrator process.
pub struct Store {
    pub state_dir: StateDir,
    pub mux: Arc<dyn Multiplexer>,
    pub registry: Arc<Registry>,
    pub runtimes: Arc<RuntimeTable>,
    pub bus: Arc<Bus>,
    pub event_log: Arc<EventLog>,
    pub dispatcher: Arc<Dispatcher>,
    pub mail: Arc<MailStore>,
    pub locks: Arc<LockTable>,
    pub accounts: Arc<AccountTable>,
    pub spawner: Arc<SpawnController>,
    pub supervisor: Arc<Supervisor>,
    /// Current redaction configuration (PATCHable at runtime).
    pub redaction_config: RwLock<RedactionConfig>,
    /// Compiled engine snapshot, rebuilt on config changes. Shared with the
    /// dispatcher so prompt scans always see the latest config.
    pub redactor: Arc<RwLock<Arc<Redactor>>>,
    pub ws: WsSettings,
    pub tail_lines: usize,
    pub started_at: Instant,
    pub ws_client_count: AtomicI32,
    pub shutdown: CancellationToken,
}

impl Store {
    /// Swap in a new redaction config, recompiling the engine.
    pub async fn apply_redaction_config(
        &self,
        config: RedactionConfig,
    ) -> anyhow::Result<()> {
        let engine = Redactor::new(&config)?
            .with_findings_log(self.state_dir.findings_path());
        *self.redaction_config.write().await = config.clone();
        *self.redactor.write().await = Arc::new(engine);
        let _ = config.save(&self.state_dir.redaction_config_path());
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state_dir", &self.state_dir.root())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}
