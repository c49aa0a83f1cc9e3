// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitor supervisor: guarantees exactly one live monitor per registered
//! pane.
//!
//! Each monitor is an in-process worker (one task per pane). Its identity
//! record `{pane_id, agent_name, pid, started_at}` is projected to
//! `identities.jsonl` for watchdog bootstrap after an orchestrator crash.
//! A watchdog sweep restarts dead monitors; exceeding the restart budget
//! marks the pane `crashed` and emits `agent.crashed`.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{now_epoch_ms, EventKind};
use crate::lock::LockTable;
use crate::observer::monitor::{run_monitor, MonitorDeps, MonitorExit};
use crate::observer::PaneState;
use crate::persist::{read_jsonl, rewrite_jsonl};
use crate::provider::ProviderSet;
use crate::registry::{Pane, Registry, SessionStatus};

/// Restart budget: more than this many restarts inside [`BUDGET_WINDOW`]
/// marks the pane crashed.
const RESTART_BUDGET: usize = 5;
const BUDGET_WINDOW: Duration = Duration::from_secs(600);

/// On-disk identity record for one live monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub pane_id: String,
    pub agent_name: String,
    pub pid: u32,
    pub started_at_ms: u64,
}

/// Wire snapshot of one monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub pane_id: String,
    pub agent_name: String,
    pub alive: bool,
    pub restarts: u32,
    pub started_at_ms: u64,
}

struct MonitorEntry {
    pane: Pane,
    cancel: CancellationToken,
    handle: JoinHandle<MonitorExit>,
    restarts: VecDeque<Instant>,
    started_at_ms: u64,
}

/// The supervisor. Owns every monitor task and the watchdog.
pub struct Supervisor {
    monitors: Mutex<HashMap<String, MonitorEntry>>,
    deps: Arc<MonitorDeps>,
    providers: ProviderSet,
    registry: Arc<Registry>,
    locks: Arc<LockTable>,
    identities_path: Option<PathBuf>,
    check_interval: Duration,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        deps: Arc<MonitorDeps>,
        providers: ProviderSet,
        registry: Arc<Registry>,
        locks: Arc<LockTable>,
        identities_path: Option<PathBuf>,
        check_interval: Duration,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            monitors: Mutex::new(HashMap::new()),
            deps,
            providers,
            registry,
            locks,
            identities_path,
            check_interval,
            shutdown,
        })
    }

    /// Prune identity records left by a dead orchestrator process.
    pub fn bootstrap(&self) {
        let Some(ref path) = self.identities_path else {
            return;
        };
        let records: Vec<IdentityRecord> = read_jsonl(path);
        let live: Vec<IdentityRecord> =
            records.into_iter().filter(|r| pid_alive(r.pid)).collect();
        let _ = rewrite_jsonl(path, &live);
    }

    /// Register a pane: spawn its monitor and write the identity record.
    pub async fn register(&self, pane: Pane) {
        let profile = self.providers.get(pane.agent_type);
        let cancel = self.shutdown.child_token();
        self.deps.runtimes.register(&pane.id, profile.context_limit).await;
        let handle = tokio::spawn(run_monitor(
            pane.clone(),
            profile,
            Arc::clone(&self.deps),
            cancel.clone(),
        ));
        let mut monitors = self.monitors.lock().await;
        // At most one monitor per pane: cancel any stale entry first.
        if let Some(stale) = monitors.remove(&pane.id) {
            stale.cancel.cancel();
        }
        monitors.insert(
            pane.id.clone(),
            MonitorEntry {
                pane,
                cancel,
                handle,
                restarts: VecDeque::new(),
                started_at_ms: now_epoch_ms(),
            },
        );
        self.write_identities(&monitors);
    }

    /// Unregister a pane and stop its monitor.
    pub async fn unregister(&self, pane_id: &str) {
        let mut monitors = self.monitors.lock().await;
        if let Some(entry) = monitors.remove(pane_id) {
            entry.cancel.cancel();
        }
        self.write_identities(&monitors);
        drop(monitors);
        self.deps.runtimes.remove(pane_id).await;
    }

    pub async fn status(&self) -> Vec<MonitorStatus> {
        let monitors = self.monitors.lock().await;
        let mut statuses: Vec<MonitorStatus> = monitors
            .values()
            .map(|e| MonitorStatus {
                pane_id: e.pane.id.clone(),
                agent_name: e.pane.agent_name.clone(),
                alive: !e.handle.is_finished(),
                restarts: e.restarts.len() as u32,
                started_at_ms: e.started_at_ms,
            })
            .collect();
        statuses.sort_by(|a, b| a.pane_id.cmp(&b.pane_id));
        statuses
    }

    fn write_identities(&self, monitors: &HashMap<String, MonitorEntry>) {
        let Some(ref path) = self.identities_path else {
            return;
        };
        let pid = std::process::id();
        let records: Vec<IdentityRecord> = monitors
            .values()
            .map(|e| IdentityRecord {
                pane_id: e.pane.id.clone(),
                agent_name: e.pane.agent_name.clone(),
                pid,
                started_at_ms: e.started_at_ms,
            })
            .collect();
        let _ = rewrite_jsonl(path, &records);
    }

    /// One watchdog pass: restart finished monitors, clean up dead panes.
    pub async fn sweep(&self) {
        let mut monitors = self.monitors.lock().await;
        let finished: Vec<String> = monitors
            .iter()
            .filter(|(_, e)| e.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        let mut dirty = false;
        for pane_id in finished {
            let Some(mut entry) = monitors.remove(&pane_id) else {
                continue;
            };
            let exit = (&mut entry.handle).await.ok();
            match exit {
                Some(MonitorExit::Cancelled) => {
                    // Deliberate stop; drop the entry.
                    dirty = true;
                }
                Some(MonitorExit::PaneGone) => {
                    dirty = true;
                    drop(monitors);
                    self.cleanup_dead_pane(&entry.pane).await;
                    monitors = self.monitors.lock().await;
                }
                None => {
                    // Monitor died without a verdict (panic/abort): restart
                    // within budget.
                    let now = Instant::now();
                    entry
                        .restarts
                        .retain(|at| now.duration_since(*at) < BUDGET_WINDOW);
                    if entry.restarts.len() >= RESTART_BUDGET {
                        warn!(pane = %pane_id, "monitor restart budget exceeded");
                        dirty = true;
                        drop(monitors);
                        self.mark_crashed(&entry.pane, entry.restarts.len() as u32).await;
                        monitors = self.monitors.lock().await;
                        continue;
                    }
                    entry.restarts.push_back(now);
                    debug!(pane = %pane_id, restarts = entry.restarts.len(), "restarting monitor");
                    let profile = self.providers.get(entry.pane.agent_type);
                    // Fresh runtime: the machine restarts at `unknown` and
                    // settles within one classification window.
                    self.deps.runtimes.register(&pane_id, profile.context_limit).await;
                    let cancel = self.shutdown.child_token();
                    entry.cancel = cancel.clone();
                    entry.handle = tokio::spawn(run_monitor(
                        entry.pane.clone(),
                        profile,
                        Arc::clone(&self.deps),
                        cancel,
                    ));
                    entry.started_at_ms = now_epoch_ms();
                    monitors.insert(pane_id, entry);
                    dirty = true;
                }
            }
        }
        if dirty {
            self.write_identities(&monitors);
        }
    }

    /// The pane disappeared from the multiplexer: tear down its records,
    /// release its locks, and kill the session when no panes remain.
    async fn cleanup_dead_pane(&self, pane: &Pane) {
        self.deps.runtimes.remove(&pane.id).await;
        self.registry.remove_pane(&pane.id).await;
        self.locks.release_all(&pane.id).await;
        let remaining = self.registry.panes_for(&pane.session_name).await;
        if remaining.is_empty() && self.registry.session(&pane.session_name).await.is_some() {
            self.registry.set_session_status(&pane.session_name, SessionStatus::Dead).await;
            self.deps.bus.publish(
                Some(&pane.session_name),
                None,
                EventKind::SessionKilled { name: pane.session_name.clone() },
            );
        }
    }

    /// Budget exhausted: pin the runtime at `crashed` and announce it.
    async fn mark_crashed(&self, pane: &Pane, restarts: u32) {
        if let Some(runtime) = self.deps.runtimes.get(&pane.id).await {
            let prev = {
                let mut rt = runtime.write().await;
                let prev = rt.state.clone();
                rt.state = PaneState::Crashed;
                rt.last_transition_ms = now_epoch_ms();
                prev
            };
            self.deps.bus.publish(
                Some(&pane.session_name),
                Some(&pane.id),
                EventKind::PaneState {
                    prev,
                    next: PaneState::Crashed,
                    reason: "restart_budget_exceeded".to_owned(),
                },
            );
        }
        self.locks.release_all(&pane.id).await;
        self.deps.bus.publish(
            Some(&pane.session_name),
            Some(&pane.id),
            EventKind::AgentCrashed { agent_name: pane.agent_name.clone(), restarts },
        );
    }

    /// Kill a monitor task in place (crash injection for the watchdog tests).
    #[cfg(test)]
    pub(crate) async fn abort_monitor(&self, pane_id: &str) {
        let monitors = self.monitors.lock().await;
        if let Some(entry) = monitors.get(pane_id) {
            entry.handle.abort();
        }
    }

    /// Run the watchdog until shutdown.
    pub fn spawn_watchdog(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = supervisor.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(supervisor.check_interval) => {}
                }
                supervisor.sweep().await;
            }
        });
    }
}

/// Is the given pid alive? (signal 0 probe)
fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
