// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Staggered spawn controller.
//!
//! Spawning K agents into one session goes through a global admission
//! semaphore with an inter-spawn delay policy. Partial failure rolls
//! forward: already-spawned agents stay live and the failed indices are
//! reported.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::warn;
use uuid::Uuid;

use crate::bus::Bus;
use crate::error::{ApiError, ErrorCode};
use crate::event::{now_epoch_ms, EventKind};
use crate::mux::Multiplexer;
use crate::provider::{AgentType, ProviderSet};
use crate::registry::{Pane, Registry};
use crate::supervisor::Supervisor;

/// Inter-spawn delay shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaggerMode {
    Fixed,
    Linear,
    Exponential,
    Jittered,
}

impl Default for StaggerMode {
    fn default() -> Self {
        Self::Fixed
    }
}

/// Stagger options carried on spawn requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaggerOptions {
    #[serde(default)]
    pub mode: StaggerMode,
    /// Base delay in milliseconds between consecutive spawns.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for StaggerOptions {
    fn default() -> Self {
        Self { mode: StaggerMode::Fixed, base_delay_ms: default_base_delay_ms() }
    }
}

impl StaggerOptions {
    /// Delay before the i-th spawn (the first spawn is immediate).
    pub fn delay_before(&self, index: usize) -> Duration {
        if index == 0 {
            return Duration::ZERO;
        }
        let base = self.base_delay_ms;
        let ms = match self.mode {
            StaggerMode::Fixed => base,
            StaggerMode::Linear => base.saturating_mul(index as u64),
            StaggerMode::Exponential => {
                base.saturating_mul(1u64 << (index.min(10) as u32 - 1))
            }
            StaggerMode::Jittered => {
                let jitter = rand::rng().random_range(0..=base);
                base + jitter
            }
        };
        Duration::from_millis(ms.min(60_000))
    }
}

/// One requested agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub agent_type: AgentType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Result of a batch spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnReport {
    pub spawned: usize,
    pub failed_indices: Vec<usize>,
    pub panes: Vec<Pane>,
}

/// The controller. One instance per process; the semaphore bounds
/// concurrent provisioning across all requests.
pub struct SpawnController {
    mux: Arc<dyn Multiplexer>,
    registry: Arc<Registry>,
    supervisor: Arc<Supervisor>,
    providers: ProviderSet,
    bus: Arc<Bus>,
    semaphore: Arc<Semaphore>,
    /// How long to wait for an admission permit before giving up.
    admission_timeout: Duration,
}

impl SpawnController {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        registry: Arc<Registry>,
        supervisor: Arc<Supervisor>,
        providers: ProviderSet,
        bus: Arc<Bus>,
        max_concurrent: usize,
        admission_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            mux,
            registry,
            supervisor,
            providers,
            bus,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            admission_timeout,
        })
    }

    /// Create a session (multiplexer + registry) and announce it.
    pub async fn create_session(
        &self,
        name: &str,
        project_path: &str,
        layout: &str,
    ) -> Result<crate::registry::Session, ApiError> {
        let session = self.registry.create_session(name, project_path, layout).await?;
        if let Err(e) = self.mux.create_session(name, Path::new(project_path)).await {
            // Roll back the registry record so a retry can succeed.
            let _ = self.registry.remove_session(name).await;
            return Err(ApiError::new(ErrorCode::MultiplexerUnavailable, e.to_string()));
        }
        self.bus.publish(Some(name), None, EventKind::SessionCreated { name: name.to_owned() });
        Ok(session)
    }

    /// Kill a session: multiplexer first, then the registry records.
    pub async fn kill_session(&self, name: &str) -> Result<(), ApiError> {
        let (_, panes) = self.registry.remove_session(name).await?;
        for pane in &panes {
            self.supervisor.unregister(&pane.id).await;
        }
        if let Err(e) = self.mux.kill_session(name).await {
            warn!(session = name, error = %e, "multiplexer kill-session failed");
        }
        self.bus.publish(Some(name), None, EventKind::SessionKilled { name: name.to_owned() });
        Ok(())
    }

    /// Spawn `specs` agents into an existing session with staggering.
    pub async fn spawn_agents(
        &self,
        session_name: &str,
        specs: &[AgentSpec],
        stagger: &StaggerOptions,
    ) -> Result<SpawnReport, ApiError> {
        let session = self.registry.require_session(session_name).await?;
        let existing = self.registry.panes_for(session_name).await.len();
        let mut report = SpawnReport { spawned: 0, failed_indices: Vec::new(), panes: Vec::new() };

        for (i, spec) in specs.iter().enumerate() {
            let delay = stagger.delay_before(i);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.spawn_one(&session, existing + report.panes.len(), spec).await {
                Ok(pane) => {
                    report.spawned += 1;
                    report.panes.push(pane);
                }
                Err(e) => {
                    warn!(session = session_name, index = i, error = %e, "agent spawn failed");
                    report.failed_indices.push(i);
                }
            }
        }
        Ok(report)
    }

    async fn spawn_one(
        &self,
        session: &crate::registry::Session,
        index: usize,
        spec: &AgentSpec,
    ) -> Result<Pane, ApiError> {
        let permit = tokio::time::timeout(
            self.admission_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| {
            ApiError::new(ErrorCode::SpawnSemaphoreExhausted, "spawn admission timed out")
        })?
        .map_err(|_| ApiError::new(ErrorCode::Internal, "spawn semaphore closed"))?;

        let profile = self.providers.get(spec.agent_type);
        let agent_name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", spec.agent_type, short_id()));

        let pane_id = self
            .mux
            .spawn_pane(&session.name, Path::new(&session.project_path), &profile.command)
            .await
            .map_err(|e| ApiError::new(ErrorCode::MultiplexerUnavailable, e.to_string()))?;
        let _ = self.mux.set_pane_title(&pane_id, &agent_name).await;

        let pane = Pane {
            id: pane_id.clone(),
            session_id: session.id.clone(),
            session_name: session.name.clone(),
            index,
            agent_type: spec.agent_type,
            agent_name: agent_name.clone(),
            model: spec.model.clone(),
            title: agent_name.clone(),
            cwd: session.project_path.clone(),
            created_at_ms: now_epoch_ms(),
        };
        if let Err(e) = self.registry.add_pane(pane.clone()).await {
            // Name conflict or session raced away: tear the pane back down.
            let _ = self.mux.kill_pane(&pane_id).await;
            return Err(e);
        }
        self.supervisor.register(pane.clone()).await;
        self.bus.publish(
            Some(&session.name),
            Some(&pane_id),
            EventKind::AgentSpawned { agent_name, agent_type: spec.agent_type },
        );
        drop(permit);
        Ok(pane)
    }
}

fn short_id() -> String {
    Uuid::new_v4().to_string().chars().take(8).collect()
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
