// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session/pane registry: the exclusive owner of Session and Pane records.
//!
//! Reads dominate, so the whole table sits behind a single readers-writer
//! lock. The JSONL projection written on every mutation is for bootstrap
//! and inspection only — the in-memory table stays authoritative.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ApiError, ErrorCode};
use crate::event::now_epoch_ms;
use crate::persist::{read_jsonl, rewrite_jsonl};
use crate::provider::AgentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub project_path: String,
    pub layout: String,
    pub created_at_ms: u64,
    pub status: SessionStatus,
    pub pane_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pane {
    pub id: String,
    pub session_id: String,
    pub session_name: String,
    pub index: usize,
    pub agent_type: AgentType,
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub title: String,
    pub cwd: String,
    pub created_at_ms: u64,
}

/// Send/ack target selector: `"all"`, a pane index list, an agent type, or
/// an agent name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Targets {
    Indices(Vec<usize>),
    Keyword(String),
}

impl Default for Targets {
    fn default() -> Self {
        Self::Keyword("all".to_owned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RegistryRecord {
    Session(Session),
    Pane(Pane),
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    panes: HashMap<String, Pane>,
}

/// The registry. `path` is the JSONL projection target (absent in tests
/// that don't care about persistence).
pub struct Registry {
    inner: RwLock<Inner>,
    path: Option<PathBuf>,
}

impl Registry {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { inner: RwLock::new(Inner::default()), path }
    }

    /// Restore sessions and panes from the projection file.
    pub async fn load(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let mut inner = self.inner.write().await;
        for record in read_jsonl::<RegistryRecord>(path) {
            match record {
                RegistryRecord::Session(s) => {
                    inner.sessions.insert(s.name.clone(), s);
                }
                RegistryRecord::Pane(p) => {
                    inner.panes.insert(p.id.clone(), p);
                }
            }
        }
    }

    fn project(&self, inner: &Inner) {
        let Some(ref path) = self.path else {
            return;
        };
        let mut records: Vec<RegistryRecord> =
            inner.sessions.values().cloned().map(RegistryRecord::Session).collect();
        records.extend(inner.panes.values().cloned().map(RegistryRecord::Pane));
        let _ = rewrite_jsonl(path, &records);
    }

    pub async fn create_session(
        &self,
        name: &str,
        project_path: &str,
        layout: &str,
    ) -> Result<Session, ApiError> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(name) {
            return Err(ApiError::new(
                ErrorCode::InvalidArgument,
                format!("session already exists: {name}"),
            ));
        }
        let session = Session {
            id: Uuid::new_v4().to_string(),
            name: name.to_owned(),
            project_path: project_path.to_owned(),
            layout: layout.to_owned(),
            created_at_ms: now_epoch_ms(),
            status: SessionStatus::Active,
            pane_ids: Vec::new(),
        };
        inner.sessions.insert(name.to_owned(), session.clone());
        self.project(&inner);
        Ok(session)
    }

    pub async fn remove_session(&self, name: &str) -> Result<(Session, Vec<Pane>), ApiError> {
        let mut inner = self.inner.write().await;
        let Some(mut session) = inner.sessions.remove(name) else {
            return Err(ApiError::new(ErrorCode::SessionNotFound, format!("no session: {name}")));
        };
        session.status = SessionStatus::Dead;
        let mut removed = Vec::new();
        for pane_id in &session.pane_ids {
            if let Some(pane) = inner.panes.remove(pane_id) {
                removed.push(pane);
            }
        }
        self.project(&inner);
        Ok((session, removed))
    }

    pub async fn session(&self, name: &str) -> Option<Session> {
        self.inner.read().await.sessions.get(name).cloned()
    }

    pub async fn require_session(&self, name: &str) -> Result<Session, ApiError> {
        self.session(name)
            .await
            .ok_or_else(|| ApiError::new(ErrorCode::SessionNotFound, format!("no session: {name}")))
    }

    pub async fn list_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.inner.read().await.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        sessions
    }

    pub async fn set_session_status(&self, name: &str, status: SessionStatus) {
        let mut inner = self.inner.write().await;
        if let Some(session) = inner.sessions.get_mut(name) {
            session.status = status;
        }
        self.project(&inner);
    }

    /// Add a pane. Agent names are unique across all live panes.
    pub async fn add_pane(&self, pane: Pane) -> Result<(), ApiError> {
        let mut inner = self.inner.write().await;
        if inner.panes.values().any(|p| p.agent_name == pane.agent_name) {
            return Err(ApiError::new(
                ErrorCode::AgentNameConflict,
                format!("agent name already in use: {}", pane.agent_name),
            ));
        }
        let Some(session) = inner.sessions.get_mut(&pane.session_name) else {
            return Err(ApiError::new(
                ErrorCode::SessionNotFound,
                format!("no session: {}", pane.session_name),
            ));
        };
        session.pane_ids.push(pane.id.clone());
        inner.panes.insert(pane.id.clone(), pane);
        self.project(&inner);
        Ok(())
    }

    pub async fn remove_pane(&self, pane_id: &str) -> Option<Pane> {
        let mut inner = self.inner.write().await;
        let pane = inner.panes.remove(pane_id)?;
        if let Some(session) = inner.sessions.get_mut(&pane.session_name) {
            session.pane_ids.retain(|id| id != pane_id);
        }
        self.project(&inner);
        Some(pane)
    }

    pub async fn pane(&self, pane_id: &str) -> Option<Pane> {
        self.inner.read().await.panes.get(pane_id).cloned()
    }

    pub async fn pane_by_index(&self, session: &str, index: usize) -> Option<Pane> {
        self.inner
            .read()
            .await
            .panes
            .values()
            .find(|p| p.session_name == session && p.index == index)
            .cloned()
    }

    pub async fn panes_for(&self, session: &str) -> Vec<Pane> {
        let mut panes: Vec<Pane> = self
            .inner
            .read()
            .await
            .panes
            .values()
            .filter(|p| p.session_name == session)
            .cloned()
            .collect();
        panes.sort_by_key(|p| p.index);
        panes
    }

    pub async fn all_panes(&self) -> Vec<Pane> {
        let mut panes: Vec<Pane> = self.inner.read().await.panes.values().cloned().collect();
        panes.sort_by(|a, b| a.session_name.cmp(&b.session_name).then(a.index.cmp(&b.index)));
        panes
    }

    /// Resolve a target selector to panes within a session.
    pub async fn resolve_targets(
        &self,
        session: &str,
        targets: &Targets,
    ) -> Result<Vec<Pane>, ApiError> {
        self.require_session(session).await?;
        let panes = self.panes_for(session).await;
        match targets {
            Targets::Indices(indices) => {
                let mut resolved: Vec<Pane> = Vec::with_capacity(indices.len());
                for &index in indices {
                    if resolved.iter().any(|p| p.index == index) {
                        continue;
                    }
                    let pane = panes.iter().find(|p| p.index == index).cloned().ok_or_else(|| {
                        ApiError::new(
                            ErrorCode::PaneNotFound,
                            format!("no pane at index {index} in session {session}"),
                        )
                    })?;
                    resolved.push(pane);
                }
                Ok(resolved)
            }
            Targets::Keyword(keyword) => {
                if keyword == "all" {
                    return Ok(panes);
                }
                if let Ok(agent_type) = keyword.parse::<AgentType>() {
                    let matched: Vec<Pane> =
                        panes.iter().filter(|p| p.agent_type == agent_type).cloned().collect();
                    if matched.is_empty() {
                        return Err(ApiError::new(
                            ErrorCode::PaneNotFound,
                            format!("no {agent_type} panes in session {session}"),
                        ));
                    }
                    return Ok(matched);
                }
                panes
                    .iter()
                    .find(|p| p.agent_name == *keyword)
                    .cloned()
                    .map(|p| vec![p])
                    .ok_or_else(|| {
                        ApiError::new(
                            ErrorCode::PaneNotFound,
                            format!("no agent named {keyword} in session {session}"),
                        )
                    })
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
