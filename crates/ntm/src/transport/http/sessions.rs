// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::registry::Session;
use crate::spawn::{AgentSpec, SpawnReport, StaggerOptions};
use crate::transport::{err_response, ok_response, respond, Store};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    pub project_path: String,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub stagger: Option<StaggerOptions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    pub session: Session,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn: Option<SpawnReport>,
}

/// `POST /api/v1/sessions`
pub async fn create_session(
    State(s): State<Arc<Store>>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let layout = req.layout.as_deref().unwrap_or("tiled");
    let session = match s.spawner.create_session(&req.name, &req.project_path, layout).await {
        Ok(session) => session,
        Err(e) => return err_response(e),
    };
    let spawn = if req.agents.is_empty() {
        None
    } else {
        let stagger = req.stagger.unwrap_or_default();
        match s.spawner.spawn_agents(&req.name, &req.agents, &stagger).await {
            Ok(report) => Some(report),
            Err(e) => return err_response(e),
        }
    };
    let session = s.registry.session(&req.name).await.unwrap_or(session);
    ok_response(CreateSessionResponse { session, spawn })
}

/// `GET /api/v1/sessions`
pub async fn list_sessions(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let sessions = s.registry.list_sessions().await;
    ok_response(serde_json::json!({ "sessions": sessions }))
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub session: Session,
    pub panes: Vec<crate::registry::Pane>,
}

/// `GET /api/v1/sessions/{name}`
pub async fn get_session(
    State(s): State<Arc<Store>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match s.registry.require_session(&name).await {
        Ok(session) => {
            let panes = s.registry.panes_for(&name).await;
            ok_response(SessionDetail { session, panes })
        }
        Err(e) => err_response(e),
    }
}

/// `DELETE /api/v1/sessions/{name}`
pub async fn delete_session(
    State(s): State<Arc<Store>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    respond(s.spawner.kill_session(&name).await.map(|_| serde_json::json!({ "killed": name })))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpawnRequest {
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub stagger: Option<StaggerOptions>,
}

/// `POST /api/v1/sessions/{name}/spawn`
pub async fn spawn_agents(
    State(s): State<Arc<Store>>,
    Path(name): Path<String>,
    Json(req): Json<SpawnRequest>,
) -> impl IntoResponse {
    let stagger = req.stagger.unwrap_or_default();
    respond(s.spawner.spawn_agents(&name, &req.agents, &stagger).await)
}

/// `POST /api/v1/sessions/{name}/agents` — add a single agent, no stagger.
pub async fn add_agent(
    State(s): State<Arc<Store>>,
    Path(name): Path<String>,
    Json(spec): Json<AgentSpec>,
) -> impl IntoResponse {
    let stagger = StaggerOptions { base_delay_ms: 0, ..StaggerOptions::default() };
    respond(s.spawner.spawn_agents(&name, std::slice::from_ref(&spec), &stagger).await)
}
