// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Robot-mode HTTP handlers: the machine-first surface other programs use
//! to drive agents.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::observer::RuntimeSnapshot;
use crate::registry::Targets;
use crate::transport::{err_response, ok_response, Store};

use super::agents::SendRequestOptions;

/// `GET /api/v1/robot/status` — monitors + sessions at a glance.
pub async fn robot_status(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let monitors = s.supervisor.status().await;
    let sessions = s.registry.list_sessions().await;
    ok_response(serde_json::json!({
        "sessions": sessions,
        "monitors": monitors,
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct RobotPaneSnapshot {
    #[serde(flatten)]
    pub runtime: RuntimeSnapshot,
    pub session: String,
    pub index: usize,
    pub agent_name: String,
    pub agent_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_message: Option<String>,
}

/// `GET /api/v1/robot/snapshot` — every pane's runtime state in one document.
pub async fn robot_snapshot(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let panes = s.registry.all_panes().await;
    let mut snapshots = Vec::with_capacity(panes.len());
    for pane in &panes {
        let Some(runtime) = s.runtimes.get(&pane.id).await else {
            continue;
        };
        let runtime = runtime.read().await.snapshot();
        snapshots.push(RobotPaneSnapshot {
            runtime,
            session: pane.session_name.clone(),
            index: pane.index,
            agent_name: pane.agent_name.clone(),
            agent_type: pane.agent_type.as_str().to_owned(),
            queued_message: s.dispatcher.active_message(&pane.id),
        });
    }
    ok_response(serde_json::json!({ "panes": snapshots }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RobotSendRequest {
    pub message: String,
    #[serde(default)]
    pub targets: Targets,
    #[serde(default)]
    pub options: SendRequestOptions,
}

/// `POST /api/v1/robot/send/{session}`
pub async fn robot_send(
    State(s): State<Arc<Store>>,
    Path(session): Path<String>,
    Json(req): Json<RobotSendRequest>,
) -> impl IntoResponse {
    let opts = req.options.to_send_options();
    let cancel = CancellationToken::new();
    match s.dispatcher.send(&session, &req.targets, &req.message, &opts, cancel).await {
        Ok(send) => {
            let delivered = send.delivered();
            ok_response(serde_json::json!({
                "message_id": send.message_id,
                "ack_token": send.ack_token,
                "delivered": delivered,
                "results": send.results,
            }))
        }
        Err(e) => err_response(e),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RobotAckRequest {
    #[serde(default)]
    pub targets: Targets,
    pub token: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// `POST /api/v1/robot/ack/{session}`
pub async fn robot_ack(
    State(s): State<Arc<Store>>,
    Path(session): Path<String>,
    Json(req): Json<RobotAckRequest>,
) -> impl IntoResponse {
    let timeout = Duration::from_secs(req.timeout_secs.unwrap_or(30));
    let cancel = CancellationToken::new();
    match s.dispatcher.ack(&session, &req.targets, &req.token, timeout, cancel).await {
        Ok(acks) => ok_response(serde_json::json!({ "acks": acks })),
        Err(e) => err_response(e),
    }
}
