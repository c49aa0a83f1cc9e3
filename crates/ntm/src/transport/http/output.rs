// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pane/session output HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ErrorCode};
use crate::registry::Pane;
use crate::transport::{err_response, ok_response, Store};

#[derive(Debug, Clone, Deserialize)]
pub struct OutputQuery {
    #[serde(default)]
    pub lines: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaneOutput {
    pub pane_id: String,
    pub index: usize,
    pub agent_name: String,
    pub lines: Vec<String>,
}

async fn read_pane_output(s: &Store, pane: &Pane, lines: usize) -> PaneOutput {
    // Serve the observer's snapshot when fresh; fall back to a live capture.
    if let Some(runtime) = s.runtimes.get(&pane.id).await {
        let rt = runtime.read().await;
        if !rt.last_tail.is_empty() {
            let skip = rt.last_tail.len().saturating_sub(lines);
            return PaneOutput {
                pane_id: pane.id.clone(),
                index: pane.index,
                agent_name: pane.agent_name.clone(),
                lines: rt.last_tail[skip..].to_vec(),
            };
        }
    }
    let captured = s.mux.capture_tail(&pane.id, lines).await.ok();
    PaneOutput {
        pane_id: pane.id.clone(),
        index: pane.index,
        agent_name: pane.agent_name.clone(),
        lines: captured.map(|c| c.lines).unwrap_or_default(),
    }
}

/// `GET /api/v1/sessions/{name}/panes/{index}/output`
pub async fn pane_output(
    State(s): State<Arc<Store>>,
    Path((name, index)): Path<(String, usize)>,
    Query(query): Query<OutputQuery>,
) -> impl IntoResponse {
    let lines = query.lines.unwrap_or(s.tail_lines);
    let Some(pane) = s.registry.pane_by_index(&name, index).await else {
        return err_response(ApiError::new(
            ErrorCode::PaneNotFound,
            format!("no pane at index {index} in session {name}"),
        ));
    };
    ok_response(read_pane_output(&s, &pane, lines).await)
}

/// `GET /api/v1/sessions/{name}/output` — every pane in the session.
pub async fn session_output(
    State(s): State<Arc<Store>>,
    Path(name): Path<String>,
    Query(query): Query<OutputQuery>,
) -> impl IntoResponse {
    if let Err(e) = s.registry.require_session(&name).await {
        return err_response(e);
    }
    let lines = query.lines.unwrap_or(s.tail_lines);
    let panes = s.registry.panes_for(&name).await;
    let mut outputs = Vec::with_capacity(panes.len());
    for pane in &panes {
        outputs.push(read_pane_output(&s, pane, lines).await);
    }
    ok_response(serde_json::json!({ "session": name, "panes": outputs }))
}
