// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP request/response types and axum handler implementations.

mod accounts;
mod agents;
mod locks;
mod mail;
mod output;
mod redaction;
mod robot;
mod sessions;

pub use accounts::*;
pub use agents::*;
pub use locks::*;
pub use mail::*;
pub use output::*;
pub use redaction::*;
pub use robot::*;
pub use sessions::*;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::transport::{ok_response, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub pid: u32,
    pub uptime_secs: u64,
    pub sessions: usize,
    pub panes: usize,
    pub ws_clients: i32,
}

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let sessions = s.registry.list_sessions().await.len();
    let panes = s.registry.all_panes().await.len();
    ok_response(HealthResponse {
        status: "running".to_owned(),
        pid: std::process::id(),
        uptime_secs: s.started_at.elapsed().as_secs(),
        sessions,
        panes,
        ws_clients: s.ws_client_count.load(Ordering::Relaxed),
    })
}

/// `GET /api/v1/ready`
pub async fn ready(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let ready = !s.shutdown.is_cancelled();
    ok_response(serde_json::json!({ "ready": ready }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatchupQuery {
    #[serde(default)]
    pub since_seq: u64,
}

/// `GET /api/v1/events/catchup?since_seq=` — replay bus events for
/// reconnecting clients.
pub async fn events_catchup(
    State(s): State<Arc<Store>>,
    Query(query): Query<CatchupQuery>,
) -> impl IntoResponse {
    let events = s.event_log.catchup(query.since_seq);
    ok_response(serde_json::json!({
        "events": events,
        "last_seq": s.event_log.last_seq(),
    }))
}
