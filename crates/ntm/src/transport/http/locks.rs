// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{ApiError, ErrorCode};
use crate::lock::AcquireOutcome;
use crate::transport::{err_response, ok_response, Store};

/// `GET /api/v1/locks`
pub async fn list_locks(State(s): State<Arc<Store>>) -> impl IntoResponse {
    ok_response(serde_json::json!({ "locks": s.locks.list().await }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcquireLockRequest {
    pub resource: String,
    pub pane_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    900
}

/// `POST /api/v1/locks`
pub async fn acquire_lock(
    State(s): State<Arc<Store>>,
    Json(req): Json<AcquireLockRequest>,
) -> impl IntoResponse {
    let outcome = s
        .locks
        .acquire(&req.resource, &req.pane_id, &req.reason, Duration::from_secs(req.ttl_secs))
        .await;
    match outcome {
        AcquireOutcome::Acquired(lock) => {
            ok_response(serde_json::json!({ "acquired": true, "renewed": false, "lock": lock }))
        }
        AcquireOutcome::Renewed(lock) => {
            ok_response(serde_json::json!({ "acquired": true, "renewed": true, "lock": lock }))
        }
        AcquireOutcome::Conflict { holder_pane_id } => err_response(
            ApiError::new(
                ErrorCode::LockConflict,
                format!("resource {} held by {}", req.resource, holder_pane_id),
            )
            .with_details(serde_json::json!({ "holder_pane_id": holder_pane_id })),
        ),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseLockRequest {
    pub resource: String,
    pub pane_id: String,
}

/// `POST /api/v1/locks/release`
pub async fn release_lock(
    State(s): State<Arc<Store>>,
    Json(req): Json<ReleaseLockRequest>,
) -> impl IntoResponse {
    let released = s.locks.release(&req.resource, &req.pane_id).await;
    if released {
        ok_response(serde_json::json!({ "released": true }))
    } else {
        err_response(ApiError::new(
            ErrorCode::LockConflict,
            format!("lock on {} not held by {}", req.resource, req.pane_id),
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAllRequest {
    pub pane_id: String,
}

/// `POST /api/v1/locks/release-all` — `unlock --all` for one pane.
pub async fn release_all_locks(
    State(s): State<Arc<Store>>,
    Json(req): Json<ReleaseAllRequest>,
) -> impl IntoResponse {
    let released = s.locks.release_all(&req.pane_id).await;
    ok_response(serde_json::json!({ "released": released }))
}
