// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redaction configuration HTTP handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{ApiError, ErrorCode};
use crate::redact::RedactionMode;
use crate::transport::{err_response, ok_response, Store};

/// `GET /api/v1/config/redaction`
pub async fn get_redaction_config(State(s): State<Arc<Store>>) -> impl IntoResponse {
    ok_response(s.redaction_config.read().await.clone())
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchRedactionRequest {
    #[serde(default)]
    pub mode: Option<RedactionMode>,
    #[serde(default)]
    pub allowlist: Option<Vec<String>>,
}

/// `PATCH /api/v1/config/redaction` — recompiles the engine.
pub async fn patch_redaction_config(
    State(s): State<Arc<Store>>,
    Json(req): Json<PatchRedactionRequest>,
) -> impl IntoResponse {
    let mut config = s.redaction_config.read().await.clone();
    if let Some(mode) = req.mode {
        config.mode = mode;
    }
    if let Some(allowlist) = req.allowlist {
        config.allowlist = allowlist;
    }
    match s.apply_redaction_config(config.clone()).await {
        Ok(()) => ok_response(config),
        Err(e) => err_response(ApiError::new(
            ErrorCode::InvalidArgument,
            format!("invalid redaction config: {e}"),
        )),
    }
}
