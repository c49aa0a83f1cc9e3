// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt delivery and interrupt HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{AckOutcome, SendOptions, SendResult};
use crate::registry::Targets;
use crate::transport::{err_response, ok_response, Store};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendRequestOptions {
    #[serde(default)]
    pub track: bool,
    #[serde(default)]
    pub ack_token: Option<String>,
    #[serde(default)]
    pub ack_timeout_secs: Option<u64>,
    #[serde(default)]
    pub inject_deadline_secs: Option<u64>,
    #[serde(default)]
    pub allow_secret: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSendRequest {
    pub prompt: String,
    #[serde(default)]
    pub targets: Targets,
    #[serde(default)]
    pub options: SendRequestOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSendResponse {
    #[serde(flatten)]
    pub send: SendResult,
    pub delivered: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acks: Option<Vec<AckOutcome>>,
}

impl SendRequestOptions {
    pub fn to_send_options(&self) -> SendOptions {
        SendOptions {
            track: self.track,
            ack_token: self.ack_token.clone(),
            ack_timeout: self.ack_timeout_secs.map(Duration::from_secs),
            inject_deadline: self.inject_deadline_secs.map(Duration::from_secs),
            allow_secret: self.allow_secret,
        }
    }
}

/// `POST /api/v1/sessions/{name}/send`
pub async fn session_send(
    State(s): State<Arc<Store>>,
    Path(name): Path<String>,
    Json(req): Json<SessionSendRequest>,
) -> impl IntoResponse {
    let opts = req.options.to_send_options();
    let cancel = CancellationToken::new();
    if opts.track {
        match s.dispatcher.track(&name, &req.targets, &req.prompt, &opts, cancel).await {
            Ok((send, acks)) => {
                let delivered = send.delivered();
                ok_response(SessionSendResponse { send, delivered, acks: Some(acks) })
            }
            Err(e) => err_response(e),
        }
    } else {
        match s.dispatcher.send(&name, &req.targets, &req.prompt, &opts, cancel).await {
            Ok(send) => {
                let delivered = send.delivered();
                ok_response(SessionSendResponse { send, delivered, acks: None })
            }
            Err(e) => err_response(e),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterruptRequest {
    #[serde(default)]
    pub targets: Targets,
}

/// `POST /api/v1/sessions/{name}/interrupt`
pub async fn session_interrupt(
    State(s): State<Arc<Store>>,
    Path(name): Path<String>,
    Json(req): Json<InterruptRequest>,
) -> impl IntoResponse {
    let panes = match s.registry.resolve_targets(&name, &req.targets).await {
        Ok(panes) => panes,
        Err(e) => return err_response(e),
    };
    let mut interrupted = Vec::new();
    let mut failed = Vec::new();
    for pane in &panes {
        match s.dispatcher.interrupt(pane).await {
            Ok(()) => interrupted.push(pane.index),
            Err(_) => failed.push(pane.index),
        }
    }
    ok_response(serde_json::json!({ "interrupted": interrupted, "failed": failed }))
}
