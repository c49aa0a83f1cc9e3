// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mail HTTP handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{ApiError, ErrorCode};
use crate::mail::MailSendRequest;
use crate::transport::{err_response, ok_response, respond, Store};

/// `POST /api/v1/mail/send` — redaction applies to the body before storage.
pub async fn mail_send(
    State(s): State<Arc<Store>>,
    Json(mut req): Json<MailSendRequest>,
) -> impl IntoResponse {
    if !req.allow_secret {
        let scan = {
            let redactor = s.redactor.read().await;
            redactor.scan("mail.body", &req.body_md)
        };
        if scan.blocked {
            return err_response(
                ApiError::new(
                    ErrorCode::RedactionBlocked,
                    "mail body contains detected secrets (see details; --allow-secret to override)",
                )
                .with_details(serde_json::json!({ "findings": scan.findings })),
            );
        }
        req.body_md = scan.text;
    }
    respond(s.mail.send(req).await)
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboxQuery {
    pub project_key: String,
    pub agent: String,
    #[serde(default)]
    pub unread_only: bool,
}

/// `GET /api/v1/mail/inbox`
pub async fn mail_inbox(
    State(s): State<Arc<Store>>,
    Query(query): Query<InboxQuery>,
) -> impl IntoResponse {
    let envelopes = s.mail.inbox(&query.project_key, &query.agent, query.unread_only).await;
    ok_response(serde_json::json!({ "inbox": envelopes }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailAckRequest {
    pub project_key: String,
    pub mail_id: String,
    pub agent: String,
    /// "read" marks read; anything else acknowledges.
    #[serde(default)]
    pub action: Option<String>,
}

/// `POST /api/v1/mail/ack`
pub async fn mail_ack(
    State(s): State<Arc<Store>>,
    Json(req): Json<MailAckRequest>,
) -> impl IntoResponse {
    let updated = match req.action.as_deref() {
        Some("read") => s.mail.mark_read(&req.project_key, &req.mail_id, &req.agent).await,
        _ => s.mail.ack(&req.project_key, &req.mail_id, &req.agent).await,
    };
    if updated {
        ok_response(serde_json::json!({ "updated": true }))
    } else {
        err_response(ApiError::new(
            ErrorCode::InvalidArgument,
            format!("no such mail {} in project {}", req.mail_id, req.project_key),
        ))
    }
}
