// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API contract types and server implementation for the HTTP and WebSocket
//! transports.

pub mod http;
pub mod state;
pub mod ws;

pub use state::Store;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ApiError;
use crate::event::now_epoch_ms;

/// Uniform response envelope shared by every REST endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error body carried in failed envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Build a success envelope.
pub fn ok_body(data: impl Serialize) -> Envelope {
    Envelope {
        success: true,
        data: serde_json::to_value(data).ok(),
        error: None,
        timestamp: now_epoch_ms(),
        request_id: Some(Uuid::new_v4().to_string()),
    }
}

/// Build a failure envelope.
pub fn err_body(error: &ApiError) -> Envelope {
    Envelope {
        success: false,
        data: None,
        error: Some(ErrorBody {
            code: error.code.as_str().to_owned(),
            message: error.message.clone(),
            details: error.details.clone(),
        }),
        timestamp: now_epoch_ms(),
        request_id: Some(Uuid::new_v4().to_string()),
    }
}

/// JSON success response.
pub fn ok_response(data: impl Serialize) -> axum::response::Response {
    Json(ok_body(data)).into_response()
}

/// JSON failure response with the code's HTTP status.
pub fn err_response(error: ApiError) -> axum::response::Response {
    let status = StatusCode::from_u16(error.code.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err_body(&error))).into_response()
}

/// Shorthand for handlers returning `Result<T, ApiError>` bodies.
pub fn respond<T: Serialize>(result: Result<T, ApiError>) -> axum::response::Response {
    match result {
        Ok(data) => ok_response(data),
        Err(error) => err_response(error),
    }
}

/// Build the axum `Router` with all HTTP and WebSocket routes.
pub fn build_router(state: Arc<Store>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/ready", get(http::ready))
        .route("/api/v1/events/catchup", get(http::events_catchup))
        // Sessions
        .route("/api/v1/sessions", post(http::create_session).get(http::list_sessions))
        .route(
            "/api/v1/sessions/{name}",
            get(http::get_session).delete(http::delete_session),
        )
        .route("/api/v1/sessions/{name}/spawn", post(http::spawn_agents))
        .route("/api/v1/sessions/{name}/agents", post(http::add_agent))
        .route("/api/v1/sessions/{name}/send", post(http::session_send))
        .route("/api/v1/sessions/{name}/interrupt", post(http::session_interrupt))
        .route("/api/v1/sessions/{name}/output", get(http::session_output))
        .route("/api/v1/sessions/{name}/panes/{index}/output", get(http::pane_output))
        // Robot mode
        .route("/api/v1/robot/status", get(http::robot_status))
        .route("/api/v1/robot/snapshot", get(http::robot_snapshot))
        .route("/api/v1/robot/send/{session}", post(http::robot_send))
        .route("/api/v1/robot/ack/{session}", post(http::robot_ack))
        // Mail
        .route("/api/v1/mail/send", post(http::mail_send))
        .route("/api/v1/mail/inbox", get(http::mail_inbox))
        .route("/api/v1/mail/ack", post(http::mail_ack))
        // Locks
        .route("/api/v1/locks", get(http::list_locks).post(http::acquire_lock))
        .route("/api/v1/locks/release", post(http::release_lock))
        .route("/api/v1/locks/release-all", post(http::release_all_locks))
        // Accounts
        .route("/api/v1/accounts", get(http::list_accounts).post(http::register_account))
        .route("/api/v1/accounts/quota", get(http::accounts_quota))
        .route("/api/v1/accounts/rotate", post(http::rotate_account))
        .route(
            "/api/v1/accounts/auto-rotate",
            get(http::get_auto_rotate).patch(http::patch_auto_rotate),
        )
        .route("/api/v1/accounts/history", get(http::accounts_history))
        // Redaction config
        .route(
            "/api/v1/config/redaction",
            get(http::get_redaction_config).patch(http::patch_redaction_config),
        )
        // WebSocket
        .route("/api/v1/ws/global", get(ws::ws_global_handler))
        .route("/api/v1/ws/sessions/{name}/watch", get(ws::ws_session_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
