// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account and rotation HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::account::Account;
use crate::transport::{ok_response, respond, Store};

/// `GET /api/v1/accounts`
pub async fn list_accounts(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let accounts = s.accounts.list().await;
    let active = s.accounts.active().await;
    ok_response(serde_json::json!({ "accounts": accounts, "active": active }))
}

/// `POST /api/v1/accounts` — register or update an account.
pub async fn register_account(
    State(s): State<Arc<Store>>,
    Json(account): Json<Account>,
) -> impl IntoResponse {
    s.accounts.upsert(account.clone()).await;
    ok_response(serde_json::json!({ "registered": account.name }))
}

/// `GET /api/v1/accounts/quota`
pub async fn accounts_quota(State(s): State<Arc<Store>>) -> impl IntoResponse {
    ok_response(serde_json::json!({ "providers": s.accounts.quota().await }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RotateRequest {
    pub provider: String,
    pub account: String,
}

/// `POST /api/v1/accounts/rotate` — manual rotation.
pub async fn rotate_account(
    State(s): State<Arc<Store>>,
    Json(req): Json<RotateRequest>,
) -> impl IntoResponse {
    respond(s.accounts.rotate_manual(&req.provider, &req.account).await)
}

/// `GET /api/v1/accounts/auto-rotate`
pub async fn get_auto_rotate(State(s): State<Arc<Store>>) -> impl IntoResponse {
    ok_response(s.accounts.policy().await)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchPolicyRequest {
    #[serde(default)]
    pub auto_rotate: Option<bool>,
    #[serde(default)]
    pub on_rate_limit: Option<bool>,
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
}

/// `PATCH /api/v1/accounts/auto-rotate`
pub async fn patch_auto_rotate(
    State(s): State<Arc<Store>>,
    Json(req): Json<PatchPolicyRequest>,
) -> impl IntoResponse {
    let mut policy = s.accounts.policy().await;
    if let Some(auto_rotate) = req.auto_rotate {
        policy.auto_rotate = auto_rotate;
    }
    if let Some(on_rate_limit) = req.on_rate_limit {
        policy.on_rate_limit = on_rate_limit;
    }
    if let Some(secs) = req.cooldown_secs {
        policy.cooldown = Duration::from_secs(secs);
    }
    s.accounts.set_policy(policy).await;
    ok_response(policy)
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

/// `GET /api/v1/accounts/history`
pub async fn accounts_history(
    State(s): State<Arc<Store>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    ok_response(serde_json::json!({ "history": s.accounts.history(query.limit) }))
}
