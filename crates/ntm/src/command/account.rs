// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ntm accounts ...`.

use clap::{Args, Subcommand};
use serde_json::json;

use crate::client::{emit, finish, Client};

use super::docs;

#[derive(Debug, Subcommand)]
pub enum AccountCmd {
    /// List registered accounts and the active one per provider.
    List,
    /// Per-provider quota roll-up.
    Quota,
    /// Register or update an account.
    Register(RegisterArgs),
    /// Manually rotate a provider's active account.
    Rotate(RotateArgs),
    /// Show or update the rotation policy.
    AutoRotate(AutoRotateArgs),
    /// Rotation history.
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[arg(long)]
    pub provider: String,
    #[arg(long)]
    pub name: String,
    #[arg(long, default_value = "standard")]
    pub tier: String,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct RotateArgs {
    #[arg(long)]
    pub provider: String,
    /// Target account; must differ from the active one.
    #[arg(long)]
    pub account: String,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct AutoRotateArgs {
    #[arg(long)]
    pub auto_rotate: Option<bool>,
    #[arg(long)]
    pub on_rate_limit: Option<bool>,
    #[arg(long)]
    pub cooldown_secs: Option<u64>,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long, default_value = "50")]
    pub limit: usize,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

pub fn run(client: &Client, cmd: AccountCmd) -> i32 {
    match cmd {
        AccountCmd::List => finish(client.get("/accounts")),
        AccountCmd::Quota => finish(client.get("/accounts/quota")),
        AccountCmd::Register(args) => {
            if args.schema {
                return emit(&docs::schema_for("accounts register"));
            }
            let body = json!({
                "provider": args.provider,
                "name": args.name,
                "tier": args.tier,
                "usage_percent": 0,
                "rate_limited": false,
            });
            finish(client.post("/accounts", &body))
        }
        AccountCmd::Rotate(args) => {
            if args.schema {
                return emit(&docs::schema_for("accounts rotate"));
            }
            let body = json!({ "provider": args.provider, "account": args.account });
            finish(client.post("/accounts/rotate", &body))
        }
        AccountCmd::AutoRotate(args) => {
            if args.schema {
                return emit(&docs::schema_for("accounts auto-rotate"));
            }
            if args.auto_rotate.is_none()
                && args.on_rate_limit.is_none()
                && args.cooldown_secs.is_none()
            {
                return finish(client.get("/accounts/auto-rotate"));
            }
            let mut body = serde_json::Map::new();
            if let Some(v) = args.auto_rotate {
                body.insert("auto_rotate".to_owned(), json!(v));
            }
            if let Some(v) = args.on_rate_limit {
                body.insert("on_rate_limit".to_owned(), json!(v));
            }
            if let Some(v) = args.cooldown_secs {
                body.insert("cooldown_secs".to_owned(), json!(v));
            }
            finish(client.patch("/accounts/auto-rotate", &serde_json::Value::Object(body)))
        }
        AccountCmd::History(args) => {
            if args.schema {
                return emit(&docs::schema_for("accounts history"));
            }
            finish(client.get(&format!("/accounts/history?limit={}", args.limit)))
        }
    }
}
