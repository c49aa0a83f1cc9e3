// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ntm send`, `ntm interrupt`, and `ntm robot ...`.

use clap::{Args, Subcommand};
use serde_json::json;

use crate::client::{emit, finish, Client};

use super::{docs, parse_targets};

#[derive(Debug, Args)]
pub struct SendArgs {
    pub session: String,
    pub prompt: String,
    /// Targets: `all`, a pane index list (`0,2`), an agent type, or a name.
    #[arg(long, default_value = "all")]
    pub targets: String,
    /// Wait for an acknowledgement token after delivery.
    #[arg(long)]
    pub track: bool,
    /// Explicit ack token (defaults to one derived from the message id).
    #[arg(long)]
    pub ack_token: Option<String>,
    /// Ack timeout in seconds.
    #[arg(long)]
    pub ack_timeout: Option<u64>,
    /// Send the prompt even when redaction would block it.
    #[arg(long)]
    pub allow_secret: bool,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct InterruptArgs {
    pub session: String,
    #[arg(long, default_value = "all")]
    pub targets: String,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Subcommand)]
pub enum RobotCmd {
    /// Orchestrator status: sessions and monitors.
    Status,
    /// Every pane's runtime state in one document.
    Snapshot,
    /// Deliver a message to panes.
    Send(RobotSendArgs),
    /// Wait for an ack token in pane tails.
    Ack(AckArgs),
}

#[derive(Debug, Args)]
pub struct RobotSendArgs {
    pub session: String,
    pub message: String,
    #[arg(long, default_value = "all")]
    pub targets: String,
    #[arg(long)]
    pub track: bool,
    #[arg(long)]
    pub ack_timeout: Option<u64>,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct AckArgs {
    pub session: String,
    /// Token to wait for.
    #[arg(long)]
    pub token: String,
    #[arg(long, default_value = "all")]
    pub targets: String,
    /// Timeout in seconds (0 checks once and returns).
    #[arg(long, default_value = "30")]
    pub timeout: u64,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

pub fn run_send(client: &Client, args: SendArgs) -> i32 {
    if args.schema {
        return emit(&docs::schema_for("send"));
    }
    let mut options = serde_json::Map::new();
    options.insert("track".to_owned(), json!(args.track));
    options.insert("allow_secret".to_owned(), json!(args.allow_secret));
    if let Some(token) = args.ack_token {
        options.insert("ack_token".to_owned(), json!(token));
    }
    if let Some(timeout) = args.ack_timeout {
        options.insert("ack_timeout_secs".to_owned(), json!(timeout));
    }
    let body = json!({
        "prompt": args.prompt,
        "targets": parse_targets(&args.targets),
        "options": options,
    });
    finish(client.post(&format!("/sessions/{}/send", args.session), &body))
}

pub fn run_interrupt(client: &Client, args: InterruptArgs) -> i32 {
    if args.schema {
        return emit(&docs::schema_for("interrupt"));
    }
    let body = json!({ "targets": parse_targets(&args.targets) });
    finish(client.post(&format!("/sessions/{}/interrupt", args.session), &body))
}

pub fn run(client: &Client, cmd: RobotCmd) -> i32 {
    match cmd {
        RobotCmd::Status => finish(client.get("/robot/status")),
        RobotCmd::Snapshot => finish(client.get("/robot/snapshot")),
        RobotCmd::Send(args) => {
            if args.schema {
                return emit(&docs::schema_for("robot send"));
            }
            let mut options = serde_json::Map::new();
            options.insert("track".to_owned(), json!(args.track));
            if let Some(timeout) = args.ack_timeout {
                options.insert("ack_timeout_secs".to_owned(), json!(timeout));
            }
            let body = json!({
                "message": args.message,
                "targets": parse_targets(&args.targets),
                "options": options,
            });
            finish(client.post(&format!("/robot/send/{}", args.session), &body))
        }
        RobotCmd::Ack(args) => {
            if args.schema {
                return emit(&docs::schema_for("robot ack"));
            }
            let body = json!({
                "token": args.token,
                "targets": parse_targets(&args.targets),
                "timeout_secs": args.timeout,
            });
            finish(client.post(&format!("/robot/ack/{}", args.session), &body))
        }
    }
}
