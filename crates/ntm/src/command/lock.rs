// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ntm lock ...` and `ntm unlock`.

use clap::{Args, Subcommand};
use serde_json::json;

use crate::client::{emit, finish, Client};

use super::docs;

#[derive(Debug, Subcommand)]
pub enum LockCmd {
    /// List held locks.
    List,
    /// Acquire (or renew) a resource lock.
    Acquire(AcquireArgs),
    /// Release a resource lock.
    Release(ReleaseArgs),
}

#[derive(Debug, Args)]
pub struct AcquireArgs {
    pub resource: String,
    #[arg(long)]
    pub pane: String,
    #[arg(long, default_value = "")]
    pub reason: String,
    /// TTL in seconds.
    #[arg(long, default_value = "900")]
    pub ttl: u64,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct ReleaseArgs {
    pub resource: String,
    #[arg(long)]
    pub pane: String,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct UnlockArgs {
    /// Release every lock held by the pane.
    #[arg(long)]
    pub all: bool,
    #[arg(long)]
    pub pane: String,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

pub fn run(client: &Client, cmd: LockCmd) -> i32 {
    match cmd {
        LockCmd::List => finish(client.get("/locks")),
        LockCmd::Acquire(args) => {
            if args.schema {
                return emit(&docs::schema_for("lock acquire"));
            }
            let body = json!({
                "resource": args.resource,
                "pane_id": args.pane,
                "reason": args.reason,
                "ttl_secs": args.ttl,
            });
            finish(client.post("/locks", &body))
        }
        LockCmd::Release(args) => {
            if args.schema {
                return emit(&docs::schema_for("lock release"));
            }
            let body = json!({ "resource": args.resource, "pane_id": args.pane });
            finish(client.post("/locks/release", &body))
        }
    }
}

pub fn run_unlock(client: &Client, args: UnlockArgs) -> i32 {
    if args.schema {
        return emit(&docs::schema_for("unlock"));
    }
    if !args.all {
        eprintln!("error: ntm unlock requires --all (single releases use ntm lock release)");
        return 4;
    }
    let body = json!({ "pane_id": args.pane });
    finish(client.post("/locks/release-all", &body))
}
