// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ntm session ...`, `ntm spawn`, `ntm output`.

use clap::{Args, Subcommand};
use serde_json::json;

use crate::client::{emit, finish, Client};

use super::docs;

#[derive(Debug, Subcommand)]
pub enum SessionCmd {
    /// Create a session (optionally spawning agents).
    Create(CreateArgs),
    /// List sessions.
    List,
    /// Show one session and its panes.
    Show { name: String },
    /// Kill a session and all its panes.
    Kill { name: String },
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    pub name: String,
    /// Project directory for the session.
    #[arg(long, default_value = ".")]
    pub project_path: String,
    /// Multiplexer layout hint.
    #[arg(long, default_value = "tiled")]
    pub layout: String,
    /// Agents to spawn, e.g. `claude:2,codex:1`.
    #[arg(long)]
    pub agents: Option<String>,
    /// Stagger mode: fixed, linear, exponential, jittered.
    #[arg(long)]
    pub stagger: Option<String>,
    /// Base inter-spawn delay in milliseconds.
    #[arg(long)]
    pub stagger_delay_ms: Option<u64>,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct SpawnArgs {
    pub session: String,
    /// Agents to spawn, e.g. `claude:2,codex:1`.
    #[arg(long)]
    pub agents: String,
    /// Stagger mode: fixed, linear, exponential, jittered.
    #[arg(long)]
    pub stagger: Option<String>,
    /// Base inter-spawn delay in milliseconds.
    #[arg(long)]
    pub stagger_delay_ms: Option<u64>,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    pub session: String,
    /// Pane index; omit for every pane.
    #[arg(long)]
    pub pane: Option<usize>,
    /// Tail lines to return.
    #[arg(long)]
    pub lines: Option<usize>,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

/// Parse `claude:2,codex:1` into agent spec JSON.
pub fn parse_agents(raw: &str) -> Result<Vec<serde_json::Value>, String> {
    let mut specs = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let (agent_type, count) = match part.split_once(':') {
            Some((t, n)) => {
                let count: usize =
                    n.trim().parse().map_err(|_| format!("invalid agent count in {part:?}"))?;
                (t.trim(), count)
            }
            None => (part.trim(), 1),
        };
        for _ in 0..count {
            specs.push(json!({ "agent_type": agent_type }));
        }
    }
    if specs.is_empty() {
        return Err("no agents specified".to_owned());
    }
    Ok(specs)
}

fn stagger_body(mode: &Option<String>, delay_ms: &Option<u64>) -> Option<serde_json::Value> {
    if mode.is_none() && delay_ms.is_none() {
        return None;
    }
    let mut body = serde_json::Map::new();
    if let Some(mode) = mode {
        body.insert("mode".to_owned(), json!(mode));
    }
    if let Some(delay) = delay_ms {
        body.insert("base_delay_ms".to_owned(), json!(delay));
    }
    Some(serde_json::Value::Object(body))
}

pub fn run(client: &Client, cmd: SessionCmd) -> i32 {
    match cmd {
        SessionCmd::Create(args) => {
            if args.schema {
                return emit(&docs::schema_for("session create"));
            }
            let agents = match args.agents.as_deref().map(parse_agents).transpose() {
                Ok(agents) => agents.unwrap_or_default(),
                Err(e) => {
                    eprintln!("error: {e}");
                    return 4;
                }
            };
            let mut body = json!({
                "name": args.name,
                "project_path": args.project_path,
                "layout": args.layout,
                "agents": agents,
            });
            if let Some(stagger) = stagger_body(&args.stagger, &args.stagger_delay_ms) {
                body["stagger"] = stagger;
            }
            finish(client.post("/sessions", &body))
        }
        SessionCmd::List => finish(client.get("/sessions")),
        SessionCmd::Show { name } => finish(client.get(&format!("/sessions/{name}"))),
        SessionCmd::Kill { name } => finish(client.delete(&format!("/sessions/{name}"))),
    }
}

pub fn run_spawn(client: &Client, args: SpawnArgs) -> i32 {
    if args.schema {
        return emit(&docs::schema_for("spawn"));
    }
    let agents = match parse_agents(&args.agents) {
        Ok(agents) => agents,
        Err(e) => {
            eprintln!("error: {e}");
            return 4;
        }
    };
    let mut body = json!({ "agents": agents });
    if let Some(stagger) = stagger_body(&args.stagger, &args.stagger_delay_ms) {
        body["stagger"] = stagger;
    }
    finish(client.post(&format!("/sessions/{}/spawn", args.session), &body))
}

pub fn run_output(client: &Client, args: OutputArgs) -> i32 {
    if args.schema {
        return emit(&docs::schema_for("output"));
    }
    let query = match args.lines {
        Some(lines) => format!("?lines={lines}"),
        None => String::new(),
    };
    let path = match args.pane {
        Some(index) => format!("/sessions/{}/panes/{index}/output{query}", args.session),
        None => format!("/sessions/{}/output{query}", args.session),
    };
    finish(client.get(&path))
}
