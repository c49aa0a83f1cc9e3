// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ntm robot-docs` — machine-readable CLI documentation.
//!
//! Everything here is JSON on stdout so driver programs can discover the
//! surface without parsing help text.

use clap::Args;
use serde_json::{json, Value};

use crate::client::emit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum Topic {
    Quickstart,
    Commands,
    Examples,
    ExitCodes,
    Formats,
    Schemas,
    All,
}

#[derive(Debug, Args)]
pub struct DocsArgs {
    /// Documentation topic.
    #[arg(value_enum, default_value = "all")]
    pub topic: Topic,
}

pub fn run(args: DocsArgs) -> i32 {
    let doc = match args.topic {
        Topic::Quickstart => quickstart(),
        Topic::Commands => commands(),
        Topic::Examples => examples(),
        Topic::ExitCodes => exit_codes(),
        Topic::Formats => formats(),
        Topic::Schemas => schemas(),
        Topic::All => json!({
            "quickstart": quickstart(),
            "commands": commands(),
            "examples": examples(),
            "exit_codes": exit_codes(),
            "formats": formats(),
            "schemas": schemas(),
        }),
    };
    emit(&doc)
}

fn quickstart() -> Value {
    json!({
        "steps": [
            { "run": "ntm", "why": "start the orchestrator server" },
            { "run": "ntm session create dev --project-path . --agents claude:2", "why": "provision a session with two agents" },
            { "run": "ntm robot snapshot", "why": "read every pane's state before sending" },
            { "run": "ntm send dev \"run the test suite\" --track --ack-timeout 60", "why": "deliver a prompt and wait for acknowledgement" },
            { "run": "ntm output dev --pane 0", "why": "read what an agent produced" },
        ],
        "notes": [
            "sends queue automatically when a pane is unsafe to interrupt",
            "all commands print the REST response envelope data as JSON",
        ],
    })
}

fn commands() -> Value {
    json!({
        "session": ["create", "list", "show", "kill"],
        "spawn": "add agents to a session with stagger options",
        "send": "deliver a prompt (options: --targets --track --ack-token --ack-timeout)",
        "interrupt": "send an interrupt keystroke to panes",
        "output": "read pane scrollback",
        "robot": ["status", "snapshot", "send", "ack"],
        "mail": ["send", "inbox", "ack"],
        "lock": ["list", "acquire", "release"],
        "unlock": "release every lock held by a pane (--all --pane)",
        "accounts": ["list", "quota", "register", "rotate", "auto-rotate", "history"],
        "redaction": ["show", "set"],
        "robot-docs": "this document",
    })
}

fn examples() -> Value {
    json!([
        {
            "goal": "spawn four agents with exponential stagger",
            "run": "ntm spawn dev --agents claude:4 --stagger exponential --stagger-delay-ms 500",
        },
        {
            "goal": "send to specific panes and collect acks",
            "run": "ntm send dev \"status?\" --targets 0,2 --track --ack-timeout 30",
        },
        {
            "goal": "mail with a required acknowledgement",
            "run": "ntm mail send --project-key myrepo --from alice --to bob --subject plan --body \"review #42\" --ack-required",
        },
        {
            "goal": "rotate a provider account manually",
            "run": "ntm accounts rotate --provider claude --account backup",
        },
    ])
}

fn exit_codes() -> Value {
    json!({
        "0": "success",
        "1": "generic or partial failure",
        "2": "conflict (busy pane, lock conflict, agent name conflict)",
        "3": "missing dependency (multiplexer unavailable)",
        "4": "invalid arguments",
        "5": "interrupted state requiring resume or restart",
    })
}

fn formats() -> Value {
    json!({
        "envelope": {
            "success": "bool",
            "data": "object (on success)",
            "error": { "code": "string", "message": "string", "details": "object?" },
            "timestamp": "epoch milliseconds",
            "request_id": "string?",
        },
        "targets": "\"all\" | [pane_index, ...] | agent_type | agent_name",
        "persisted_stores": "line-oriented JSON (one record per line); config files are TOML",
    })
}

/// Every command name `schema_for` knows about.
pub const SCHEMA_COMMANDS: &[&str] = &[
    "session create",
    "spawn",
    "send",
    "interrupt",
    "output",
    "robot send",
    "robot ack",
    "mail send",
    "mail inbox",
    "mail ack",
    "lock acquire",
    "lock release",
    "unlock",
    "accounts register",
    "accounts rotate",
    "accounts auto-rotate",
    "accounts history",
    "redaction set",
];

fn schemas() -> Value {
    let mut map = serde_json::Map::new();
    for command in SCHEMA_COMMANDS {
        map.insert((*command).to_owned(), schema_for(command));
    }
    Value::Object(map)
}

/// Request/response schema for one command (`--schema`).
pub fn schema_for(command: &str) -> Value {
    match command {
        "session create" => json!({
            "request": {
                "name": "string",
                "project_path": "string",
                "layout": "string",
                "agents": [{ "agent_type": "claude|codex|gemini|user|unknown", "name": "string?", "model": "string?" }],
                "stagger": { "mode": "fixed|linear|exponential|jittered", "base_delay_ms": "u64" },
            },
            "response": {
                "session": { "id": "string", "name": "string", "status": "active|idle|dead", "pane_ids": ["string"] },
                "spawn": { "spawned": "usize", "failed_indices": ["usize"] },
            },
        }),
        "spawn" => json!({
            "request": {
                "agents": [{ "agent_type": "claude|codex|gemini|user|unknown", "name": "string?", "model": "string?" }],
                "stagger": { "mode": "fixed|linear|exponential|jittered", "base_delay_ms": "u64" },
            },
            "response": {
                "spawned": "usize",
                "failed_indices": ["usize"],
                "panes": [{ "id": "string", "index": "usize", "agent_name": "string" }],
            },
        }),
        "send" => json!({
            "request": {
                "prompt": "string",
                "targets": "\"all\" | [usize] | agent_type | agent_name",
                "options": {
                    "track": "bool",
                    "ack_token": "string?",
                    "ack_timeout_secs": "u64?",
                    "allow_secret": "bool",
                },
            },
            "response": {
                "message_id": "string",
                "ack_token": "string",
                "delivered": ["pane_id"],
                "results": [{ "pane_id": "string", "status": "delivered|queued|failed" }],
                "acks": [{ "pane_id": "string", "status": "acked|timeout" }],
            },
        }),
        "interrupt" => json!({
            "request": { "targets": "\"all\" | [usize] | agent_type | agent_name" },
            "response": { "interrupted": ["usize"], "failed": ["usize"] },
        }),
        "output" => json!({
            "request": { "pane": "usize?", "lines": "usize?" },
            "response": {
                "pane_id": "string",
                "index": "usize",
                "agent_name": "string",
                "lines": ["string"],
            },
        }),
        "robot send" => json!({
            "request": {
                "message": "string",
                "targets": "\"all\" | [usize] | agent_type | agent_name",
                "options": { "track": "bool", "ack_timeout_secs": "u64?" },
            },
            "response": {
                "message_id": "string",
                "ack_token": "string",
                "delivered": ["pane_id"],
            },
        }),
        "robot ack" => json!({
            "request": { "token": "string", "targets": "selector", "timeout_secs": "u64" },
            "response": { "acks": [{ "pane_id": "string", "status": "acked|timeout", "text": "string?" }] },
        }),
        "mail send" => json!({
            "request": {
                "project_key": "string",
                "from_agent": "string",
                "to": ["agent_name"],
                "subject": "string",
                "body_md": "string",
                "importance": "low|normal|high|urgent",
                "ack_required": "bool",
                "allow_secret": "bool",
            },
            "response": { "id": "string", "thread_id": "string" },
        }),
        "mail inbox" => json!({
            "request": { "project_key": "string", "agent": "string", "unread_only": "bool" },
            "response": {
                "inbox": [{
                    "id": "string",
                    "from_agent": "string",
                    "subject": "string",
                    "thread_id": "string",
                    "importance": "low|normal|high|urgent",
                    "read_by": ["agent_name"],
                    "acked_by": ["agent_name"],
                }],
            },
        }),
        "mail ack" => json!({
            "request": {
                "project_key": "string",
                "mail_id": "string",
                "agent": "string",
                "action": "\"read\" | \"ack\"",
            },
            "response": { "updated": "bool" },
        }),
        "lock acquire" => json!({
            "request": {
                "resource": "project-relative path",
                "pane_id": "string",
                "reason": "string",
                "ttl_secs": "u64",
            },
            "response": {
                "acquired": "bool",
                "renewed": "bool",
                "lock": { "resource": "string", "holder_pane_id": "string", "renew_count": "u32" },
            },
        }),
        "lock release" => json!({
            "request": { "resource": "string", "pane_id": "string" },
            "response": { "released": "bool" },
        }),
        "unlock" => json!({
            "request": { "pane_id": "string" },
            "response": { "released": "usize" },
        }),
        "accounts register" => json!({
            "request": {
                "provider": "string",
                "name": "string",
                "tier": "string",
                "usage_percent": "u8",
                "rate_limited": "bool",
            },
            "response": { "registered": "string" },
        }),
        "accounts rotate" => json!({
            "request": { "provider": "string", "account": "string (must differ from active)" },
            "response": {
                "provider": "string",
                "prev": "string",
                "next": "string",
                "automatic": "bool",
                "success": "bool",
            },
        }),
        "accounts auto-rotate" => json!({
            "request": { "auto_rotate": "bool?", "on_rate_limit": "bool?", "cooldown_secs": "u64?" },
            "response": { "auto_rotate": "bool", "on_rate_limit": "bool", "cooldown": "u64 seconds" },
        }),
        "accounts history" => json!({
            "request": { "limit": "usize" },
            "response": {
                "history": [{
                    "ts_ms": "u64",
                    "provider": "string",
                    "prev": "string",
                    "next": "string",
                    "reason": "string",
                    "automatic": "bool",
                    "success": "bool",
                }],
            },
        }),
        "redaction set" => json!({
            "request": { "mode": "off|warn|redact|block", "allowlist": ["regex"] },
            "response": { "mode": "off|warn|redact|block", "allowlist": ["regex"] },
        }),
        _ => json!({ "error": format!("no schema for {command}") }),
    }
}
