// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI commands. Every REST endpoint has a command with the same payload
//! shape; responses are printed as pretty JSON and failures map to the
//! CLI-wide exit codes (0 success, 1 generic, 2 conflict, 3 missing
//! dependency, 4 invalid arguments, 5 interrupted).

pub mod account;
pub mod docs;
pub mod lock;
pub mod mail;
pub mod robot;
pub mod session;

use clap::Subcommand;

use crate::client::{finish, Client};
use crate::config::Config;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage sessions.
    #[command(subcommand)]
    Session(session::SessionCmd),
    /// Spawn agents into an existing session.
    Spawn(session::SpawnArgs),
    /// Send a prompt to agents in a session.
    Send(robot::SendArgs),
    /// Interrupt agents in a session.
    Interrupt(robot::InterruptArgs),
    /// Read pane output.
    Output(session::OutputArgs),
    /// Robot mode: the machine-first surface.
    #[command(subcommand)]
    Robot(robot::RobotCmd),
    /// Inter-agent mail.
    #[command(subcommand)]
    Mail(mail::MailCmd),
    /// Resource locks.
    #[command(subcommand)]
    Lock(lock::LockCmd),
    /// Release every lock held by a pane.
    Unlock(lock::UnlockArgs),
    /// Provider accounts and rotation.
    #[command(subcommand)]
    Accounts(account::AccountCmd),
    /// Redaction configuration.
    #[command(subcommand)]
    Redaction(RedactionCmd),
    /// Machine-readable CLI documentation.
    RobotDocs(docs::DocsArgs),
}

#[derive(Debug, Subcommand)]
pub enum RedactionCmd {
    /// Show the current redaction configuration.
    Show,
    /// Update the redaction configuration.
    Set(RedactionSetArgs),
}

#[derive(Debug, clap::Args)]
pub struct RedactionSetArgs {
    /// Mode: off, warn, redact, or block.
    #[arg(long)]
    pub mode: Option<String>,
    /// Comma-separated allowlist regexes (replaces the existing list).
    #[arg(long)]
    pub allowlist: Option<String>,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

/// Dispatch a parsed subcommand. Returns the process exit code.
pub fn run(config: &Config, command: Commands) -> i32 {
    let client = Client::new(config.client_url());
    match command {
        Commands::Session(cmd) => session::run(&client, cmd),
        Commands::Spawn(args) => session::run_spawn(&client, args),
        Commands::Send(args) => robot::run_send(&client, args),
        Commands::Interrupt(args) => robot::run_interrupt(&client, args),
        Commands::Output(args) => session::run_output(&client, args),
        Commands::Robot(cmd) => robot::run(&client, cmd),
        Commands::Mail(cmd) => mail::run(&client, cmd),
        Commands::Lock(cmd) => lock::run(&client, cmd),
        Commands::Unlock(args) => lock::run_unlock(&client, args),
        Commands::Accounts(cmd) => account::run(&client, cmd),
        Commands::Redaction(cmd) => run_redaction(&client, cmd),
        Commands::RobotDocs(args) => docs::run(args),
    }
}

fn run_redaction(client: &Client, cmd: RedactionCmd) -> i32 {
    match cmd {
        RedactionCmd::Show => finish(client.get("/config/redaction")),
        RedactionCmd::Set(args) => {
            if args.schema {
                return crate::client::emit(&docs::schema_for("redaction set"));
            }
            let mut body = serde_json::Map::new();
            if let Some(mode) = args.mode {
                body.insert("mode".to_owned(), serde_json::Value::String(mode));
            }
            if let Some(allowlist) = args.allowlist {
                let list: Vec<serde_json::Value> = allowlist
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| serde_json::Value::String(s.trim().to_owned()))
                    .collect();
                body.insert("allowlist".to_owned(), serde_json::Value::Array(list));
            }
            finish(client.patch("/config/redaction", &serde_json::Value::Object(body)))
        }
    }
}

/// Parse a CLI target selector: `all`, a comma-separated index list, an
/// agent type, or an agent name.
pub fn parse_targets(raw: &str) -> serde_json::Value {
    let trimmed = raw.trim();
    let indices: Option<Vec<usize>> =
        trimmed.split(',').map(|part| part.trim().parse().ok()).collect();
    match indices {
        Some(indices) if !trimmed.is_empty() => serde_json::json!(indices),
        _ => serde_json::json!(trimmed),
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
