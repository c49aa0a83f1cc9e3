// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ntm mail ...`.

use clap::{Args, Subcommand};
use serde_json::json;

use crate::client::{emit, finish, Client};

use super::docs;

#[derive(Debug, Subcommand)]
pub enum MailCmd {
    /// Send mail to one or more agents.
    Send(MailSendArgs),
    /// Read an agent's inbox.
    Inbox(InboxArgs),
    /// Acknowledge (or mark read) an envelope.
    Ack(MailAckArgs),
}

#[derive(Debug, Args)]
pub struct MailSendArgs {
    #[arg(long)]
    pub project_key: String,
    #[arg(long)]
    pub from: String,
    /// Comma-separated recipients.
    #[arg(long)]
    pub to: String,
    #[arg(long)]
    pub cc: Option<String>,
    #[arg(long)]
    pub bcc: Option<String>,
    #[arg(long)]
    pub subject: String,
    #[arg(long)]
    pub body: String,
    /// low, normal, high, or urgent.
    #[arg(long, default_value = "normal")]
    pub importance: String,
    #[arg(long)]
    pub ack_required: bool,
    #[arg(long)]
    pub thread_id: Option<String>,
    /// Send even when redaction would block the body.
    #[arg(long)]
    pub allow_secret: bool,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct InboxArgs {
    #[arg(long)]
    pub project_key: String,
    #[arg(long)]
    pub agent: String,
    #[arg(long)]
    pub unread_only: bool,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

#[derive(Debug, Args)]
pub struct MailAckArgs {
    #[arg(long)]
    pub project_key: String,
    #[arg(long)]
    pub mail_id: String,
    #[arg(long)]
    pub agent: String,
    /// Mark read instead of acknowledging.
    #[arg(long)]
    pub read: bool,
    /// Print the request/response schema and exit.
    #[arg(long)]
    pub schema: bool,
}

fn split_names(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect()
}

pub fn run(client: &Client, cmd: MailCmd) -> i32 {
    match cmd {
        MailCmd::Send(args) => {
            if args.schema {
                return emit(&docs::schema_for("mail send"));
            }
            let body = json!({
                "project_key": args.project_key,
                "from_agent": args.from,
                "to": split_names(&args.to),
                "cc": args.cc.as_deref().map(split_names).unwrap_or_default(),
                "bcc": args.bcc.as_deref().map(split_names).unwrap_or_default(),
                "subject": args.subject,
                "body_md": args.body,
                "importance": args.importance,
                "ack_required": args.ack_required,
                "thread_id": args.thread_id,
                "allow_secret": args.allow_secret,
            });
            finish(client.post("/mail/send", &body))
        }
        MailCmd::Inbox(args) => {
            if args.schema {
                return emit(&docs::schema_for("mail inbox"));
            }
            let path = format!(
                "/mail/inbox?project_key={}&agent={}&unread_only={}",
                args.project_key, args.agent, args.unread_only
            );
            finish(client.get(&path))
        }
        MailCmd::Ack(args) => {
            if args.schema {
                return emit(&docs::schema_for("mail ack"));
            }
            let body = json!({
                "project_key": args.project_key,
                "mail_id": args.mail_id,
                "agent": args.agent,
                "action": if args.read { "read" } else { "ack" },
            });
            finish(client.post("/mail/ack", &body))
        }
    }
}
