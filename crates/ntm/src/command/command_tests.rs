// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use serde_json::json;

use super::session::parse_agents;
use super::{parse_targets, Commands};

#[derive(Parser)]
struct TestCli {
    #[command(subcommand)]
    command: Commands,
}

#[test]
fn parse_targets_shapes() {
    assert_eq!(parse_targets("all"), json!("all"));
    assert_eq!(parse_targets("0,2"), json!([0, 2]));
    assert_eq!(parse_targets(" 1 "), json!([1]));
    assert_eq!(parse_targets("claude"), json!("claude"));
    assert_eq!(parse_targets("my-agent"), json!("my-agent"));
}

#[test]
fn parse_agents_expands_counts() {
    let specs = parse_agents("claude:2,gemini").unwrap();
    assert_eq!(specs.len(), 3);
    assert_eq!(specs[0]["agent_type"], "claude");
    assert_eq!(specs[2]["agent_type"], "gemini");

    assert!(parse_agents("").is_err());
    assert!(parse_agents("claude:lots").is_err());
}

#[test]
fn send_command_parses() {
    let cli = TestCli::parse_from([
        "ntm", "send", "dev", "run tests", "--targets", "0,1", "--track", "--ack-timeout", "15",
    ]);
    match cli.command {
        Commands::Send(args) => {
            assert_eq!(args.session, "dev");
            assert_eq!(args.prompt, "run tests");
            assert_eq!(args.targets, "0,1");
            assert!(args.track);
            assert_eq!(args.ack_timeout, Some(15));
        }
        other => panic!("parsed wrong command: {other:?}"),
    }
}

#[test]
fn session_create_parses_agents() {
    let cli = TestCli::parse_from([
        "ntm", "session", "create", "dev", "--project-path", "/tmp", "--agents", "claude:2",
        "--stagger", "exponential",
    ]);
    match cli.command {
        Commands::Session(super::session::SessionCmd::Create(args)) => {
            assert_eq!(args.name, "dev");
            assert_eq!(args.agents.as_deref(), Some("claude:2"));
            assert_eq!(args.stagger.as_deref(), Some("exponential"));
        }
        other => panic!("parsed wrong command: {other:?}"),
    }
}

#[test]
fn robot_docs_topics_parse() {
    for topic in ["quickstart", "commands", "examples", "exit-codes", "formats", "schemas", "all"] {
        let cli = TestCli::parse_from(["ntm", "robot-docs", topic]);
        assert!(matches!(cli.command, Commands::RobotDocs(_)), "topic {topic}");
    }
}

#[test]
fn unlock_requires_all_flag() {
    let cli = TestCli::parse_from(["ntm", "unlock", "--pane", "%0"]);
    match cli.command {
        Commands::Unlock(args) => assert!(!args.all),
        other => panic!("parsed wrong command: {other:?}"),
    }
}

#[test]
fn every_schema_command_has_a_real_schema() {
    for command in super::docs::SCHEMA_COMMANDS {
        let schema = super::docs::schema_for(command);
        assert!(schema.get("error").is_none(), "no schema for {command}");
        assert!(schema["request"].is_object(), "{command} missing request shape");
        assert!(schema["response"].is_object(), "{command} missing response shape");
    }
    let unknown = super::docs::schema_for("nope");
    assert!(unknown["error"].is_string());
}

#[test]
fn schema_flag_parses_on_every_args_struct() {
    let cases: &[&[&str]] = &[
        &["ntm", "session", "create", "dev", "--schema"],
        &["ntm", "spawn", "dev", "--agents", "claude", "--schema"],
        &["ntm", "send", "dev", "prompt", "--schema"],
        &["ntm", "interrupt", "dev", "--schema"],
        &["ntm", "output", "dev", "--schema"],
        &["ntm", "robot", "send", "dev", "msg", "--schema"],
        &["ntm", "robot", "ack", "dev", "--token", "t", "--schema"],
        &["ntm", "mail", "send", "--project-key", "p", "--from", "a", "--to", "b",
          "--subject", "s", "--body", "m", "--schema"],
        &["ntm", "mail", "inbox", "--project-key", "p", "--agent", "a", "--schema"],
        &["ntm", "mail", "ack", "--project-key", "p", "--mail-id", "m", "--agent", "a", "--schema"],
        &["ntm", "lock", "acquire", "r", "--pane", "%0", "--schema"],
        &["ntm", "lock", "release", "r", "--pane", "%0", "--schema"],
        &["ntm", "unlock", "--all", "--pane", "%0", "--schema"],
        &["ntm", "accounts", "register", "--provider", "claude", "--name", "a", "--schema"],
        &["ntm", "accounts", "rotate", "--provider", "claude", "--account", "b", "--schema"],
        &["ntm", "accounts", "auto-rotate", "--schema"],
        &["ntm", "accounts", "history", "--schema"],
        &["ntm", "redaction", "set", "--schema"],
    ];
    for case in cases {
        assert!(TestCli::try_parse_from(*case).is_ok(), "failed to parse {case:?}");
    }
}
