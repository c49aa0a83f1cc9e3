// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::ErrorCode;

#[test]
fn wire_strings_round_trip() {
    let codes = [
        ErrorCode::InvalidArgument,
        ErrorCode::SessionNotFound,
        ErrorCode::PaneNotFound,
        ErrorCode::AgentNameConflict,
        ErrorCode::RedactionBlocked,
        ErrorCode::AuthRequired,
        ErrorCode::Forbidden,
        ErrorCode::UnsafeDeadline,
        ErrorCode::Busy,
        ErrorCode::RateLimited,
        ErrorCode::AckTimeout,
        ErrorCode::Cancelled,
        ErrorCode::LockConflict,
        ErrorCode::AccountExhausted,
        ErrorCode::SpawnSemaphoreExhausted,
        ErrorCode::MultiplexerUnavailable,
        ErrorCode::MonitorRestartBudgetExceeded,
        ErrorCode::BusOverflow,
        ErrorCode::Internal,
    ];
    for code in codes {
        assert_eq!(ErrorCode::from_wire(code.as_str()), Some(code));
    }
}

#[test]
fn unknown_wire_string_is_none() {
    assert_eq!(ErrorCode::from_wire("no_such_code"), None);
}

#[test]
fn exit_codes_stay_in_cli_range() {
    for code in [
        ErrorCode::InvalidArgument,
        ErrorCode::Busy,
        ErrorCode::MultiplexerUnavailable,
        ErrorCode::Cancelled,
        ErrorCode::Internal,
    ] {
        let exit = code.exit_code();
        assert!((1..=5).contains(&exit), "{code} mapped to {exit}");
    }
}

#[test]
fn conflict_codes_exit_2() {
    assert_eq!(ErrorCode::Busy.exit_code(), 2);
    assert_eq!(ErrorCode::LockConflict.exit_code(), 2);
    assert_eq!(ErrorCode::AgentNameConflict.exit_code(), 2);
}

#[test]
fn serde_uses_snake_case() {
    let json = serde_json::to_string(&ErrorCode::UnsafeDeadline).unwrap();
    assert_eq!(json, "\"unsafe_deadline\"");
}
