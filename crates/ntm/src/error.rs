// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes shared across the HTTP surface, WebSocket frames,
/// and CLI stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Input
    InvalidArgument,
    SessionNotFound,
    PaneNotFound,
    AgentNameConflict,
    // Policy
    RedactionBlocked,
    AuthRequired,
    Forbidden,
    // Liveness
    UnsafeDeadline,
    Busy,
    RateLimited,
    AckTimeout,
    Cancelled,
    // Resource
    LockConflict,
    AccountExhausted,
    SpawnSemaphoreExhausted,
    // Internal
    MultiplexerUnavailable,
    MonitorRestartBudgetExceeded,
    BusOverflow,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidArgument => 400,
            Self::SessionNotFound | Self::PaneNotFound => 404,
            Self::AgentNameConflict => 409,
            Self::RedactionBlocked => 400,
            Self::AuthRequired => 401,
            Self::Forbidden => 403,
            Self::UnsafeDeadline => 409,
            Self::Busy => 409,
            Self::RateLimited => 429,
            Self::AckTimeout => 408,
            Self::Cancelled => 499,
            Self::LockConflict => 409,
            Self::AccountExhausted => 409,
            Self::SpawnSemaphoreExhausted => 429,
            Self::MultiplexerUnavailable => 503,
            Self::MonitorRestartBudgetExceeded => 500,
            Self::BusOverflow => 500,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::SessionNotFound => "session_not_found",
            Self::PaneNotFound => "pane_not_found",
            Self::AgentNameConflict => "agent_name_conflict",
            Self::RedactionBlocked => "redaction_blocked",
            Self::AuthRequired => "auth_required",
            Self::Forbidden => "forbidden",
            Self::UnsafeDeadline => "unsafe_deadline",
            Self::Busy => "busy",
            Self::RateLimited => "rate_limited",
            Self::AckTimeout => "ack_timeout",
            Self::Cancelled => "cancelled",
            Self::LockConflict => "lock_conflict",
            Self::AccountExhausted => "account_exhausted",
            Self::SpawnSemaphoreExhausted => "spawn_semaphore_exhausted",
            Self::MultiplexerUnavailable => "multiplexer_unavailable",
            Self::MonitorRestartBudgetExceeded => "monitor_restart_budget_exceeded",
            Self::BusOverflow => "bus_overflow",
            Self::Internal => "internal",
        }
    }

    /// CLI-wide process exit code for this error.
    ///
    /// `0` success, `1` generic/partial failure, `2` conflict, `3` missing
    /// dependency, `4` invalid arguments, `5` interrupted state.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument => 4,
            Self::AgentNameConflict | Self::Busy | Self::LockConflict => 2,
            Self::MultiplexerUnavailable => 3,
            Self::Cancelled => 5,
            _ => 1,
        }
    }

    /// Parse a wire string back into an error code (CLI side).
    pub fn from_wire(s: &str) -> Option<Self> {
        let code = match s {
            "invalid_argument" => Self::InvalidArgument,
            "session_not_found" => Self::SessionNotFound,
            "pane_not_found" => Self::PaneNotFound,
            "agent_name_conflict" => Self::AgentNameConflict,
            "redaction_blocked" => Self::RedactionBlocked,
            "auth_required" => Self::AuthRequired,
            "forbidden" => Self::Forbidden,
            "unsafe_deadline" => Self::UnsafeDeadline,
            "busy" => Self::Busy,
            "rate_limited" => Self::RateLimited,
            "ack_timeout" => Self::AckTimeout,
            "cancelled" => Self::Cancelled,
            "lock_conflict" => Self::LockConflict,
            "account_exhausted" => Self::AccountExhausted,
            "spawn_semaphore_exhausted" => Self::SpawnSemaphoreExhausted,
            "multiplexer_unavailable" => Self::MultiplexerUnavailable,
            "monitor_restart_budget_exceeded" => Self::MonitorRestartBudgetExceeded,
            "bus_overflow" => Self::BusOverflow,
            "internal" => Self::Internal,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error code paired with a human-readable message and optional
/// structured details (e.g. redaction findings, current pane state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
