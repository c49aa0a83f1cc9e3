// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blocking HTTP client used by the CLI commands.
//!
//! Every CLI command mirrors a REST endpoint; this client posts the same
//! payload shapes and translates the response envelope into data + a
//! process exit code.

use serde_json::Value;

use crate::error::ErrorCode;
use crate::transport::Envelope;

/// A CLI-side failure: message for stderr plus the process exit code.
#[derive(Debug)]
pub struct CliError {
    pub message: String,
    pub exit_code: i32,
}

impl CliError {
    fn transport(message: impl Into<String>) -> Self {
        Self { message: message.into(), exit_code: 1 }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

pub struct Client {
    base: String,
    http: reqwest::blocking::Client,
}

impl Client {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self { base: base.trim_end_matches('/').to_owned(), http: reqwest::blocking::Client::new() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base)
    }

    pub fn get(&self, path: &str) -> Result<Value, CliError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .map_err(|e| CliError::transport(format!("request failed: {e}")))?;
        Self::unwrap_envelope(response)
    }

    pub fn post(&self, path: &str, body: &Value) -> Result<Value, CliError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(|e| CliError::transport(format!("request failed: {e}")))?;
        Self::unwrap_envelope(response)
    }

    pub fn patch(&self, path: &str, body: &Value) -> Result<Value, CliError> {
        let response = self
            .http
            .patch(self.url(path))
            .json(body)
            .send()
            .map_err(|e| CliError::transport(format!("request failed: {e}")))?;
        Self::unwrap_envelope(response)
    }

    pub fn delete(&self, path: &str) -> Result<Value, CliError> {
        let response = self
            .http
            .delete(self.url(path))
            .send()
            .map_err(|e| CliError::transport(format!("request failed: {e}")))?;
        Self::unwrap_envelope(response)
    }

    fn unwrap_envelope(response: reqwest::blocking::Response) -> Result<Value, CliError> {
        let envelope: Envelope = response
            .json()
            .map_err(|e| CliError::transport(format!("unparseable response: {e}")))?;
        if envelope.success {
            return Ok(envelope.data.unwrap_or(Value::Null));
        }
        match envelope.error {
            Some(body) => {
                let exit_code = ErrorCode::from_wire(&body.code)
                    .map(|c| c.exit_code())
                    .unwrap_or(1);
                let mut message = format!("{}: {}", body.code, body.message);
                if let Some(details) = body.details {
                    message.push_str(&format!("\n{details}"));
                }
                Err(CliError { message, exit_code })
            }
            None => Err(CliError::transport("server reported failure without an error body")),
        }
    }
}

/// Print a successful payload and return exit code 0.
pub fn emit(value: &Value) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
    0
}

/// Print a CLI error to stderr and return its exit code.
pub fn emit_error(error: &CliError) -> i32 {
    eprintln!("error: {}", error.message);
    error.exit_code
}

/// Collapse a client call into an exit code, printing either side.
pub fn finish(result: Result<Value, CliError>) -> i32 {
    match result {
        Ok(value) => emit(&value),
        Err(error) => emit_error(&error),
    }
}
