// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::Config;

fn parse(args: &[&str]) -> Config {
    let mut full = vec!["ntm"];
    full.extend_from_slice(args);
    Config::parse_from(full)
}

#[test]
fn defaults_validate() {
    let config = parse(&[]);
    config.validate().unwrap();
    assert_eq!(config.port, 9123);
    assert_eq!(config.tail_lines, 200);
    assert_eq!(config.poll_active_ms, 250);
    assert_eq!(config.stall_threshold_secs, 60);
    assert_eq!(config.quiet_window_ms, 600);
}

#[test]
fn observer_settings_map_from_flags() {
    let config = parse(&["--poll-active-ms", "100", "--stall-threshold-secs", "30"]);
    let settings = config.observer_settings();
    assert_eq!(settings.poll_active, std::time::Duration::from_millis(100));
    assert_eq!(settings.stall_threshold, std::time::Duration::from_secs(30));
}

#[test]
fn dispatch_settings_map_from_flags() {
    let config = parse(&["--inject-deadline-secs", "5", "--quiet-window-ms", "300"]);
    let settings = config.dispatch_settings();
    assert_eq!(settings.inject_deadline, std::time::Duration::from_secs(5));
    assert_eq!(settings.quiet_window, std::time::Duration::from_millis(300));
}

#[test]
fn zero_tail_lines_rejected() {
    let config = parse(&["--tail-lines", "0"]);
    assert!(config.validate().is_err());
}

#[test]
fn bad_log_format_rejected() {
    let config = parse(&["--log-format", "xml"]);
    assert!(config.validate().is_err());
}

#[test]
fn bad_redaction_mode_rejected() {
    let config = parse(&["--redaction-mode", "sometimes"]);
    assert!(config.validate().is_err());
    let config = parse(&["--redaction-mode", "block"]);
    config.validate().unwrap();
}

#[test]
fn client_url_prefers_explicit_url() {
    let config = parse(&["--url", "http://elsewhere:9999"]);
    assert_eq!(config.client_url(), "http://elsewhere:9999");

    let config = parse(&["--host", "0.0.0.0", "--port", "8000"]);
    assert_eq!(config.client_url(), "http://0.0.0.0:8000");
}
