// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use super::{strip_ansi, tail_lines, FakeMux, MuxError, Multiplexer};

#[test]
fn strip_ansi_removes_csi_sequences() {
    let input = "\u{1b}[31mred\u{1b}[0m plain \u{1b}[1;32mbold\u{1b}[0m";
    assert_eq!(strip_ansi(input), "red plain bold");
}

#[test]
fn strip_ansi_removes_osc_titles() {
    let input = "\u{1b}]0;window title\u{7}visible";
    assert_eq!(strip_ansi(input), "visible");
}

#[test]
fn strip_ansi_passes_plain_text() {
    assert_eq!(strip_ansi("nothing to strip"), "nothing to strip");
}

#[test]
fn tail_lines_keeps_last_n() {
    let text = "a\nb\nc\nd";
    assert_eq!(tail_lines(text, 2), vec!["c".to_owned(), "d".to_owned()]);
    assert_eq!(tail_lines(text, 10).len(), 4);
}

#[tokio::test]
async fn fake_mux_session_and_pane_lifecycle() {
    let fake = FakeMux::new();
    fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    assert!(fake.has_session("dev").await.unwrap());

    let pane = fake.spawn_pane("dev", Path::new("/tmp"), "claude").await.unwrap();
    let panes = fake.list_panes("dev").await.unwrap();
    assert_eq!(panes.len(), 1);
    assert_eq!(panes[0].pane_id, pane);

    fake.kill_pane(&pane).await.unwrap();
    assert!(fake.list_panes("dev").await.unwrap().is_empty());

    fake.kill_session("dev").await.unwrap();
    assert!(!fake.has_session("dev").await.unwrap());
}

#[tokio::test]
async fn fake_mux_capture_respects_line_limit() {
    let fake = FakeMux::new();
    fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    let pane = fake.spawn_pane("dev", Path::new("/tmp"), "").await.unwrap();
    fake.set_tail(&pane, &["one", "two", "three"]);

    let captured = fake.capture_tail(&pane, 2).await.unwrap();
    assert_eq!(captured.lines, vec!["two".to_owned(), "three".to_owned()]);
}

#[tokio::test]
async fn fake_mux_records_sent_keys() {
    let fake = FakeMux::new().with_echo_input();
    fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    let pane = fake.spawn_pane("dev", Path::new("/tmp"), "").await.unwrap();

    fake.send_keys(&pane, "hello", true).await.unwrap();
    assert_eq!(fake.sent_keys(&pane), vec!["hello".to_owned()]);
    // Echo mode surfaces submitted input in the tail.
    let captured = fake.capture_tail(&pane, 10).await.unwrap();
    assert_eq!(captured.lines, vec!["hello".to_owned()]);
}

#[tokio::test]
async fn fake_mux_closed_pane_errors() {
    let fake = FakeMux::new();
    fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    let pane = fake.spawn_pane("dev", Path::new("/tmp"), "").await.unwrap();
    fake.close_pane(&pane);

    assert!(matches!(
        fake.capture_tail(&pane, 10).await,
        Err(MuxError::PaneGone(_))
    ));
    assert!(matches!(fake.send_keys(&pane, "x", false).await, Err(MuxError::PaneGone(_))));
}

#[tokio::test]
async fn fake_mux_scripted_spawn_failure() {
    let fake = FakeMux::new();
    fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    fake.fail_spawn_at(1);

    assert!(fake.spawn_pane("dev", Path::new("/tmp"), "").await.is_ok());
    assert!(matches!(
        fake.spawn_pane("dev", Path::new("/tmp"), "").await,
        Err(MuxError::Unavailable(_))
    ));
    assert!(fake.spawn_pane("dev", Path::new("/tmp"), "").await.is_ok());
}

#[tokio::test]
async fn fake_mux_scripted_capture_failures() {
    let fake = FakeMux::new();
    fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    let pane = fake.spawn_pane("dev", Path::new("/tmp"), "").await.unwrap();
    fake.fail_captures(&pane, 2);

    assert!(fake.capture_tail(&pane, 10).await.is_err());
    assert!(fake.capture_tail(&pane, 10).await.is_err());
    assert!(fake.capture_tail(&pane, 10).await.is_ok());
}
