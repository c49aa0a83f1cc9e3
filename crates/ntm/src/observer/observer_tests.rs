// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::bus::{Bus, Filter};
use crate::event::EventKind;
use crate::mux::{FakeMux, Multiplexer};
use crate::provider::{AgentType, ProviderSet};
use crate::registry::Pane;

use super::monitor::{run_monitor, MonitorDeps, MonitorExit};
use super::{tail_hash, ObserverSettings, PaneRuntime, PaneState, RuntimeTable};

fn fast_settings() -> ObserverSettings {
    ObserverSettings {
        tail_lines: 50,
        poll_active: Duration::from_millis(10),
        poll_idle: Duration::from_millis(10),
        poll_stalled: Duration::from_millis(20),
        stall_threshold: Duration::from_millis(500),
        typing_window: Duration::from_millis(200),
        unknown_hold: Duration::from_millis(150),
        quiet_window: Duration::from_millis(30),
    }
}

fn test_pane(pane_id: &str) -> Pane {
    Pane {
        id: pane_id.to_owned(),
        session_id: "sid".to_owned(),
        session_name: "dev".to_owned(),
        index: 0,
        agent_type: AgentType::Claude,
        agent_name: "alice".to_owned(),
        model: None,
        title: "alice".to_owned(),
        cwd: "/tmp".to_owned(),
        created_at_ms: 0,
    }
}

async fn start_monitor(
    fake: &Arc<FakeMux>,
    pane_id: &str,
) -> (Arc<MonitorDeps>, CancellationToken, tokio::task::JoinHandle<MonitorExit>) {
    let deps = Arc::new(MonitorDeps {
        mux: Arc::clone(fake) as Arc<dyn Multiplexer>,
        bus: Bus::new(None),
        runtimes: RuntimeTable::new(),
        settings: fast_settings(),
    });
    let set = ProviderSet::builtin().unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_monitor(
        test_pane(pane_id),
        set.get(AgentType::Claude),
        Arc::clone(&deps),
        cancel.clone(),
    ));
    (deps, cancel, handle)
}

#[test]
fn tail_hash_is_order_sensitive() {
    let a = vec!["one".to_owned(), "two".to_owned()];
    let b = vec!["two".to_owned(), "one".to_owned()];
    assert_ne!(tail_hash(&a), tail_hash(&b));
    assert_eq!(tail_hash(&a), tail_hash(&a));
}

#[test]
fn safety_predicate_requires_waiting_and_quiet() {
    let mut runtime = PaneRuntime::new("%0", 1000);
    let quiet = Duration::from_millis(600);

    // Unknown state: never safe.
    assert!(!runtime.is_safe_to_inject(quiet));

    runtime.state = PaneState::Waiting;
    runtime.prompt_empty = true;
    runtime.last_change = Some(Instant::now() - Duration::from_secs(5));
    assert!(runtime.is_safe_to_inject(quiet));

    // A fresh scrollback change closes the gate.
    runtime.last_change = Some(Instant::now());
    assert!(!runtime.is_safe_to_inject(quiet));

    // Typed text after the prompt closes the gate.
    runtime.last_change = Some(Instant::now() - Duration::from_secs(5));
    runtime.prompt_empty = false;
    assert!(!runtime.is_safe_to_inject(quiet));
}

#[tokio::test]
async fn monitor_settles_on_waiting_prompt() {
    let fake = Arc::new(FakeMux::new());
    fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    let pane_id = fake.spawn_pane("dev", Path::new("/tmp"), "claude").await.unwrap();
    fake.set_tail(&pane_id, &["Claude ready", "", "\u{276f} "]);

    let (deps, cancel, handle) = start_monitor(&fake, &pane_id).await;
    let mut sub = deps.bus.subscribe(Filter::for_topics(["pane.state"]));

    // Two agreeing classifications produce one transition to waiting.
    let event = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await.unwrap().unwrap();
    match event.kind {
        EventKind::PaneState { next, .. } => assert_eq!(next, PaneState::Waiting),
        other => panic!("unexpected event {other:?}"),
    }

    let runtime = deps.runtimes.get(&pane_id).await.unwrap();
    assert_eq!(runtime.read().await.state, PaneState::Waiting);

    cancel.cancel();
    assert_eq!(handle.await.unwrap(), MonitorExit::Cancelled);
}

#[tokio::test]
async fn monitor_reports_pane_gone_as_crashed() {
    let fake = Arc::new(FakeMux::new());
    fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    let pane_id = fake.spawn_pane("dev", Path::new("/tmp"), "claude").await.unwrap();

    let (deps, _cancel, handle) = start_monitor(&fake, &pane_id).await;
    let mut sub = deps.bus.subscribe(Filter::for_topics(["pane.state"]));
    fake.close_pane(&pane_id);

    let exit = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    assert_eq!(exit, MonitorExit::PaneGone);

    let event = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();
    match event.kind {
        EventKind::PaneState { next, reason, .. } => {
            assert_eq!(next, PaneState::Crashed);
            assert_eq!(reason, "pane_closed");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn monitor_emits_read_failed_after_five_failures() {
    let fake = Arc::new(FakeMux::new());
    fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    let pane_id = fake.spawn_pane("dev", Path::new("/tmp"), "claude").await.unwrap();
    fake.fail_captures(&pane_id, 6);

    let (deps, cancel, _handle) = start_monitor(&fake, &pane_id).await;
    let mut sub = deps.bus.subscribe(Filter::for_topics(["pane.read_failed"]));

    let event = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await.unwrap().unwrap();
    match event.kind {
        EventKind::PaneReadFailed { consecutive } => assert_eq!(consecutive, 5),
        other => panic!("unexpected event {other:?}"),
    }
    cancel.cancel();
}

#[tokio::test]
async fn monitor_publishes_output_on_change() {
    let fake = Arc::new(FakeMux::new());
    fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    let pane_id = fake.spawn_pane("dev", Path::new("/tmp"), "claude").await.unwrap();
    fake.set_tail(&pane_id, &["\u{25cf} starting work"]);

    let (deps, cancel, _handle) = start_monitor(&fake, &pane_id).await;
    let mut sub = deps.bus.subscribe(Filter::for_topics(["pane.output"]));

    let event = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await.unwrap().unwrap();
    match event.kind {
        EventKind::PaneOutput { lines } => {
            assert!(lines.iter().any(|l| l.contains("starting work")));
        }
        other => panic!("unexpected event {other:?}"),
    }
    cancel.cancel();
}

#[tokio::test]
async fn runtime_table_snapshot_lists_registered_panes() {
    let table = RuntimeTable::new();
    table.register("%1", 1000).await;
    table.register("%0", 1000).await;

    let snapshots = table.snapshot_all().await;
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].pane_id, "%0");

    table.remove("%0").await;
    assert_eq!(table.snapshot_all().await.len(), 1);
}
