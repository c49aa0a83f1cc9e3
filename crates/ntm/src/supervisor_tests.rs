// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bus::{Bus, Filter};
use crate::event::EventKind;
use crate::lock::LockTable;
use crate::mux::{FakeMux, Multiplexer};
use crate::observer::monitor::MonitorDeps;
use crate::observer::{ObserverSettings, RuntimeTable};
use crate::persist::read_jsonl;
use crate::provider::{AgentType, ProviderSet};
use crate::registry::{Pane, Registry};

use super::{IdentityRecord, Supervisor};

struct Fixture {
    supervisor: Arc<Supervisor>,
    fake: Arc<FakeMux>,
    bus: Arc<Bus>,
    registry: Arc<Registry>,
    identities: std::path::PathBuf,
    _tmp: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let identities = tmp.path().join("identities.jsonl");
    let fake = Arc::new(FakeMux::new());
    let bus = Bus::new(None);
    let registry = Arc::new(Registry::new(None));
    let locks = LockTable::new(None, Arc::clone(&bus));
    let deps = Arc::new(MonitorDeps {
        mux: Arc::clone(&fake) as Arc<dyn Multiplexer>,
        bus: Arc::clone(&bus),
        runtimes: RuntimeTable::new(),
        settings: ObserverSettings {
            poll_active: Duration::from_millis(10),
            poll_idle: Duration::from_millis(10),
            ..ObserverSettings::default()
        },
    });
    let supervisor = Supervisor::new(
        deps,
        ProviderSet::builtin().unwrap(),
        Arc::clone(&registry),
        locks,
        Some(identities.clone()),
        Duration::from_millis(50),
        CancellationToken::new(),
    );
    Fixture { supervisor, fake, bus, registry, identities, _tmp: tmp }
}

async fn seeded_pane(fx: &Fixture) -> Pane {
    fx.fake.create_session("dev", Path::new("/tmp")).await.unwrap();
    let pane_id = fx.fake.spawn_pane("dev", Path::new("/tmp"), "claude").await.unwrap();
    fx.registry.create_session("dev", "/tmp", "tiled").await.unwrap();
    let pane = Pane {
        id: pane_id,
        session_id: "sid".to_owned(),
        session_name: "dev".to_owned(),
        index: 0,
        agent_type: AgentType::Claude,
        agent_name: "alice".to_owned(),
        model: None,
        title: "alice".to_owned(),
        cwd: "/tmp".to_owned(),
        created_at_ms: 0,
    };
    fx.registry.add_pane(pane.clone()).await.unwrap();
    pane
}

#[tokio::test]
async fn register_writes_identity_and_reports_alive() {
    let fx = fixture().await;
    let pane = seeded_pane(&fx).await;
    fx.supervisor.register(pane.clone()).await;

    let records: Vec<IdentityRecord> = read_jsonl(&fx.identities);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pane_id, pane.id);
    assert_eq!(records[0].agent_name, "alice");
    assert_eq!(records[0].pid, std::process::id());

    let status = fx.supervisor.status().await;
    assert_eq!(status.len(), 1);
    assert!(status[0].alive);

    fx.supervisor.unregister(&pane.id).await;
    let records: Vec<IdentityRecord> = read_jsonl(&fx.identities);
    assert!(records.is_empty());
}

#[tokio::test]
async fn reregistering_replaces_the_monitor() {
    let fx = fixture().await;
    let pane = seeded_pane(&fx).await;
    fx.supervisor.register(pane.clone()).await;
    fx.supervisor.register(pane.clone()).await;

    // Exactly one monitor per pane, even after double registration.
    assert_eq!(fx.supervisor.status().await.len(), 1);
}

#[tokio::test]
async fn sweep_cleans_up_after_pane_death() {
    let fx = fixture().await;
    let pane = seeded_pane(&fx).await;
    fx.supervisor.register(pane.clone()).await;
    let mut sub = fx.bus.subscribe(Filter::for_topics(["session.killed"]));

    fx.fake.close_pane(&pane.id);
    // Give the monitor time to observe the death, then sweep.
    tokio::time::sleep(Duration::from_millis(100)).await;
    fx.supervisor.sweep().await;

    assert!(fx.registry.pane(&pane.id).await.is_none());
    assert!(fx.supervisor.status().await.is_empty());
    // Last pane gone: the session is announced dead.
    let event = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, EventKind::SessionKilled { name: "dev".to_owned() });
}

#[tokio::test]
async fn sweep_restarts_an_aborted_monitor() {
    let fx = fixture().await;
    let pane = seeded_pane(&fx).await;
    fx.supervisor.register(pane.clone()).await;
    let before: Vec<IdentityRecord> = read_jsonl(&fx.identities);

    fx.supervisor.abort_monitor(&pane.id).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    fx.supervisor.sweep().await;

    let status = fx.supervisor.status().await;
    assert_eq!(status.len(), 1);
    assert!(status[0].alive);
    assert_eq!(status[0].agent_name, "alice");
    assert_eq!(status[0].restarts, 1);
    // Identity record was rewritten with a fresh start stamp.
    let after: Vec<IdentityRecord> = read_jsonl(&fx.identities);
    assert_eq!(after.len(), 1);
    assert!(after[0].started_at_ms >= before[0].started_at_ms);
}

#[tokio::test]
async fn restart_budget_exhaustion_marks_crashed() {
    let fx = fixture().await;
    let pane = seeded_pane(&fx).await;
    fx.supervisor.register(pane.clone()).await;
    let mut sub = fx.bus.subscribe(Filter::for_topics(["agent.crashed"]));

    // Burn through the budget (5 restarts inside the window), then one more.
    for _ in 0..6 {
        fx.supervisor.abort_monitor(&pane.id).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        fx.supervisor.sweep().await;
    }

    assert!(fx.supervisor.status().await.is_empty());
    let event = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();
    match event.kind {
        EventKind::AgentCrashed { agent_name, .. } => assert_eq!(agent_name, "alice"),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn bootstrap_prunes_dead_pids() {
    let fx = fixture().await;
    crate::persist::rewrite_jsonl(
        &fx.identities,
        &[
            IdentityRecord {
                pane_id: "%dead".to_owned(),
                agent_name: "ghost".to_owned(),
                // An impossible pid: the probe must fail.
                pid: u32::MAX - 1,
                started_at_ms: 0,
            },
            IdentityRecord {
                pane_id: "%live".to_owned(),
                agent_name: "self".to_owned(),
                pid: std::process::id(),
                started_at_ms: 0,
            },
        ],
    )
    .unwrap();

    fx.supervisor.bootstrap();
    let records: Vec<IdentityRecord> = read_jsonl(&fx.identities);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pane_id, "%live");
}
