// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{AgentSpec, SpawnController, StaggerMode, StaggerOptions};
use crate::bus::{Bus, Filter};
use crate::event::EventKind;
use crate::lock::LockTable;
use crate::mux::{FakeMux, Multiplexer};
use crate::observer::monitor::MonitorDeps;
use crate::observer::{ObserverSettings, RuntimeTable};
use crate::provider::{AgentType, ProviderSet};
use crate::registry::Registry;
use crate::supervisor::Supervisor;

struct Fixture {
    controller: Arc<SpawnController>,
    fake: Arc<FakeMux>,
    bus: Arc<Bus>,
    registry: Arc<Registry>,
    supervisor: Arc<Supervisor>,
}

fn fixture() -> Fixture {
    let fake = Arc::new(FakeMux::new());
    let bus = Bus::new(None);
    let registry = Arc::new(Registry::new(None));
    let locks = LockTable::new(None, Arc::clone(&bus));
    let deps = Arc::new(MonitorDeps {
        mux: Arc::clone(&fake) as Arc<dyn Multiplexer>,
        bus: Arc::clone(&bus),
        runtimes: RuntimeTable::new(),
        settings: ObserverSettings::default(),
    });
    let supervisor = Supervisor::new(
        deps,
        ProviderSet::builtin().unwrap(),
        Arc::clone(&registry),
        locks,
        None,
        Duration::from_secs(30),
        CancellationToken::new(),
    );
    let controller = SpawnController::new(
        Arc::clone(&fake) as Arc<dyn Multiplexer>,
        Arc::clone(&registry),
        Arc::clone(&supervisor),
        ProviderSet::builtin().unwrap(),
        Arc::clone(&bus),
        4,
        Duration::from_secs(5),
    );
    Fixture { controller, fake, bus, registry, supervisor }
}

fn specs(count: usize) -> Vec<AgentSpec> {
    (0..count)
        .map(|i| AgentSpec {
            agent_type: AgentType::Claude,
            name: Some(format!("agent-{i}")),
            model: None,
        })
        .collect()
}

fn immediate() -> StaggerOptions {
    StaggerOptions { mode: StaggerMode::Fixed, base_delay_ms: 0 }
}

#[test]
fn stagger_delay_shapes() {
    let fixed = StaggerOptions { mode: StaggerMode::Fixed, base_delay_ms: 100 };
    assert_eq!(fixed.delay_before(0), Duration::ZERO);
    assert_eq!(fixed.delay_before(3), Duration::from_millis(100));

    let linear = StaggerOptions { mode: StaggerMode::Linear, base_delay_ms: 100 };
    assert_eq!(linear.delay_before(3), Duration::from_millis(300));

    let exponential = StaggerOptions { mode: StaggerMode::Exponential, base_delay_ms: 100 };
    assert_eq!(exponential.delay_before(1), Duration::from_millis(100));
    assert_eq!(exponential.delay_before(3), Duration::from_millis(400));

    let jittered = StaggerOptions { mode: StaggerMode::Jittered, base_delay_ms: 100 };
    let delay = jittered.delay_before(2);
    assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(200));
}

#[tokio::test]
async fn create_session_provisions_and_announces() {
    let fx = fixture();
    let mut sub = fx.bus.subscribe(Filter::for_topics(["session.created"]));

    fx.controller.create_session("dev", "/tmp/dev", "tiled").await.unwrap();
    assert!(fx.fake.has_session("dev").await.unwrap());
    assert!(fx.registry.session("dev").await.is_some());

    let event = sub.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::SessionCreated { name: "dev".to_owned() });
}

#[tokio::test]
async fn spawn_registers_panes_and_monitors() {
    let fx = fixture();
    fx.controller.create_session("dev", "/tmp/dev", "tiled").await.unwrap();

    let report = fx.controller.spawn_agents("dev", &specs(3), &immediate()).await.unwrap();
    assert_eq!(report.spawned, 3);
    assert!(report.failed_indices.is_empty());
    assert_eq!(fx.registry.panes_for("dev").await.len(), 3);
    assert_eq!(fx.supervisor.status().await.len(), 3);
    // Pane indices are assigned in spawn order.
    let indices: Vec<usize> = report.panes.iter().map(|p| p.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn partial_failure_rolls_forward() {
    let fx = fixture();
    fx.controller.create_session("dev", "/tmp/dev", "tiled").await.unwrap();
    // The 2nd spawn (index 1) fails at the multiplexer.
    fx.fake.fail_spawn_at(1);

    let report = fx.controller.spawn_agents("dev", &specs(4), &immediate()).await.unwrap();
    assert_eq!(report.spawned, 3);
    assert_eq!(report.failed_indices, vec![1]);
    // Session is intact with three live panes and no orphan monitor.
    assert_eq!(fx.registry.panes_for("dev").await.len(), 3);
    assert_eq!(fx.supervisor.status().await.len(), 3);
}

#[tokio::test]
async fn agent_name_conflict_tears_down_the_pane() {
    let fx = fixture();
    fx.controller.create_session("dev", "/tmp/dev", "tiled").await.unwrap();
    let spec = vec![AgentSpec {
        agent_type: AgentType::Claude,
        name: Some("dup".to_owned()),
        model: None,
    }];
    fx.controller.spawn_agents("dev", &spec, &immediate()).await.unwrap();

    let report = fx.controller.spawn_agents("dev", &spec, &immediate()).await.unwrap();
    assert_eq!(report.spawned, 0);
    assert_eq!(report.failed_indices, vec![0]);
    // The conflicting pane was killed in the multiplexer too.
    assert_eq!(fx.fake.list_panes("dev").await.unwrap().len(), 1);
}

#[tokio::test]
async fn spawn_into_missing_session_errors() {
    let fx = fixture();
    let err = fx.controller.spawn_agents("ghost", &specs(1), &immediate()).await.unwrap_err();
    assert_eq!(err.code, crate::error::ErrorCode::SessionNotFound);
}

#[tokio::test]
async fn kill_session_unregisters_monitors() {
    let fx = fixture();
    fx.controller.create_session("dev", "/tmp/dev", "tiled").await.unwrap();
    fx.controller.spawn_agents("dev", &specs(2), &immediate()).await.unwrap();

    let mut sub = fx.bus.subscribe(Filter::for_topics(["session.killed"]));
    fx.controller.kill_session("dev").await.unwrap();

    assert!(fx.registry.session("dev").await.is_none());
    assert!(fx.supervisor.status().await.is_empty());
    assert!(!fx.fake.has_session("dev").await.unwrap());
    let event = sub.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::SessionKilled { name: "dev".to_owned() });
}

#[tokio::test]
async fn agent_spawned_events_fire_per_pane() {
    let fx = fixture();
    let mut sub = fx.bus.subscribe(Filter::for_topics(["agent.spawned"]));
    fx.controller.create_session("dev", "/tmp/dev", "tiled").await.unwrap();
    fx.controller.spawn_agents("dev", &specs(2), &immediate()).await.unwrap();

    for _ in 0..2 {
        let event = sub.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::AgentSpawned { .. }));
    }
}
