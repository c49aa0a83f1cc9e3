// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness for the end-to-end scenario suite.
//!
//! Builds a full orchestrator over the scriptable fake multiplexer and
//! provides settle/wait helpers so scenarios read as timelines.

use std::future::Future;
use std::time::Duration;

pub use ntm::test_support::{HarnessBuilder, TestHarness};

/// Poll `predicate` until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
}

/// Script an idle prompt into the pane and wait until the observer reports
/// it safe for injection.
pub async fn drive_to_waiting(harness: &TestHarness, pane_id: &str) {
    harness.fake.set_tail(pane_id, &["agent ready", "", "\u{276f} "]);
    let settled = wait_until(Duration::from_secs(3), || async {
        match harness.store.runtimes.get(pane_id).await {
            Some(runtime) => runtime.read().await.is_safe_to_inject(Duration::from_millis(40)),
            None => false,
        }
    })
    .await;
    assert!(settled, "pane {pane_id} never became safe for injection");
}

/// Build a session with `count` claude agents and return the pane ids.
pub async fn session_with_agents(
    harness: &TestHarness,
    name: &str,
    count: usize,
) -> anyhow::Result<Vec<String>> {
    harness
        .store
        .spawner
        .create_session(name, "/tmp/proj", "tiled")
        .await
        .map_err(|e| anyhow::anyhow!("create_session: {e}"))?;
    let specs: Vec<ntm::spawn::AgentSpec> = (0..count)
        .map(|i| ntm::spawn::AgentSpec {
            agent_type: ntm::provider::AgentType::Claude,
            name: Some(format!("{name}-agent-{i}")),
            model: None,
        })
        .collect();
    let stagger = ntm::spawn::StaggerOptions { base_delay_ms: 0, ..Default::default() };
    let report = harness
        .store
        .spawner
        .spawn_agents(name, &specs, &stagger)
        .await
        .map_err(|e| anyhow::anyhow!("spawn_agents: {e}"))?;
    anyhow::ensure!(report.spawned == count, "spawned {} of {count}", report.spawned);
    Ok(report.panes.into_iter().map(|p| p.id).collect())
}
