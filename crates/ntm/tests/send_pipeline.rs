// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-level send pipeline: session creation, observer settling, gated
//! delivery, and concurrent sends against one pane.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::json;

use ntm::test_support::HarnessBuilder;
use ntm::transport::build_router;

async fn wait_for<F>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    false
}

#[tokio::test]
async fn http_send_delivers_to_settled_pane() -> anyhow::Result<()> {
    let harness = HarnessBuilder::new().build().await?;
    let server = TestServer::new(build_router(Arc::clone(&harness.store)))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    server
        .post("/api/v1/sessions")
        .json(&json!({
            "name": "dev",
            "project_path": "/tmp/dev",
            "agents": [{ "agent_type": "claude", "name": "alice" }],
        }))
        .await
        .assert_status_ok();

    let pane = harness.store.registry.panes_for("dev").await.remove(0);
    harness.fake.set_tail(&pane.id, &["ready", "", "\u{276f} "]);

    // Wait for the observer to classify the pane as waiting.
    let runtime = harness.store.runtimes.get(&pane.id).await.ok_or_else(|| {
        anyhow::anyhow!("runtime missing for {}", pane.id)
    })?;
    let settled = {
        let runtime = Arc::clone(&runtime);
        tokio::time::timeout(Duration::from_secs(3), async move {
            loop {
                if runtime.read().await.is_safe_to_inject(Duration::from_millis(40)) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(15)).await;
            }
        })
        .await
    };
    assert!(settled.is_ok(), "pane never settled");

    let response = server
        .post("/api/v1/sessions/dev/send")
        .json(&json!({ "prompt": "cargo test", "targets": "all" }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["delivered"].as_array().map(|a| a.len()), Some(1));

    let fake = Arc::clone(&harness.fake);
    let pane_id = pane.id.clone();
    let delivered =
        wait_for(Duration::from_secs(1), move || !fake.sent_keys(&pane_id).is_empty()).await;
    assert!(delivered);
    assert_eq!(harness.fake.sent_keys(&pane.id), vec!["cargo test".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn pane_output_served_from_observer_snapshot() -> anyhow::Result<()> {
    let harness = HarnessBuilder::new().build().await?;
    let server = TestServer::new(build_router(Arc::clone(&harness.store)))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    server
        .post("/api/v1/sessions")
        .json(&json!({
            "name": "dev",
            "project_path": "/tmp/dev",
            "agents": [{ "agent_type": "claude", "name": "alice" }],
        }))
        .await
        .assert_status_ok();
    let pane = harness.store.registry.panes_for("dev").await.remove(0);
    harness.fake.set_tail(&pane.id, &["line one", "line two", "\u{276f} "]);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let body: serde_json::Value =
        server.get("/api/v1/sessions/dev/panes/0/output?lines=2").await.json();
    let lines = body["data"]["lines"].as_array().ok_or_else(|| anyhow::anyhow!("no lines"))?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "line two");
    Ok(())
}
