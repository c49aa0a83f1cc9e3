// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write contention: concurrent HTTP sends against one pane must be
//! serialised by the per-pane write lock, with overflow rejected as busy.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use ntm::test_support::{spawn_http_server, HarnessBuilder};

#[tokio::test]
async fn concurrent_sends_serialize_or_reject() -> anyhow::Result<()> {
    let harness = HarnessBuilder::new().build().await?;
    let (addr, _server) = spawn_http_server(Arc::clone(&harness.store)).await?;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}/api/v1");

    let response = client
        .post(format!("{base}/sessions"))
        .json(&json!({
            "name": "dev",
            "project_path": "/tmp/dev",
            "agents": [{ "agent_type": "claude", "name": "alice" }],
        }))
        .send()
        .await?;
    anyhow::ensure!(response.status().is_success(), "session create failed");

    let pane = harness
        .store
        .registry
        .panes_for("dev")
        .await
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no pane"))?;
    harness.fake.set_tail(&pane.id, &["ready", "", "\u{276f} "]);

    // Wait for the observer to open the injection gate.
    let runtime = harness
        .store
        .runtimes
        .get(&pane.id)
        .await
        .ok_or_else(|| anyhow::anyhow!("no runtime"))?;
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if runtime.read().await.is_safe_to_inject(Duration::from_millis(40)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("pane never settled"))?;

    // Fire 8 parallel sends at the same pane.
    let mut handles = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        let url = format!("{base}/sessions/dev/send");
        handles.push(tokio::spawn(async move {
            let response = client
                .post(&url)
                .json(&json!({ "prompt": format!("msg-{i}"), "targets": "all" }))
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("request failed: {e}"))?;
            let body: serde_json::Value = response.json().await?;
            let status = body["data"]["results"][0]["status"]
                .as_str()
                .unwrap_or("missing")
                .to_owned();
            Ok::<_, anyhow::Error>(status)
        }));
    }

    let mut delivered = 0usize;
    let mut rejected = 0usize;
    for handle in handles {
        match handle.await??.as_str() {
            "delivered" => delivered += 1,
            // Overlapping sends are refused (busy) or deferred (queued);
            // either way they never interleave keystrokes.
            "failed" | "queued" => rejected += 1,
            other => anyhow::bail!("unexpected status {other}"),
        }
    }
    anyhow::ensure!(delivered >= 1, "at least one send must land");
    assert_eq!(delivered + rejected, 8);

    // Give any queued retries a moment, then check payload integrity: every
    // written payload is a whole message, never a fragment.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let sent = harness.fake.sent_keys(&pane.id);
    assert!(!sent.is_empty());
    for payload in &sent {
        assert!(payload.starts_with("msg-"), "fragmented write: {payload:?}");
    }
    Ok(())
}
