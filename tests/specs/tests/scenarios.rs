// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios exercising the whole runtime over the fake
//! multiplexer: spawn, gated delivery, redaction, watchdog, rotation, and
//! staggered-spawn failure handling.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use ntm::bus::Filter;
use ntm::dispatch::{DeliveryStatus, SendOptions};
use ntm::event::EventKind;
use ntm::registry::Targets;
use ntm_specs::{drive_to_waiting, session_with_agents, wait_until, HarnessBuilder};

fn all() -> Targets {
    Targets::Keyword("all".to_owned())
}

// -- Scenario: spawn two agents, send with tracking, collect both acks --------

#[tokio::test]
async fn spawn_send_ack() -> anyhow::Result<()> {
    let harness = HarnessBuilder::new().echo_input().build().await?;
    let panes = session_with_agents(&harness, "s", 2).await?;
    for pane_id in &panes {
        drive_to_waiting(&harness, pane_id).await;
    }

    let opts = SendOptions {
        track: true,
        // The fake echoes submitted input, so the payload itself is the ack.
        ack_token: Some("hello".to_owned()),
        ack_timeout: Some(Duration::from_secs(5)),
        inject_deadline: None,
        allow_secret: false,
    };
    let (send, acks) = harness
        .store
        .dispatcher
        .track("s", &all(), "echo hello", &opts, CancellationToken::new())
        .await
        .map_err(|e| anyhow::anyhow!("track: {e}"))?;

    assert_eq!(send.results.len(), 2);
    assert!(send.results.iter().all(|r| r.status == DeliveryStatus::Delivered));
    assert_eq!(acks.len(), 2);
    for ack in &acks {
        assert_eq!(ack.status, DeliveryStatus::Acked);
        assert!(ack.text.as_deref().is_some_and(|t| t.contains("hello")));
    }
    for pane_id in &panes {
        assert_eq!(harness.fake.sent_keys(pane_id), vec!["echo hello".to_owned()]);
    }
    Ok(())
}

// -- Scenario: safe-injection gating defers until the prompt is bare ----------

#[tokio::test]
async fn safe_injection_gating() -> anyhow::Result<()> {
    let harness = HarnessBuilder::new().build().await?;
    let panes = session_with_agents(&harness, "s", 1).await?;
    let pane_id = &panes[0];

    // A prompt with text after the marker is mid-composition: unsafe.
    harness.fake.set_tail(pane_id, &["\u{276f} typing in progress"]);
    let settled = wait_until(Duration::from_secs(2), || async {
        match harness.store.runtimes.get(pane_id).await {
            Some(runtime) => {
                runtime.read().await.state == ntm::observer::PaneState::UserTyping
            }
            None => false,
        }
    })
    .await;
    assert!(settled, "pane never classified as user_typing");

    let result = harness
        .store
        .dispatcher
        .send("s", &all(), "noop", &SendOptions::default(), CancellationToken::new())
        .await
        .map_err(|e| anyhow::anyhow!("send: {e}"))?;
    assert_eq!(result.results[0].status, DeliveryStatus::Queued);
    assert!(harness.fake.sent_keys(pane_id).is_empty(), "no write while gated");

    // The prompt empties out; after the quiet window the queued send lands.
    drive_to_waiting(&harness, pane_id).await;
    let delivered = wait_until(Duration::from_secs(3), || async {
        harness.fake.sent_keys(pane_id) == vec!["noop".to_owned()]
    })
    .await;
    assert!(delivered, "queued send never delivered");
    // Exactly one write.
    assert_eq!(harness.fake.sent_keys(pane_id).len(), 1);
    Ok(())
}

// -- Scenario: blocked mail send over HTTP ------------------------------------

#[tokio::test]
async fn redaction_blocks_mail_over_http() -> anyhow::Result<()> {
    let harness = HarnessBuilder::new().build().await?;
    let server = TestServer::new(ntm::transport::build_router(Arc::clone(&harness.store)))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    server
        .patch("/api/v1/config/redaction")
        .json(&json!({ "mode": "block" }))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/v1/mail/send")
        .json(&json!({
            "project_key": "proj",
            "from_agent": "alice",
            "to": ["bob"],
            "subject": "keys",
            "body_md": format!("OPENAI_API_KEY=sk-{}", "a".repeat(48)),
        }))
        .await;

    assert_eq!(response.status_code().as_u16(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "redaction_blocked");
    let findings = body["error"]["details"]["findings"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("missing findings"))?;
    assert!(findings.iter().any(|f| f["category"] == "OPENAI_KEY"));

    // Nothing landed in the inbox.
    let inbox: serde_json::Value = server
        .get("/api/v1/mail/inbox?project_key=proj&agent=bob&unread_only=false")
        .await
        .json();
    assert!(inbox["data"]["inbox"].as_array().is_some_and(|a| a.is_empty()));
    Ok(())
}

// -- Scenario: monitor restart keeps identity, no spurious overflow -----------

#[tokio::test]
async fn monitor_restart_preserves_identity() -> anyhow::Result<()> {
    let harness = HarnessBuilder::new().build().await?;
    let panes = session_with_agents(&harness, "s", 1).await?;
    let pane_id = &panes[0];

    // A quiescent subscriber that must never see bus.overflow.
    let mut quiet_sub = harness.store.bus.subscribe(Filter::for_topics(["bus.overflow"]));

    let before = harness.store.supervisor.status().await;
    let started_before = before[0].started_at_ms;

    // Simulate a monitor bounce (unregister + re-register the same pane).
    let pane = harness
        .store
        .registry
        .pane(pane_id)
        .await
        .ok_or_else(|| anyhow::anyhow!("pane missing"))?;
    harness.store.supervisor.unregister(pane_id).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.store.supervisor.register(pane).await;

    let after = harness.store.supervisor.status().await;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].agent_name, before[0].agent_name);
    assert!(after[0].alive);
    assert!(after[0].started_at_ms >= started_before);

    // Session membership survived the bounce.
    assert!(harness.store.registry.pane(pane_id).await.is_some());
    assert_eq!(harness.store.registry.panes_for("s").await.len(), 1);

    // No overflow reached the quiescent subscriber.
    assert!(quiet_sub.try_recv().is_none());
    assert_eq!(quiet_sub.dropped(), 0);
    Ok(())
}

// -- Scenario: rate-limited pane triggers exactly one automatic rotation ------

#[tokio::test]
async fn rate_limit_triggers_single_rotation() -> anyhow::Result<()> {
    let harness = HarnessBuilder::new().build().await?;
    for (name, usage) in [("primary", 60u8), ("backup", 10)] {
        harness
            .store
            .accounts
            .upsert(ntm::account::Account {
                provider: "claude".to_owned(),
                name: name.to_owned(),
                tier: "standard".to_owned(),
                usage_percent: usage,
                limit_reset_at_ms: None,
                rate_limited: false,
            })
            .await;
    }
    let panes = session_with_agents(&harness, "s", 1).await?;
    let pane_id = &panes[0];
    let mut rotation_sub = harness.store.bus.subscribe(Filter::for_topics(["account.rotation"]));

    harness
        .fake
        .set_tail(pane_id, &["\u{25cf} working", "Usage limit reached. Try again in 5 minutes."]);

    let rotated = wait_until(Duration::from_secs(3), || async {
        harness.store.accounts.active().await.get("claude") == Some(&"backup".to_owned())
    })
    .await;
    assert!(rotated, "rotation never happened");

    let event = tokio::time::timeout(Duration::from_secs(1), rotation_sub.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("bus closed"))?;
    match event.kind {
        EventKind::AccountRotation { provider, automatic, prev, next } => {
            assert_eq!(provider, "claude");
            assert!(automatic);
            assert_eq!(prev, "primary");
            assert_eq!(next, "backup");
        }
        other => anyhow::bail!("unexpected event {other:?}"),
    }

    let history = harness.store.accounts.history(10);
    assert_eq!(history.len(), 1);
    assert!(history[0].automatic);
    assert!(history[0].success);

    // Cooldown: a second rate-limited observation does not rotate again.
    harness.fake.set_tail(pane_id, &["\u{276f} "]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness
        .fake
        .set_tail(pane_id, &["Usage limit reached. Try again in 5 minutes."]);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.store.accounts.history(10).len(), 1);
    Ok(())
}

// -- Scenario: staggered spawn with a failing slot rolls forward --------------

#[tokio::test]
async fn staggered_spawn_partial_failure() -> anyhow::Result<()> {
    let harness = HarnessBuilder::new().build().await?;
    harness
        .store
        .spawner
        .create_session("s", "/tmp/proj", "tiled")
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    harness.fake.fail_spawn_at(1);

    let specs: Vec<ntm::spawn::AgentSpec> = (0..4)
        .map(|i| ntm::spawn::AgentSpec {
            agent_type: ntm::provider::AgentType::Claude,
            name: Some(format!("agent-{i}")),
            model: None,
        })
        .collect();
    let stagger = ntm::spawn::StaggerOptions {
        mode: ntm::spawn::StaggerMode::Linear,
        base_delay_ms: 5,
    };
    let report = harness
        .store
        .spawner
        .spawn_agents("s", &specs, &stagger)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    assert_eq!(report.spawned, 3);
    assert_eq!(report.failed_indices, vec![1]);
    assert!(harness.store.registry.session("s").await.is_some());
    assert_eq!(harness.store.registry.panes_for("s").await.len(), 3);
    // Exactly one monitor per live pane, none for the failed slot.
    assert_eq!(harness.store.supervisor.status().await.len(), 3);
    Ok(())
}
