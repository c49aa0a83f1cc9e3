// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness: a full [`Store`] over the scriptable fake multiplexer,
//! with aggressive poll cadences so suites settle in milliseconds.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::mux::FakeMux;
use crate::persist::StateDir;
use crate::run::{build_store, start_workers};
use crate::transport::Store;

/// A built harness. Keeps the temp state dir alive for the test's duration.
pub struct TestHarness {
    pub store: Arc<Store>,
    pub fake: Arc<FakeMux>,
    pub shutdown: CancellationToken,
    _state_dir: tempfile::TempDir,
}

/// Builder over the default test configuration.
pub struct HarnessBuilder {
    config: Config,
    echo_input: bool,
    start_workers: bool,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self { config: test_config(), echo_input: false, start_workers: true }
    }
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the config before the store is built.
    pub fn config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    /// Echo submitted keystrokes into the fake pane tails.
    pub fn echo_input(mut self) -> Self {
        self.echo_input = true;
        self
    }

    /// Skip background workers (watchdog, sweepers).
    pub fn no_workers(mut self) -> Self {
        self.start_workers = false;
        self
    }

    pub async fn build(self) -> anyhow::Result<TestHarness> {
        let tmp = tempfile::tempdir()?;
        let state_dir = StateDir::at(tmp.path())?;
        let fake = if self.echo_input {
            Arc::new(FakeMux::new().with_echo_input())
        } else {
            Arc::new(FakeMux::new())
        };
        let shutdown = CancellationToken::new();
        let store = build_store(
            &self.config,
            state_dir,
            Arc::clone(&fake) as Arc<dyn crate::mux::Multiplexer>,
            shutdown.clone(),
        )?;
        if self.start_workers {
            start_workers(&store).await;
        }
        Ok(TestHarness { store, fake, shutdown, _state_dir: tmp })
    }
}

/// Config tuned for tests: millisecond cadences everywhere.
pub fn test_config() -> Config {
    use clap::Parser;
    let mut config = Config::parse_from(["ntm"]);
    config.poll_active_ms = 10;
    config.poll_idle_ms = 15;
    config.poll_stalled_ms = 50;
    config.stall_threshold_secs = 1;
    config.typing_window_ms = 200;
    config.unknown_hold_secs = 1;
    config.quiet_window_ms = 40;
    config.inject_deadline_secs = 1;
    config.ack_timeout_secs = 2;
    config.watchdog_interval_secs = 1;
    config
}

impl TestHarness {
    /// Settle long enough for two classification windows.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(120)).await;
    }
}

/// Bind the router on an ephemeral port, returning its address.
pub async fn spawn_http_server(
    store: Arc<Store>,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let router = crate::transport::build_router(store);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}
