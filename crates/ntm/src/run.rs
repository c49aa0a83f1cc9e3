// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server bootstrap: wire the subsystems together, restore persisted state,
//! and serve the REST+WS surface until shutdown.

use std::sync::atomic::AtomicI32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::account::{spawn_rate_limit_watcher, AccountTable};
use crate::bus::Bus;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::lock::LockTable;
use crate::mail::MailStore;
use crate::mux::{Multiplexer, TmuxMux};
use crate::observer::monitor::MonitorDeps;
use crate::observer::RuntimeTable;
use crate::persist::{EventLog, StateDir};
use crate::provider::ProviderSet;
use crate::redact::{RedactionConfig, Redactor};
use crate::registry::Registry;
use crate::spawn::SpawnController;
use crate::supervisor::Supervisor;
use crate::transport::state::WsSettings;
use crate::transport::{build_router, Store};

/// Assemble a [`Store`] over the given multiplexer. Shared between the
/// server entry point and the test harness.
pub fn build_store(
    config: &Config,
    state_dir: StateDir,
    mux: Arc<dyn Multiplexer>,
    shutdown: CancellationToken,
) -> anyhow::Result<Arc<Store>> {
    let providers = ProviderSet::load(&state_dir.providers_config_path())?;

    let mut redaction_config = RedactionConfig::load(&state_dir.redaction_config_path());
    if let Some(ref mode) = config.redaction_mode {
        redaction_config.mode = mode.parse()?;
    }
    let redactor = Arc::new(RwLock::new(Arc::new(
        Redactor::new(&redaction_config)?.with_findings_log(state_dir.findings_path()),
    )));

    let event_log = Arc::new(EventLog::new(state_dir.events_path()));
    let bus = Bus::new(Some(Arc::clone(&event_log)));
    let registry = Arc::new(Registry::new(Some(state_dir.registry_path())));
    let runtimes = RuntimeTable::new();
    let locks = LockTable::new(Some(state_dir.locks_path()), Arc::clone(&bus));
    let mail = MailStore::new(
        state_dir.clone(),
        Arc::clone(&bus),
        Duration::from_secs(config.mail_ack_ttl_secs),
    );
    let accounts = AccountTable::new(Some(state_dir.rotation_history_path()), Arc::clone(&bus));

    let monitor_deps = Arc::new(MonitorDeps {
        mux: Arc::clone(&mux),
        bus: Arc::clone(&bus),
        runtimes: Arc::clone(&runtimes),
        settings: config.observer_settings(),
    });
    let supervisor = Supervisor::new(
        Arc::clone(&monitor_deps),
        providers.clone(),
        Arc::clone(&registry),
        Arc::clone(&locks),
        Some(state_dir.identities_path()),
        Duration::from_secs(config.watchdog_interval_secs),
        shutdown.clone(),
    );
    let spawner = SpawnController::new(
        Arc::clone(&mux),
        Arc::clone(&registry),
        Arc::clone(&supervisor),
        providers,
        Arc::clone(&bus),
        config.max_concurrent_spawns,
        Duration::from_secs(config.spawn_admission_secs),
    );
    let dispatcher = Dispatcher::new(
        Arc::clone(&mux),
        Arc::clone(&registry),
        Arc::clone(&runtimes),
        Arc::clone(&bus),
        Arc::clone(&redactor),
        config.dispatch_settings(),
        Some(state_dir.messages_path()),
        shutdown.clone(),
    );

    Ok(Arc::new(Store {
        state_dir,
        mux,
        registry,
        runtimes,
        bus,
        event_log,
        dispatcher,
        mail,
        locks,
        accounts,
        spawner,
        supervisor,
        redaction_config: RwLock::new(redaction_config),
        redactor,
        ws: WsSettings::default(),
        tail_lines: config.tail_lines,
        started_at: Instant::now(),
        ws_client_count: AtomicI32::new(0),
        shutdown,
    }))
}

/// Restore persisted state and start the background workers.
pub async fn start_workers(store: &Arc<Store>) {
    store.registry.load().await;
    store.locks.load().await;
    store.supervisor.bootstrap();

    // Re-attach monitors to panes that survived a restart.
    for pane in store.registry.all_panes().await {
        store.supervisor.register(pane).await;
    }

    store.supervisor.spawn_watchdog();
    store.locks.spawn_sweeper(Duration::from_secs(10), store.shutdown.clone());
    store.mail.spawn_sweeper(Duration::from_secs(60), store.shutdown.clone());
    spawn_rate_limit_watcher(
        Arc::clone(&store.accounts),
        Arc::clone(&store.bus),
        Arc::clone(&store.registry),
        store.shutdown.clone(),
    );
}

/// Run the orchestrator server until SIGINT/SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let state_dir = match config.state_dir {
        Some(ref dir) => StateDir::at(dir.clone())?,
        None => StateDir::resolve()?,
    };
    let shutdown = CancellationToken::new();
    let mux: Arc<dyn Multiplexer> = match config.tmux_socket {
        Some(ref socket) => Arc::new(TmuxMux::new().with_socket_name(socket.clone())),
        None => Arc::new(TmuxMux::new()),
    };
    let store = build_store(&config, state_dir, mux, shutdown.clone())?;
    start_workers(&store).await;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "ntm listening");

    let router = build_router(Arc::clone(&store));
    let graceful_shutdown = shutdown.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        graceful_shutdown.cancelled().await;
    });

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    server.await?;
    store.bus.close_all();
    Ok(())
}

/// Initialise the tracing subscriber from config.
pub fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    if config.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
