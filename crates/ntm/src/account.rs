// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider account table and rotation.
//!
//! Rotation is advisory: it changes which account future spawns and sends
//! use, never running panes. Automatic rotation fires when a pane enters
//! `rate_limited`, subject to a per-provider cooldown.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bus::{Bus, Filter};
use crate::error::{ApiError, ErrorCode};
use crate::event::{now_epoch_ms, EventKind};
use crate::persist::{append_jsonl, read_jsonl};

/// One provider account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub provider: String,
    pub name: String,
    pub tier: String,
    pub usage_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_reset_at_ms: Option<u64>,
    pub rate_limited: bool,
}

/// Rotation policy, PATCHable over the API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RotationPolicy {
    pub auto_rotate: bool,
    pub on_rate_limit: bool,
    /// Minimum time between rotations per provider.
    #[serde(with = "secs")]
    pub cooldown: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self { auto_rotate: true, on_rate_limit: true, cooldown: Duration::from_secs(300) }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Append-only record of one rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationEvent {
    pub ts_ms: u64,
    pub provider: String,
    pub prev: String,
    pub next: String,
    pub reason: String,
    pub automatic: bool,
    pub success: bool,
}

struct AccountsInner {
    accounts: IndexMap<String, Account>,
    /// Active account name per provider.
    active: HashMap<String, String>,
    policy: RotationPolicy,
    last_rotation: HashMap<String, Instant>,
}

fn key(provider: &str, name: &str) -> String {
    format!("{provider}/{name}")
}

/// The account table. Rotations are rare, so a single mutex suffices.
pub struct AccountTable {
    inner: Mutex<AccountsInner>,
    history_path: Option<PathBuf>,
    bus: Arc<Bus>,
}

impl AccountTable {
    pub fn new(history_path: Option<PathBuf>, bus: Arc<Bus>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(AccountsInner {
                accounts: IndexMap::new(),
                active: HashMap::new(),
                policy: RotationPolicy::default(),
                last_rotation: HashMap::new(),
            }),
            history_path,
            bus,
        })
    }

    /// Register (or update) an account. The first account registered for a
    /// provider becomes active.
    pub async fn upsert(&self, account: Account) {
        let mut inner = self.inner.lock().await;
        let provider = account.provider.clone();
        let name = account.name.clone();
        inner.accounts.insert(key(&provider, &name), account);
        inner.active.entry(provider).or_insert(name);
    }

    pub async fn list(&self) -> Vec<Account> {
        self.inner.lock().await.accounts.values().cloned().collect()
    }

    /// Active account name per provider.
    pub async fn active(&self) -> HashMap<String, String> {
        self.inner.lock().await.active.clone()
    }

    pub async fn policy(&self) -> RotationPolicy {
        self.inner.lock().await.policy
    }

    pub async fn set_policy(&self, policy: RotationPolicy) {
        self.inner.lock().await.policy = policy;
    }

    /// Update usage telemetry for one account.
    pub async fn set_usage(&self, provider: &str, name: &str, usage_percent: u8, rate_limited: bool) {
        let mut inner = self.inner.lock().await;
        if let Some(account) = inner.accounts.get_mut(&key(provider, name)) {
            account.usage_percent = usage_percent.min(100);
            account.rate_limited = rate_limited;
        }
    }

    /// Quota summary per provider: `(active, usage_percent, accounts)`.
    pub async fn quota(&self) -> Vec<QuotaSummary> {
        let inner = self.inner.lock().await;
        let mut providers: Vec<String> = inner
            .accounts
            .values()
            .map(|a| a.provider.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        providers.sort();
        providers
            .into_iter()
            .map(|provider| {
                let accounts: Vec<Account> = inner
                    .accounts
                    .values()
                    .filter(|a| a.provider == provider)
                    .cloned()
                    .collect();
                let active = inner.active.get(&provider).cloned().unwrap_or_default();
                let active_usage = accounts
                    .iter()
                    .find(|a| a.name == active)
                    .map(|a| a.usage_percent)
                    .unwrap_or(0);
                QuotaSummary { provider, active, active_usage, accounts }
            })
            .collect()
    }

    /// Rotation history, newest last.
    pub fn history(&self, limit: usize) -> Vec<RotationEvent> {
        let Some(ref path) = self.history_path else {
            return vec![];
        };
        let mut events: Vec<RotationEvent> = read_jsonl(path);
        let skip = events.len().saturating_sub(limit);
        events.drain(..skip);
        events
    }

    /// Automatic rotation triggered by a rate-limited pane. Returns the
    /// rotation event when one happened.
    pub async fn on_rate_limited(&self, provider: &str, reason: &str) -> Option<RotationEvent> {
        let mut inner = self.inner.lock().await;
        if !inner.policy.auto_rotate || !inner.policy.on_rate_limit {
            return None;
        }
        if let Some(last) = inner.last_rotation.get(provider) {
            if last.elapsed() < inner.policy.cooldown {
                debug!(provider, "rotation suppressed by cooldown");
                return None;
            }
        }
        let current = inner.active.get(provider).cloned().unwrap_or_default();
        // Mark the active account rate-limited before picking a successor.
        if let Some(account) = inner.accounts.get_mut(&key(provider, &current)) {
            account.rate_limited = true;
        }
        let next = inner
            .accounts
            .values()
            .filter(|a| a.provider == provider && !a.rate_limited && a.name != current)
            .min_by_key(|a| a.usage_percent)
            .map(|a| a.name.clone())?;
        inner.active.insert(provider.to_owned(), next.clone());
        inner.last_rotation.insert(provider.to_owned(), Instant::now());
        drop(inner);
        Some(self.record(provider, &current, &next, reason, true, true))
    }

    /// Manual rotation. The target must differ from the active account.
    pub async fn rotate_manual(
        &self,
        provider: &str,
        target: &str,
    ) -> Result<RotationEvent, ApiError> {
        let mut inner = self.inner.lock().await;
        let current = inner.active.get(provider).cloned().unwrap_or_default();
        if current == target {
            return Err(ApiError::new(
                ErrorCode::InvalidArgument,
                format!("account {target} is already active for {provider}"),
            ));
        }
        if !inner.accounts.contains_key(&key(provider, target)) {
            return Err(ApiError::new(
                ErrorCode::InvalidArgument,
                format!("unknown account {target} for provider {provider}"),
            ));
        }
        inner.active.insert(provider.to_owned(), target.to_owned());
        inner.last_rotation.insert(provider.to_owned(), Instant::now());
        drop(inner);
        Ok(self.record(provider, &current, target, "manual", false, true))
    }

    fn record(
        &self,
        provider: &str,
        prev: &str,
        next: &str,
        reason: &str,
        automatic: bool,
        success: bool,
    ) -> RotationEvent {
        let event = RotationEvent {
            ts_ms: now_epoch_ms(),
            provider: provider.to_owned(),
            prev: prev.to_owned(),
            next: next.to_owned(),
            reason: reason.to_owned(),
            automatic,
            success,
        };
        if let Some(ref path) = self.history_path {
            append_jsonl(path, &event);
        }
        self.bus.publish(
            None,
            None,
            EventKind::AccountRotation {
                provider: provider.to_owned(),
                prev: prev.to_owned(),
                next: next.to_owned(),
                automatic,
            },
        );
        event
    }
}

/// Quota roll-up for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSummary {
    pub provider: String,
    pub active: String,
    pub active_usage: u8,
    pub accounts: Vec<Account>,
}

/// Watch `pane.state` events and trigger automatic rotation when a pane
/// enters `rate_limited`.
pub fn spawn_rate_limit_watcher(
    table: Arc<AccountTable>,
    bus: Arc<Bus>,
    registry: Arc<crate::registry::Registry>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut subscription = bus.subscribe(Filter::for_topics(["pane.state"]));
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = subscription.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let EventKind::PaneState { ref next, .. } = event.kind else {
                continue;
            };
            if !matches!(next, crate::observer::PaneState::RateLimited { .. }) {
                continue;
            }
            let Some(ref pane_id) = event.pane else {
                continue;
            };
            let Some(pane) = registry.pane(pane_id).await else {
                continue;
            };
            table
                .on_rate_limited(pane.agent_type.as_str(), "pane_rate_limited")
                .await;
        }
    });
}

#[cfg(test)]
#[path = "account_tests.rs"]
mod tests;
