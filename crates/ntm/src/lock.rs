// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File/resource reservations with TTL.
//!
//! Acquisition is compare-and-set against an in-memory table; the JSONL
//! projection is rewritten on every mutation. Expired entries are swept by
//! a background task that publishes `lock.released(reason=expired)`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::bus::Bus;
use crate::event::{now_epoch_ms, EventKind};
use crate::persist::{read_jsonl, rewrite_jsonl};

/// A held reservation on a project-relative resource path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub resource: String,
    pub holder_pane_id: String,
    pub reason: String,
    pub acquired_at_ms: u64,
    pub ttl_ms: u64,
    pub renew_count: u32,
}

impl Lock {
    fn expires_at_ms(&self) -> u64 {
        self.acquired_at_ms.saturating_add(self.ttl_ms)
    }

    fn expired(&self, now_ms: u64) -> bool {
        self.ttl_ms > 0 && now_ms >= self.expires_at_ms()
    }
}

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    /// Fresh acquisition.
    Acquired(Lock),
    /// Same holder re-acquired: TTL extended.
    Renewed(Lock),
    /// Another pane holds the resource.
    Conflict { holder_pane_id: String },
}

/// The lock table.
pub struct LockTable {
    inner: Mutex<IndexMap<String, Lock>>,
    path: Option<PathBuf>,
    bus: Arc<Bus>,
}

impl LockTable {
    pub fn new(path: Option<PathBuf>, bus: Arc<Bus>) -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(IndexMap::new()), path, bus })
    }

    /// Restore unexpired locks from the projection file.
    pub async fn load(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let now = now_epoch_ms();
        let mut inner = self.inner.lock().await;
        for lock in read_jsonl::<Lock>(path) {
            if !lock.expired(now) {
                inner.insert(lock.resource.clone(), lock);
            }
        }
    }

    fn project(&self, inner: &IndexMap<String, Lock>) {
        if let Some(ref path) = self.path {
            let records: Vec<Lock> = inner.values().cloned().collect();
            let _ = rewrite_jsonl(path, &records);
        }
    }

    /// Compare-and-set acquire. Re-acquisition by the current holder renews.
    pub async fn acquire(
        &self,
        resource: &str,
        pane_id: &str,
        reason: &str,
        ttl: Duration,
    ) -> AcquireOutcome {
        let now = now_epoch_ms();
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.get(resource) {
            if !existing.expired(now) {
                if existing.holder_pane_id == pane_id {
                    let mut renewed = existing.clone();
                    renewed.ttl_ms = ttl.as_millis() as u64;
                    renewed.acquired_at_ms = now;
                    renewed.renew_count += 1;
                    inner.insert(resource.to_owned(), renewed.clone());
                    self.project(&inner);
                    return AcquireOutcome::Renewed(renewed);
                }
                return AcquireOutcome::Conflict {
                    holder_pane_id: existing.holder_pane_id.clone(),
                };
            }
        }
        let lock = Lock {
            resource: resource.to_owned(),
            holder_pane_id: pane_id.to_owned(),
            reason: reason.to_owned(),
            acquired_at_ms: now,
            ttl_ms: ttl.as_millis() as u64,
            renew_count: 0,
        };
        inner.insert(resource.to_owned(), lock.clone());
        self.project(&inner);
        drop(inner);
        self.bus.publish(
            None,
            Some(pane_id),
            EventKind::LockAcquired { resource: resource.to_owned(), holder: pane_id.to_owned() },
        );
        AcquireOutcome::Acquired(lock)
    }

    /// Extend the TTL of a held lock.
    pub async fn renew(&self, resource: &str, pane_id: &str, ttl: Duration) -> AcquireOutcome {
        self.acquire(resource, pane_id, "", ttl).await
    }

    /// Release one lock. Returns false when not held by `pane_id`.
    pub async fn release(&self, resource: &str, pane_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.get(resource) {
            Some(lock) if lock.holder_pane_id == pane_id => {
                inner.shift_remove(resource);
                self.project(&inner);
                drop(inner);
                self.bus.publish(
                    None,
                    Some(pane_id),
                    EventKind::LockReleased {
                        resource: resource.to_owned(),
                        holder: pane_id.to_owned(),
                        reason: "released".to_owned(),
                    },
                );
                true
            }
            _ => false,
        }
    }

    /// Release every lock held by a pane (pane death / `unlock --all`).
    pub async fn release_all(&self, pane_id: &str) -> usize {
        let mut inner = self.inner.lock().await;
        let resources: Vec<String> = inner
            .values()
            .filter(|l| l.holder_pane_id == pane_id)
            .map(|l| l.resource.clone())
            .collect();
        for resource in &resources {
            inner.shift_remove(resource);
        }
        if !resources.is_empty() {
            self.project(&inner);
        }
        drop(inner);
        for resource in &resources {
            self.bus.publish(
                None,
                Some(pane_id),
                EventKind::LockReleased {
                    resource: resource.clone(),
                    holder: pane_id.to_owned(),
                    reason: "holder_gone".to_owned(),
                },
            );
        }
        resources.len()
    }

    pub async fn list(&self) -> Vec<Lock> {
        self.inner.lock().await.values().cloned().collect()
    }

    /// Drop expired locks, publishing a release event for each.
    pub async fn sweep_expired(&self) -> usize {
        let now = now_epoch_ms();
        let mut inner = self.inner.lock().await;
        let expired: Vec<Lock> =
            inner.values().filter(|l| l.expired(now)).cloned().collect();
        for lock in &expired {
            inner.shift_remove(&lock.resource);
        }
        if !expired.is_empty() {
            self.project(&inner);
        }
        drop(inner);
        for lock in &expired {
            self.bus.publish(
                None,
                Some(&lock.holder_pane_id),
                EventKind::LockReleased {
                    resource: lock.resource.clone(),
                    holder: lock.holder_pane_id.clone(),
                    reason: "expired".to_owned(),
                },
            );
        }
        expired.len()
    }

    /// Background expiry sweep.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let table = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                table.sweep_expired().await;
            }
        });
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
