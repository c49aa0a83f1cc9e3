// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide publish/subscribe fabric.
//!
//! Each subscriber owns a bounded queue (default 256). Publish is
//! non-blocking: when a queue is full the oldest event is dropped and the
//! subscriber is handed a synthetic `bus.overflow` event so UIs can resync.
//! Ordering is preserved per publisher, not globally.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::event::{now_epoch_ms, Event, EventKind};
use crate::persist::EventLog;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Subscription filter: match events scoped to a session and/or a topic set.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
}

impl Filter {
    /// Match everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_session(session: impl Into<String>) -> Self {
        Self { session: Some(session.into()), topics: None }
    }

    pub fn for_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { session: None, topics: Some(topics.into_iter().map(Into::into).collect()) }
    }

    fn matches(&self, event: &Event) -> bool {
        if let Some(ref session) = self.session {
            // Session-scoped events must match; unscoped events pass through.
            if let Some(ref ev_session) = event.session {
                if ev_session != session {
                    return false;
                }
            }
        }
        if let Some(ref topics) = self.topics {
            if !topics.iter().any(|t| t == event.kind.topic()) {
                return false;
            }
        }
        true
    }
}

struct SubQueue {
    events: VecDeque<Event>,
    dropped_total: u64,
    overflow_pending: bool,
}

struct SubscriberInner {
    filter: Filter,
    capacity: usize,
    queue: parking_lot::Mutex<SubQueue>,
    notify: tokio::sync::Notify,
    closed: AtomicBool,
}

impl SubscriberInner {
    fn offer(&self, event: Event) {
        let mut queue = self.queue.lock();
        while queue.events.len() >= self.capacity {
            queue.events.pop_front();
            queue.dropped_total += 1;
            queue.overflow_pending = true;
        }
        queue.events.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }
}

/// Handle to a bus subscription. Dropping it unsubscribes.
pub struct Subscription {
    inner: Arc<SubscriberInner>,
}

impl Subscription {
    /// Receive the next event, waiting until one is available or the bus
    /// shuts down (`None`).
    ///
    /// When events were dropped since the last receive, a synthetic
    /// `bus.overflow` event (seq 0) is yielded before the surviving backlog.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.inner.closed.load(Ordering::Acquire) {
                return None;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Event> {
        let mut queue = self.inner.queue.lock();
        if queue.overflow_pending {
            queue.overflow_pending = false;
            let dropped = queue.dropped_total;
            return Some(Event {
                seq: 0,
                ts_ms: now_epoch_ms(),
                session: None,
                pane: None,
                kind: EventKind::BusOverflow { dropped },
            });
        }
        queue.events.pop_front()
    }

    /// Total events dropped from this subscriber's queue since creation.
    pub fn dropped(&self) -> u64 {
        self.inner.queue.lock().dropped_total
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

/// The process-wide event bus.
pub struct Bus {
    subscribers: parking_lot::RwLock<Vec<Arc<SubscriberInner>>>,
    seq: AtomicU64,
    log: Option<Arc<EventLog>>,
}

impl Bus {
    pub fn new(log: Option<Arc<EventLog>>) -> Arc<Self> {
        Arc::new(Self {
            subscribers: parking_lot::RwLock::new(Vec::new()),
            seq: AtomicU64::new(1),
            log,
        })
    }

    /// Publish an event. Never blocks; returns the stamped event.
    pub fn publish(
        &self,
        session: Option<&str>,
        pane: Option<&str>,
        kind: EventKind,
    ) -> Event {
        let event = Event {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            ts_ms: now_epoch_ms(),
            session: session.map(str::to_owned),
            pane: pane.map(str::to_owned),
            kind,
        };
        if let Some(ref log) = self.log {
            log.append(&event);
        }
        let subscribers = self.subscribers.read();
        for sub in subscribers.iter() {
            if !sub.closed.load(Ordering::Acquire) && sub.filter.matches(&event) {
                sub.offer(event.clone());
            }
        }
        event
    }

    /// Subscribe with the given filter and the default queue capacity.
    pub fn subscribe(&self, filter: Filter) -> Subscription {
        self.subscribe_with_capacity(filter, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, filter: Filter, capacity: usize) -> Subscription {
        let inner = Arc::new(SubscriberInner {
            filter,
            capacity: capacity.max(2),
            queue: parking_lot::Mutex::new(SubQueue {
                events: VecDeque::new(),
                dropped_total: 0,
                overflow_pending: false,
            }),
            notify: tokio::sync::Notify::new(),
            closed: AtomicBool::new(false),
        });
        let mut subscribers = self.subscribers.write();
        // Prune subscribers whose handles were dropped.
        subscribers.retain(|s| !s.closed.load(Ordering::Acquire));
        subscribers.push(Arc::clone(&inner));
        Subscription { inner }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().iter().filter(|s| !s.closed.load(Ordering::Acquire)).count()
    }

    /// Wake every subscriber with end-of-stream.
    pub fn close_all(&self) {
        let subscribers = self.subscribers.read();
        for sub in subscribers.iter() {
            sub.closed.store(true, Ordering::Release);
            sub.notify.notify_one();
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
