// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user state directory and line-oriented JSON stores.
//!
//! Append-only logs (events, rotation history, redaction findings, mail)
//! use one JSON record per line. Mutable tables (registry, locks, monitor
//! identities) are projections: rewritten atomically on every mutation via
//! a temp file + rename. The in-memory tables stay authoritative.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::event::Event;

/// Resolved state directory layout.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Resolve the state directory: `$NTM_STATE_DIR`, else
    /// `$XDG_STATE_HOME/ntm`, else `~/.local/state/ntm`.
    pub fn resolve() -> anyhow::Result<Self> {
        let root = match std::env::var("NTM_STATE_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let state_home = std::env::var("XDG_STATE_HOME").unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_default();
                    format!("{home}/.local/state")
                });
                PathBuf::from(state_home).join("ntm")
            }
        };
        Self::at(root)
    }

    /// Use an explicit root (tests, `--state-dir`).
    pub fn at(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join("mail"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn identities_path(&self) -> PathBuf {
        self.root.join("identities.jsonl")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.jsonl")
    }

    pub fn locks_path(&self) -> PathBuf {
        self.root.join("locks.jsonl")
    }

    pub fn events_path(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    pub fn rotation_history_path(&self) -> PathBuf {
        self.root.join("rotation_history.jsonl")
    }

    pub fn findings_path(&self) -> PathBuf {
        self.root.join("findings.jsonl")
    }

    pub fn messages_path(&self) -> PathBuf {
        self.root.join("messages.jsonl")
    }

    pub fn providers_config_path(&self) -> PathBuf {
        self.root.join("providers.toml")
    }

    pub fn redaction_config_path(&self) -> PathBuf {
        self.root.join("redaction.toml")
    }

    /// Mail store path for a project key. Path-shaped keys are encoded so
    /// they stay within the mail directory.
    pub fn mail_path(&self, key: &str) -> PathBuf {
        self.root.join("mail").join(format!("{}.jsonl", project_key(key)))
    }
}

/// Encode a project path into a filesystem-safe mail store key.
pub fn project_key(path: &str) -> String {
    let base = std::env::var("NTM_PROJECTS_BASE").ok().filter(|b| !b.is_empty());
    let absolute = match base {
        Some(base) if !path.starts_with('/') => format!("{}/{path}", base.trim_end_matches('/')),
        _ => path.to_owned(),
    };
    absolute.trim_matches('/').replace('/', "%")
}

/// Append one record to a JSONL file. Best-effort: serialization or I/O
/// failures are swallowed so persistence never takes down the runtime.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) {
    let Ok(mut line) = serde_json::to_string(record) else {
        return;
    };
    line.push('\n');
    let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = file.write_all(line.as_bytes());
}

/// Read every parseable record from a JSONL file. Missing file reads empty.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return vec![];
    };
    contents.lines().filter_map(|line| serde_json::from_str::<T>(line).ok()).collect()
}

/// Atomically replace a JSONL file with the given records.
pub fn rewrite_jsonl<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    for record in records {
        let line = serde_json::to_string(record)?;
        tmp.write_all(line.as_bytes())?;
        tmp.write_all(b"\n")?;
    }
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// File-backed append-only event log for WS/REST catch-up.
pub struct EventLog {
    path: PathBuf,
    last_seq: AtomicU64,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path, last_seq: AtomicU64::new(0) }
    }

    pub fn append(&self, event: &Event) {
        append_jsonl(&self.path, event);
        self.last_seq.store(event.seq, Ordering::Release);
    }

    /// Read events with `seq > since_seq`.
    pub fn catchup(&self, since_seq: u64) -> Vec<Event> {
        read_jsonl::<Event>(&self.path).into_iter().filter(|e| e.seq > since_seq).collect()
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
