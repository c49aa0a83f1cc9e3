// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context-window tracking.
//!
//! When the provider renders a context-percent indicator we trust it;
//! otherwise usage is estimated from observed conversation characters since
//! the last compaction marker (≈4 chars per token). Crossing 70/85/95
//! percent fires one event per threshold.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::provider::ProviderProfile;

const THRESHOLDS: [u8; 3] = [70, 85, 95];
const CHARS_PER_TOKEN: u64 = 4;
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// A context-usage threshold that was just crossed upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdCrossing {
    pub threshold: u8,
    pub used: u64,
    pub limit: u64,
}

/// Per-pane context usage tracker.
pub struct ContextTracker {
    used: u64,
    limit: u64,
    chars_since_compaction: u64,
    /// Highest threshold already reported; re-armed when usage drops back
    /// below it (compaction).
    reported: u8,
    rate_window: VecDeque<(Instant, u64)>,
}

impl ContextTracker {
    pub fn new(limit: u64) -> Self {
        Self {
            used: 0,
            limit: limit.max(1),
            chars_since_compaction: 0,
            reported: 0,
            rate_window: VecDeque::new(),
        }
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Observed output tokens per minute, from the rolling char window.
    pub fn tokens_per_min(&self) -> u64 {
        let now = Instant::now();
        let chars: u64 = self
            .rate_window
            .iter()
            .filter(|(at, _)| now.duration_since(*at) <= RATE_WINDOW)
            .map(|(_, c)| c)
            .sum();
        chars / CHARS_PER_TOKEN
    }

    /// Feed one observation. `new_chars` is the character count of lines
    /// that appeared since the previous snapshot. Returns every threshold
    /// crossed upward by this observation, lowest first.
    pub fn observe(
        &mut self,
        profile: &ProviderProfile,
        tail: &[String],
        new_chars: u64,
    ) -> Vec<ThresholdCrossing> {
        if new_chars > 0 {
            let now = Instant::now();
            self.rate_window.push_back((now, new_chars));
            while let Some(&(at, _)) = self.rate_window.front() {
                if now.duration_since(at) > RATE_WINDOW {
                    self.rate_window.pop_front();
                } else {
                    break;
                }
            }
        }

        if profile.compaction_line(tail) {
            self.chars_since_compaction = 0;
        }

        if let Some(percent) = profile.context_used_percent(tail) {
            self.used = self.limit.saturating_mul(u64::from(percent)) / 100;
        } else {
            self.chars_since_compaction += new_chars;
            let estimated = self.chars_since_compaction / CHARS_PER_TOKEN;
            self.used = estimated.min(self.limit);
        }

        let percent = (self.used.saturating_mul(100) / self.limit) as u8;

        // Re-arm thresholds after compaction dropped usage back down.
        if percent < self.reported {
            self.reported = THRESHOLDS.iter().rev().find(|&&t| percent >= t).copied().unwrap_or(0);
        }

        let mut crossings = Vec::new();
        for &threshold in &THRESHOLDS {
            if percent >= threshold && self.reported < threshold {
                self.reported = threshold;
                crossings.push(ThresholdCrossing {
                    threshold,
                    used: self.used,
                    limit: self.limit,
                });
            }
        }
        crossings
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
