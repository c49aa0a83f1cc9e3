// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::provider::{AgentType, ProviderSet};

use super::ContextTracker;

fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

#[test]
fn provider_percent_sets_usage() {
    let set = ProviderSet::builtin().unwrap();
    let profile = set.get(AgentType::Claude);
    let mut tracker = ContextTracker::new(200_000);

    let tail = lines(&["Context left until auto-compact: 40%"]);
    let crossings = tracker.observe(&profile, &tail, 0);
    assert!(crossings.is_empty());
    assert_eq!(tracker.used(), 120_000);
}

#[test]
fn each_threshold_fires_exactly_once() {
    let set = ProviderSet::builtin().unwrap();
    let profile = set.get(AgentType::Claude);
    let mut tracker = ContextTracker::new(100);

    let at_71 = lines(&["Context left until auto-compact: 29%"]);
    let crossings = tracker.observe(&profile, &at_71, 0);
    assert_eq!(crossings.len(), 1);
    assert_eq!(crossings[0].threshold, 70);

    // Same reading again: no repeat event.
    assert!(tracker.observe(&profile, &at_71, 0).is_empty());

    let at_86 = lines(&["Context left until auto-compact: 14%"]);
    let crossings = tracker.observe(&profile, &at_86, 0);
    assert_eq!(crossings.len(), 1);
    assert_eq!(crossings[0].threshold, 85);
}

#[test]
fn exact_boundary_values_fire_once_each() {
    let set = ProviderSet::builtin().unwrap();
    let profile = set.get(AgentType::Claude);
    let mut tracker = ContextTracker::new(100);

    for (remaining, expected) in [(30u8, 70u8), (15, 85), (5, 95)] {
        let tail = lines(&[&format!("Context left until auto-compact: {remaining}%")]);
        let crossings = tracker.observe(&profile, &tail, 0);
        assert_eq!(crossings.len(), 1, "remaining={remaining}");
        assert_eq!(crossings[0].threshold, expected);
        assert!(tracker.observe(&profile, &tail, 0).is_empty());
    }
}

#[test]
fn jump_across_two_thresholds_fires_both() {
    let set = ProviderSet::builtin().unwrap();
    let profile = set.get(AgentType::Claude);
    let mut tracker = ContextTracker::new(100);

    let tail = lines(&["Context left until auto-compact: 10%"]);
    let crossings = tracker.observe(&profile, &tail, 0);
    let thresholds: Vec<u8> = crossings.iter().map(|c| c.threshold).collect();
    assert_eq!(thresholds, vec![70, 85]);
}

#[test]
fn compaction_rearms_thresholds() {
    let set = ProviderSet::builtin().unwrap();
    let profile = set.get(AgentType::Claude);
    let mut tracker = ContextTracker::new(100);

    let high = lines(&["Context left until auto-compact: 10%"]);
    assert_eq!(tracker.observe(&profile, &high, 0).len(), 2);

    let low = lines(&["Context left until auto-compact: 80%"]);
    assert!(tracker.observe(&profile, &low, 0).is_empty());

    // Climbing back over 70 fires again after the drop.
    let crossings = tracker.observe(&profile, &high, 0);
    assert_eq!(crossings.len(), 2);
}

#[test]
fn heuristic_estimates_from_chars_without_indicator() {
    let set = ProviderSet::builtin().unwrap();
    let profile = set.get(AgentType::Unknown);
    let mut tracker = ContextTracker::new(1000);

    let tail = lines(&["plain output"]);
    tracker.observe(&profile, &tail, 2000);
    // 2000 chars ≈ 500 tokens.
    assert_eq!(tracker.used(), 500);
    tracker.observe(&profile, &tail, 2000);
    assert_eq!(tracker.used(), 1000);
    // Clamped at the limit.
    tracker.observe(&profile, &tail, 9000);
    assert_eq!(tracker.used(), 1000);
}

#[test]
fn tokens_per_min_reflects_recent_chars() {
    let set = ProviderSet::builtin().unwrap();
    let profile = set.get(AgentType::Unknown);
    let mut tracker = ContextTracker::new(10_000);

    tracker.observe(&profile, &lines(&["x"]), 400);
    assert_eq!(tracker.tokens_per_min(), 100);
}
