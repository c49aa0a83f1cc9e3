// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider capability profiles.
//!
//! A provider is a value set of markers parameterising the pane state
//! machine: prompt/response/thinking/tool sentinels, rate-limit and error
//! phrases, and an optional context-percent extractor. New providers are
//! new value sets loaded from `providers.toml`, not new code paths.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Known agent types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Claude,
    Codex,
    Gemini,
    User,
    Unknown,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::User => "user",
            Self::Unknown => "unknown",
        }
    }

    pub fn all() -> [AgentType; 5] {
        [Self::Claude, Self::Codex, Self::Gemini, Self::User, Self::Unknown]
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "gemini" => Ok(Self::Gemini),
            "user" => Ok(Self::User),
            "unknown" => Ok(Self::Unknown),
            other => anyhow::bail!("invalid agent type: {other}"),
        }
    }
}

/// Extracts a context percentage from a scrollback line.
#[derive(Debug, Clone)]
pub struct ContextPercentRule {
    /// Capture group 1 is the percentage.
    pub pattern: Regex,
    /// True when the captured number is "percent remaining" rather than used.
    pub percent_is_remaining: bool,
}

/// The marker value set for one provider.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub agent_type: AgentType,
    /// Command launched in a freshly provisioned pane.
    pub command: String,
    pub prompt_marker: Regex,
    pub response_markers: Vec<Regex>,
    pub thinking_markers: Vec<Regex>,
    pub tool_markers: Vec<Regex>,
    pub rate_limit_phrases: Vec<Regex>,
    pub error_phrases: Vec<Regex>,
    pub context_percent: Option<ContextPercentRule>,
    pub compaction_marker: Option<Regex>,
    /// Nominal context window in tokens.
    pub context_limit: u64,
}

/// A prompt line located in a scrollback tail.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptLine {
    /// Index into the tail slice.
    pub index: usize,
    /// Text after the prompt marker (autocomplete ghost text excluded by
    /// the marker pattern itself).
    pub after: String,
}

impl ProviderProfile {
    /// Find the prompt line: the last non-empty tail line matching the
    /// prompt marker.
    pub fn prompt_line(&self, tail: &[String]) -> Option<PromptLine> {
        for (rev_offset, line) in tail.iter().rev().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(m) = self.prompt_marker.find(line) {
                let index = tail.len() - 1 - rev_offset;
                return Some(PromptLine { index, after: line[m.end()..].trim().to_owned() });
            }
            // Only the bottom-most non-empty line can be a prompt; status
            // text rendered below the prompt is tolerated one line deep.
            if rev_offset >= 2 {
                return None;
            }
        }
        None
    }

    pub fn has_response_marker(&self, tail: &[String]) -> bool {
        matches_any(&self.response_markers, tail)
    }

    pub fn has_thinking_marker(&self, tail: &[String]) -> bool {
        matches_any(&self.thinking_markers, tail)
    }

    pub fn has_tool_marker(&self, tail: &[String]) -> bool {
        matches_any(&self.tool_markers, tail)
    }

    pub fn rate_limit_line<'a>(&self, tail: &'a [String]) -> Option<&'a str> {
        find_line(&self.rate_limit_phrases, tail)
    }

    pub fn error_line<'a>(&self, tail: &'a [String]) -> Option<&'a str> {
        find_line(&self.error_phrases, tail)
    }

    /// Extract the latest context-used percentage (0–100) from the tail.
    pub fn context_used_percent(&self, tail: &[String]) -> Option<u8> {
        let rule = self.context_percent.as_ref()?;
        for line in tail.iter().rev() {
            if let Some(caps) = rule.pattern.captures(line) {
                let value: u8 = caps.get(1)?.as_str().parse().ok()?;
                let value = value.min(100);
                return Some(if rule.percent_is_remaining { 100 - value } else { value });
            }
        }
        None
    }

    pub fn compaction_line(&self, tail: &[String]) -> bool {
        self.compaction_marker
            .as_ref()
            .is_some_and(|re| tail.iter().any(|line| re.is_match(line)))
    }
}

fn matches_any(patterns: &[Regex], tail: &[String]) -> bool {
    patterns.iter().any(|re| tail.iter().any(|line| re.is_match(line)))
}

fn find_line<'a>(patterns: &[Regex], tail: &'a [String]) -> Option<&'a str> {
    tail.iter()
        .rev()
        .find(|line| patterns.iter().any(|re| re.is_match(line)))
        .map(|s| s.as_str())
}

/// Extract a retry hint like "try again in 42 seconds" from a rate-limit
/// line. Provider-agnostic: the phrasing varies but the shape holds.
pub fn extract_retry_after(line: &str) -> Option<Duration> {
    let re = Regex::new(
        r"(?i)(?:try again|retry|resets?|available)\s*(?:in|after)?\s*(\d+)\s*(seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h)\b",
    )
    .ok()?;
    let caps = re.captures(line)?;
    let value: u64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();
    let secs = match unit.chars().next()? {
        'h' => value * 3600,
        'm' => value * 60,
        _ => value,
    };
    Some(Duration::from_secs(secs))
}

// -- Configuration ------------------------------------------------------------

/// Raw per-provider pattern overrides (TOML `providers.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderPatternConfig {
    pub command: Option<String>,
    pub prompt_marker: Option<String>,
    #[serde(default)]
    pub response_markers: Vec<String>,
    #[serde(default)]
    pub thinking_markers: Vec<String>,
    #[serde(default)]
    pub tool_markers: Vec<String>,
    #[serde(default)]
    pub rate_limit_phrases: Vec<String>,
    #[serde(default)]
    pub error_phrases: Vec<String>,
    pub context_percent_pattern: Option<String>,
    pub context_percent_is_remaining: Option<bool>,
    pub compaction_marker: Option<String>,
    pub context_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderConfigFile {
    #[serde(default)]
    providers: HashMap<String, ProviderPatternConfig>,
}

/// The full provider table, keyed by agent type.
#[derive(Clone)]
pub struct ProviderSet {
    profiles: HashMap<AgentType, Arc<ProviderProfile>>,
    fallback: Arc<ProviderProfile>,
}

impl ProviderSet {
    /// Built-in marker sets for the known providers.
    pub fn builtin() -> anyhow::Result<Self> {
        let mut profiles = HashMap::new();
        for agent_type in AgentType::all() {
            profiles.insert(agent_type, Arc::new(builtin_profile(agent_type)?));
        }
        let fallback = Arc::new(builtin_profile(AgentType::Unknown)?);
        Ok(Self { profiles, fallback })
    }

    /// Built-ins overlaid with any overrides from `providers.toml`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut set = Self::builtin()?;
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Ok(set);
        };
        let file: ProviderConfigFile = toml::from_str(&contents)?;
        for (name, config) in file.providers {
            let agent_type: AgentType = name.parse()?;
            let base = set.get(agent_type);
            let merged = apply_overrides(&base, &config)?;
            set.profiles.insert(agent_type, Arc::new(merged));
        }
        Ok(set)
    }

    pub fn get(&self, agent_type: AgentType) -> Arc<ProviderProfile> {
        self.profiles.get(&agent_type).cloned().unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

fn compile_list(patterns: &[String]) -> anyhow::Result<Vec<Regex>> {
    patterns.iter().map(|p| Ok(Regex::new(p)?)).collect()
}

fn apply_overrides(
    base: &ProviderProfile,
    config: &ProviderPatternConfig,
) -> anyhow::Result<ProviderProfile> {
    let mut profile = base.clone();
    if let Some(ref command) = config.command {
        profile.command = command.clone();
    }
    if let Some(ref marker) = config.prompt_marker {
        profile.prompt_marker = Regex::new(marker)?;
    }
    if !config.response_markers.is_empty() {
        profile.response_markers = compile_list(&config.response_markers)?;
    }
    if !config.thinking_markers.is_empty() {
        profile.thinking_markers = compile_list(&config.thinking_markers)?;
    }
    if !config.tool_markers.is_empty() {
        profile.tool_markers = compile_list(&config.tool_markers)?;
    }
    if !config.rate_limit_phrases.is_empty() {
        profile.rate_limit_phrases = compile_list(&config.rate_limit_phrases)?;
    }
    if !config.error_phrases.is_empty() {
        profile.error_phrases = compile_list(&config.error_phrases)?;
    }
    if let Some(ref pattern) = config.context_percent_pattern {
        profile.context_percent = Some(ContextPercentRule {
            pattern: Regex::new(pattern)?,
            percent_is_remaining: config.context_percent_is_remaining.unwrap_or(false),
        });
    }
    if let Some(ref marker) = config.compaction_marker {
        profile.compaction_marker = Some(Regex::new(marker)?);
    }
    if let Some(limit) = config.context_limit {
        profile.context_limit = limit;
    }
    Ok(profile)
}

fn builtin_profile(agent_type: AgentType) -> anyhow::Result<ProviderProfile> {
    let profile = match agent_type {
        AgentType::Claude => ProviderProfile {
            agent_type,
            command: "claude".to_owned(),
            prompt_marker: Regex::new(r"^\s*\u{276f}")?,
            response_markers: vec![Regex::new(r"^\s*[\u{23fa}\u{25cf}]\s")?],
            thinking_markers: vec![Regex::new(r"(?i)^\s*[\u{273b}\u{2733}\u{00b7}\u{273d}]?\s*(?:thinking|pondering|reticulating|compacting)\u{2026}?")?],
            tool_markers: vec![
                Regex::new(r"^\s*\u{23bf}")?,
                Regex::new(r"(?i)^\s*(?:bash|read|edit|write|grep|task)\(")?,
            ],
            rate_limit_phrases: vec![
                Regex::new(r"(?i)rate limit")?,
                Regex::new(r"(?i)usage limit (?:reached|exceeded)")?,
                Regex::new(r"(?i)overloaded_error")?,
            ],
            error_phrases: vec![
                Regex::new(r"(?i)^\s*(?:api )?error[:\s]")?,
                Regex::new(r"(?i)connection (?:error|refused|reset)")?,
            ],
            context_percent: Some(ContextPercentRule {
                pattern: Regex::new(r"(?i)context left until auto-compact:\s*(\d+)%")?,
                percent_is_remaining: true,
            }),
            compaction_marker: Some(Regex::new(r"(?i)conversation compacted|compacted\. ctrl\+o")?,),
            context_limit: 200_000,
        },
        AgentType::Codex => ProviderProfile {
            agent_type,
            command: "codex".to_owned(),
            prompt_marker: Regex::new(r"^\s*\u{203a}")?,
            response_markers: vec![Regex::new(r"^\s*codex\b")?],
            thinking_markers: vec![Regex::new(r"(?i)^\s*(?:\u{2022}\s*)?(?:thinking|planning)\b")?],
            tool_markers: vec![Regex::new(r"(?i)^\s*(?:exec|applying patch|running)\b")?],
            rate_limit_phrases: vec![
                Regex::new(r"(?i)rate limit")?,
                Regex::new(r"(?i)\b429\b")?,
            ],
            error_phrases: vec![Regex::new(r"(?i)^\s*(?:\u{26a0}\s*)?error\b")?],
            context_percent: Some(ContextPercentRule {
                pattern: Regex::new(r"(\d+)%\s*context left")?,
                percent_is_remaining: true,
            }),
            compaction_marker: Some(Regex::new(r"(?i)context compacted")?),
            context_limit: 272_000,
        },
        AgentType::Gemini => ProviderProfile {
            agent_type,
            command: "gemini".to_owned(),
            prompt_marker: Regex::new(r"^\s*>")?,
            response_markers: vec![Regex::new(r"^\s*\u{2726}\s")?],
            thinking_markers: vec![Regex::new(r"[\u{280b}\u{2819}\u{2839}\u{28b8}\u{28e0}]")?],
            tool_markers: vec![Regex::new(r"^\s*[\u{2714}\u{22b7}]\s")?],
            rate_limit_phrases: vec![
                Regex::new(r"(?i)quota exceeded")?,
                Regex::new(r"(?i)resource[_ ]exhausted")?,
                Regex::new(r"(?i)\b429\b")?,
            ],
            error_phrases: vec![Regex::new(r"^\s*\u{2716}\s")?],
            context_percent: Some(ContextPercentRule {
                pattern: Regex::new(r"\((\d+)% context left\)")?,
                percent_is_remaining: true,
            }),
            compaction_marker: None,
            context_limit: 1_000_000,
        },
        AgentType::User => ProviderProfile {
            agent_type,
            command: String::new(),
            prompt_marker: Regex::new(r"[$%#]\s*$")?,
            response_markers: vec![],
            thinking_markers: vec![],
            tool_markers: vec![],
            rate_limit_phrases: vec![],
            error_phrases: vec![],
            context_percent: None,
            compaction_marker: None,
            context_limit: 0,
        },
        AgentType::Unknown => ProviderProfile {
            agent_type,
            command: String::new(),
            prompt_marker: Regex::new(r"^\s*[>$%#\u{276f}]")?,
            response_markers: vec![],
            thinking_markers: vec![],
            tool_markers: vec![],
            rate_limit_phrases: vec![Regex::new(r"(?i)rate limit")?],
            error_phrases: vec![Regex::new(r"(?i)^\s*error[:\s]")?],
            context_percent: None,
            compaction_marker: None,
            context_limit: 200_000,
        },
    };
    Ok(profile)
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
