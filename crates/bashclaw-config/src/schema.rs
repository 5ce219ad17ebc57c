// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_max_history() -> usize {
    200
}

fn default_idle_reset_minutes() -> u64 {
    60
}

/// How session scope is keyed.
///
/// `PerSender` (default) gives every distinct sender within a channel its own
/// history; `PerChannel` pools all senders in a channel into one scope;
/// `Global` collapses the whole agent onto a single scope regardless of
/// channel or sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionScope {
    PerChannel,
    PerSender,
    Global,
}

impl Default for SessionScope {
    fn default() -> Self {
        SessionScope::PerSender
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub scope: SessionScope,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_idle_reset_minutes")]
    pub idle_reset_minutes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scope: SessionScope::default(),
            max_history: default_max_history(),
            idle_reset_minutes: default_idle_reset_minutes(),
        }
    }
}

/// Per-agent configuration.
///
/// Every field is optional at the JSON layer so `agents.<id>` entries only
/// need to name what differs from `agents.defaults`; [`AgentConfig::merged_with`]
/// resolves the two into the effective config for that agent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Named tool profile (e.g. "default", "readonly") resolved by the
    /// dispatcher into a base tool set before tool_allow/tool_deny apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_profile: Option<String>,
    pub tool_allow: Vec<String>,
    pub tool_deny: Vec<String>,
    /// Name of the external engine to delegate completions to, when this
    /// agent does not use the built-in provider adapters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

impl AgentConfig {
    /// Merge `over` onto `self` (the defaults layer): unset/empty fields in
    /// `over` fall through to `self`, matching the `agents.defaults` +
    /// `agents.<id>` override model.
    pub fn merged_with(&self, over: &AgentConfig) -> AgentConfig {
        AgentConfig {
            model_id: over.model_id.clone().or_else(|| self.model_id.clone()),
            system_prompt: over
                .system_prompt
                .clone()
                .or_else(|| self.system_prompt.clone()),
            max_tokens: over.max_tokens.or(self.max_tokens),
            temperature: over.temperature.or(self.temperature),
            tool_profile: over
                .tool_profile
                .clone()
                .or_else(|| self.tool_profile.clone()),
            tool_allow: if over.tool_allow.is_empty() {
                self.tool_allow.clone()
            } else {
                over.tool_allow.clone()
            },
            tool_deny: if over.tool_deny.is_empty() {
                self.tool_deny.clone()
            } else {
                over.tool_deny.clone()
            },
            engine: over.engine.clone().or_else(|| self.engine.clone()),
        }
    }
}

/// The `agents` config section: a `defaults` entry plus zero or more
/// per-agent-id overrides, all parsed from one JSON object.
#[derive(Debug, Clone, Default)]
pub struct AgentsSection {
    pub defaults: AgentConfig,
    pub overrides: HashMap<String, AgentConfig>,
}

impl AgentsSection {
    /// Resolve the effective configuration for a single agent id.
    pub fn resolve(&self, agent_id: &str) -> AgentConfig {
        match self.overrides.get(agent_id) {
            Some(over) => self.defaults.merged_with(over),
            None => self.defaults.clone(),
        }
    }
}

impl Serialize for AgentsSection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1 + self.overrides.len()))?;
        map.serialize_entry("defaults", &self.defaults)?;
        for (k, v) in &self.overrides {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AgentsSection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut raw: HashMap<String, AgentConfig> = HashMap::deserialize(deserializer)?;
        let defaults = raw.remove("defaults").unwrap_or_default();
        Ok(AgentsSection {
            defaults,
            overrides: raw,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agents: AgentsSection,
    pub session: SessionConfig,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
