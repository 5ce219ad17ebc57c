// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema – mirrors bashclaw_model::ToolSchema but keeps this crate
/// independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Produce schemas for the given tool names, sorted by name.
    pub fn schemas_for(&self, names: &[String]) -> Vec<ToolSchema> {
        let set: HashSet<&str> = names.iter().map(String::as_str).collect();
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| set.contains(t.name()))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.input_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Schemas for every registered tool exposed over the MCP bridge.
    pub fn bridge_schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| t.bridge_exposed())
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.input_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Compute the effective tool set for an agent:
    /// `(profile_tools ∪ tool_allow) \ tool_deny \ unavailable`.
    /// Non-optional registered tools are always included, even with an empty
    /// `profile_tools`/`tool_allow`.
    pub fn effective_tools(
        &self,
        profile_tools: &[String],
        tool_allow: &[String],
        tool_deny: &[String],
    ) -> Vec<String> {
        let deny: HashSet<&str> = tool_deny.iter().map(String::as_str).collect();

        let mut names: HashSet<String> = self
            .tools
            .values()
            .filter(|t| !t.optional())
            .map(|t| t.name().to_string())
            .collect();
        names.extend(profile_tools.iter().cloned());
        names.extend(tool_allow.iter().cloned());

        let mut effective: Vec<String> = names
            .into_iter()
            .filter(|n| !deny.contains(n.as_str()))
            .filter(|n| self.get(n).map(|t| !t.unavailable()).unwrap_or(false))
            .collect();
        effective.sort();
        effective
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
