// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::registry::ToolSchema;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Returns the names and JSON schemas of every tool exposed over the MCP
/// bridge. `sessions_list`, `session_status`, and `agent_message` live in the
/// core crate since they need session-store access this crate does not have.
pub struct AgentsListTool {
    pub agent_ids: Vec<String>,
}

#[async_trait]
impl Tool for AgentsListTool {
    fn name(&self) -> &str {
        "agents_list"
    }

    fn description(&self) -> &str {
        "Lists the configured agent ids available on this gateway."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        ToolOutput::ok(&call.id, json!({"agents": self.agent_ids}).to_string())
    }
}

/// Lists every tool currently registered, independent of any agent's
/// effective tool set. Exposed for debugging / MCP bridge discovery.
pub struct ListToolsTool {
    pub schemas: Vec<ToolSchema>,
}

#[async_trait]
impl Tool for ListToolsTool {
    fn name(&self) -> &str {
        "list_tools"
    }

    fn description(&self) -> &str {
        "Lists every tool registered on this gateway, with its JSON schema."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let tools: Vec<Value> = self
            .schemas
            .iter()
            .map(|s| json!({"name": s.name, "description": s.description}))
            .collect();
        ToolOutput::ok(&call.id, json!({"tools": tools}).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn agents_list_returns_configured_ids() {
        let t = AgentsListTool {
            agent_ids: vec!["default".into(), "helpdesk".into()],
        };
        let out = t
            .execute(&ToolCall {
                id: "1".into(),
                name: "agents_list".into(),
                args: json!({}),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("helpdesk"));
    }

    #[tokio::test]
    async fn list_tools_returns_schema_names() {
        let t = ListToolsTool {
            schemas: vec![ToolSchema {
                name: "shell".into(),
                description: "run a command".into(),
                parameters: json!({}),
            }],
        };
        let out = t
            .execute(&ToolCall {
                id: "1".into(),
                name: "list_tools".into(),
                args: json!({}),
            })
            .await;
        assert!(out.content.contains("shell"));
    }
}
