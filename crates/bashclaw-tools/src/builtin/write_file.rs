// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::read_file::has_traversal;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes 'content' to the file at 'path', creating parent directories as needed and\n\
         overwriting any existing file. Returns {written:true}.\n\
         Paths containing a '..' segment are rejected."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path of the file to write" },
                "content": { "type": "string", "description": "Content to write" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'path'"),
        };
        let content = match call.args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'content'"),
        };

        if has_traversal(&path) {
            return ToolOutput::err(&call.id, "traversal: '..' segment not allowed");
        }

        debug!(path = %path, "write_file tool");

        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolOutput::err(&call.id, format!("write error: {e}"));
                }
            }
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => ToolOutput::ok(&call.id, json!({"written": true}).to_string()),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}
