// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// `true` if `path` contains a `..` segment, which would let the agent escape
/// the directory it was pointed at.
pub(crate) fn has_traversal(path: &str) -> bool {
    Path::new(path).components().any(|c| c.as_os_str() == "..")
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads the full contents of a file at 'path' and returns {content, path}.\n\
         Paths containing a '..' segment are rejected."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path of the file to read" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'path'"),
        };

        if has_traversal(&path) {
            return ToolOutput::err(&call.id, "traversal: '..' segment not allowed");
        }

        debug!(path = %path, "read_file tool");

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => ToolOutput::ok(&call.id, json!({"content": content, "path": path}).to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ToolOutput::err(&call.id, format!("missing: no such file: {path}"))
            }
            Err(e) => ToolOutput::err(&call.id, format!("read error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn reads_existing_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "hello world").unwrap();

        let t = ReadFileTool;
        let call = ToolCall {
            id: "1".into(),
            name: "read_file".into(),
            args: json!({"path": file.path().to_str().unwrap()}),
        };
        let out = t.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.contains("hello world"));
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let t = ReadFileTool;
        let call = ToolCall {
            id: "1".into(),
            name: "read_file".into(),
            args: json!({"path": "/nonexistent/path/xyz"}),
        };
        let out = t.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing"));
    }

    #[tokio::test]
    async fn traversal_path_is_rejected() {
        let t = ReadFileTool;
        let call = ToolCall {
            id: "1".into(),
            name: "read_file".into(),
            args: json!({"path": "../../etc/passwd"}),
        };
        let out = t.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("traversal"));
    }

    #[test]
    fn has_traversal_detects_dotdot_segment() {
        assert!(has_traversal("../x"));
        assert!(has_traversal("a/../b"));
        assert!(!has_traversal("a/b/c"));
    }
}
