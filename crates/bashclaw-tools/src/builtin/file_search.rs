// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::tool::{Tool, ToolCall, ToolOutput};

const DEFAULT_MAX_RESULTS: usize = 200;

static EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules"];

fn is_excluded(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

/// Searches file contents for a text pattern under a directory tree.
pub struct FileSearchTool;

#[async_trait]
impl Tool for FileSearchTool {
    fn name(&self) -> &str {
        "file_search"
    }

    fn description(&self) -> &str {
        "Searches files under 'path' for lines containing 'content' (a plain substring,\n\
         case-sensitive) and returns {results: [{path, line, excerpt}], count}.\n\
         Binary files are skipped. Excludes .git/, target/, node_modules/."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Root directory to search" },
                "content": { "type": "string", "description": "Substring to search for" },
                "max_results": { "type": "integer", "description": "Maximum matches to return (default 200)" }
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
        let pattern = match call.args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'content'"),
        };
        let max_results = call
            .args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_RESULTS as u64) as usize;

        debug!(path = %path, "file_search tool");

        match std::fs::metadata(&path) {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return ToolOutput::err(&call.id, format!("not a directory: {path}")),
            Err(e) => return ToolOutput::err(&call.id, format!("not a directory: {path} ({e})")),
        }

        let mut results = Vec::new();
        let walker = WalkDir::new(&path)
            .into_iter()
            .filter_entry(|e| !e.file_type().is_dir() || !is_excluded(&e.file_name().to_string_lossy()));

        'files: for entry in walker {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(entry.path()) else {
                continue; // skip binary / unreadable files
            };
            for (i, line) in text.lines().enumerate() {
                if line.contains(&pattern) {
                    results.push(json!({
                        "path": entry.path().to_string_lossy(),
                        "line": i + 1,
                        "excerpt": line.trim(),
                    }));
                    if results.len() >= max_results {
                        break 'files;
                    }
                }
            }
        }

        let count = results.len();
        ToolOutput::ok(&call.id, json!({"results": results, "count": count}).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn finds_matching_line() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\nworld\nneedle here\n").unwrap();

        let t = FileSearchTool;
        let call = ToolCall {
            id: "1".into(),
            name: "file_search".into(),
            args: json!({"path": dir.path().to_str().unwrap(), "content": "needle"}),
        };
        let out = t.execute(&call).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("needle here"));
        assert!(out.content.contains("\"line\":3"));
    }

    #[tokio::test]
    async fn not_a_directory_is_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let t = FileSearchTool;
        let call = ToolCall {
            id: "1".into(),
            name: "file_search".into(),
            args: json!({"path": file.path().to_str().unwrap(), "content": "x"}),
        };
        let out = t.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("not a directory"));
    }

    #[tokio::test]
    async fn no_match_returns_empty_results() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "nothing interesting\n").unwrap();

        let t = FileSearchTool;
        let call = ToolCall {
            id: "1".into(),
            name: "file_search".into(),
            args: json!({"path": dir.path().to_str().unwrap(), "content": "zzz_no_such_pattern"}),
        };
        let out = t.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.contains("\"count\":0"));
    }

    #[tokio::test]
    async fn excludes_git_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "needle\n").unwrap();
        std::fs::write(dir.path().join("real.txt"), "needle\n").unwrap();

        let t = FileSearchTool;
        let call = ToolCall {
            id: "1".into(),
            name: "file_search".into(),
            args: json!({"path": dir.path().to_str().unwrap(), "content": "needle"}),
        };
        let out = t.execute(&call).await;
        assert!(out.content.contains("real.txt"));
        assert!(!out.content.contains(".git/config"));
    }
}
