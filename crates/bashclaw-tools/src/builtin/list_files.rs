// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::tool::{Tool, ToolCall, ToolOutput};

static EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules"];

fn is_excluded(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "Lists directory contents under 'path' and returns {entries[], count}.\n\
         depth: default 2, max 5. limit: 500 entries by default.\n\
         Excludes .git/, target/, node_modules/. Directories have a trailing '/'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list" },
                "depth": { "type": "integer", "description": "Maximum recursion depth (default 2, max 5)" },
                "limit": { "type": "integer", "description": "Maximum entries to return (default 500)" }
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
        let depth = call
            .args
            .get("depth")
            .and_then(|v| v.as_u64())
            .unwrap_or(2)
            .min(5) as usize;
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(500) as usize;

        debug!(path = %path, depth, limit, "list_files tool");

        match std::fs::metadata(&path) {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return ToolOutput::err(&call.id, format!("not a directory: {path}")),
            Err(e) => return ToolOutput::err(&call.id, format!("not a directory: {path} ({e})")),
        }

        let mut entries: Vec<String> = Vec::new();
        let walker = WalkDir::new(&path)
            .min_depth(1)
            .max_depth(depth.max(1))
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !is_excluded(&e.file_name().to_string_lossy())
            });

        for entry in walker {
            let Ok(entry) = entry else { continue };
            if entries.len() >= limit {
                break;
            }
            let rel = entry
                .path()
                .strip_prefix(&path)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            if rel.is_empty() {
                continue;
            }
            if entry.file_type().is_dir() {
                entries.push(format!("{rel}/"));
            } else {
                entries.push(rel);
            }
        }

        let count = entries.len();
        ToolOutput::ok(&call.id, json!({"entries": entries, "count": count}).to_string())
    }
}
