// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryEntry {
    value: String,
    updated_at: i64,
}

fn state_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("BASHCLAW_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bashclaw")
}

fn memory_dir() -> PathBuf {
    state_dir().join("memory")
}

/// Reject keys that would escape `memory/` via path traversal or separators.
fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.contains('/')
        && !key.contains('\\')
        && key != "."
        && key != ".."
}

fn key_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

/// Built-in tool backing persistent key-value memory. Each key lives in its
/// own `memory/<key>.json` file; writes go through a lock-then-rename so a
/// concurrent reader never observes a half-written file.
pub struct MemoryTool;

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Persistent key-value memory store, surviving process restarts.\n\
         Actions: set(key,value), get(key), delete(key), list(), search(query).\n\
         Each key is stored as its own JSON file under the memory state directory."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["set", "get", "delete", "list", "search"]
                },
                "key": { "type": "string" },
                "value": { "type": "string" },
                "query": { "type": "string" }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let action = match call.args.get("action").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolOutput::err(&call.id, "missing 'action'"),
        };

        debug!(action, "memory tool");

        let result = match action {
            "set" => do_set(&call.args).await,
            "get" => do_get(&call.args).await,
            "delete" => do_delete(&call.args).await,
            "list" => do_list().await,
            "search" => do_search(&call.args).await,
            other => return ToolOutput::err(&call.id, format!("unknown action: {other}")),
        };

        match result {
            Ok(v) => ToolOutput::ok(&call.id, v.to_string()),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

fn require_key(args: &Value) -> anyhow::Result<String> {
    let key = args
        .get("key")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing 'key'"))?;
    if !valid_key(key) {
        anyhow::bail!("invalid key: {key}");
    }
    Ok(key.to_string())
}

async fn do_set(args: &Value) -> anyhow::Result<Value> {
    let key = require_key(args)?;
    let value = args
        .get("value")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing 'value'"))?
        .to_string();

    let dir = memory_dir();
    tokio::fs::create_dir_all(&dir).await?;

    let entry = MemoryEntry {
        value,
        updated_at: current_epoch_secs(),
    };
    let path = key_path(&dir, &key);
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(&entry)?).await?;
    tokio::fs::rename(&tmp, &path).await?;

    Ok(json!({"key": key, "updated_at": entry.updated_at}))
}

async fn do_get(args: &Value) -> anyhow::Result<Value> {
    let key = require_key(args)?;
    let path = key_path(&memory_dir(), &key);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let entry: MemoryEntry = serde_json::from_slice(&bytes)?;
            Ok(json!({"key": key, "value": entry.value, "updated_at": entry.updated_at}))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            anyhow::bail!("no such key: {key}")
        }
        Err(e) => Err(e.into()),
    }
}

async fn do_delete(args: &Value) -> anyhow::Result<Value> {
    let key = require_key(args)?;
    let path = key_path(&memory_dir(), &key);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(json!({"key": key, "deleted": true})),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(json!({"key": key, "deleted": false}))
        }
        Err(e) => Err(e.into()),
    }
}

async fn list_entries() -> anyhow::Result<Vec<(String, MemoryEntry)>> {
    let dir = memory_dir();
    let mut out = Vec::new();
    let mut read_dir = match tokio::fs::read_dir(&dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let bytes = tokio::fs::read(&path).await?;
        if let Ok(mem) = serde_json::from_slice::<MemoryEntry>(&bytes) {
            out.push((stem.to_string(), mem));
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

async fn do_list() -> anyhow::Result<Value> {
    let entries = list_entries().await?;
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    Ok(json!({"keys": keys}))
}

async fn do_search(args: &Value) -> anyhow::Result<Value> {
    let query = args
        .get("query")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing 'query'"))?
        .to_lowercase();

    let entries = list_entries().await?;
    let matches: Vec<Value> = entries
        .into_iter()
        .filter(|(k, v)| {
            k.to_lowercase().contains(&query) || v.value.to_lowercase().contains(&query)
        })
        .map(|(k, v)| json!({"key": k, "value": v.value, "updated_at": v.updated_at}))
        .collect();
    Ok(json!({"results": matches}))
}

fn current_epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
