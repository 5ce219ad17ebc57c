// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tools that need session-store or sub-agent access, and therefore live in
//! this crate rather than `bashclaw-tools` (which must not depend on it).
//! Shape and error idioms follow `bashclaw-tools::builtin`'s builtins
//! (`ToolOutput::ok`/`err`, `action`-dispatch for multi-verb tools).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bashclaw_tools::{Tool, ToolCall, ToolOutput};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::agent::AgentRuntime;
use crate::session_store::{session_path, Entry, SessionScope as StoreScope, SessionStore};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Delivers a message to a named outbound channel. Grounded on the
/// `{channel, target, text} → delivery id` contract; actual channel
/// transports are out of scope, so this records intent and hands back an id.
pub struct MessageTool {
    pub known_channels: HashSet<String>,
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Sends text to a target on a named channel. Returns {delivery_id}."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel": { "type": "string" },
                "target": { "type": "string" },
                "text": { "type": "string" }
            },
            "required": ["channel", "target", "text"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let channel = match call.args.get("channel").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolOutput::err(&call.id, "missing 'channel'"),
        };
        if !self.known_channels.contains(channel) {
            return ToolOutput::err(&call.id, format!("unknown channel: {channel}"));
        }
        let target = call.args.get("target").and_then(|v| v.as_str()).unwrap_or("");
        let text = call.args.get("text").and_then(|v| v.as_str()).unwrap_or("");
        let delivery_id = Uuid::new_v4().to_string();
        debug!(channel, target, len = text.len(), delivery_id, "message tool");
        ToolOutput::ok(&call.id, json!({"delivery_id": delivery_id}).to_string())
    }
}

fn spawn_dir(state_root: &std::path::Path, task_id: &str) -> PathBuf {
    state_root.join("spawn").join(task_id)
}

async fn write_status(dir: &std::path::Path, status: &Value) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let tmp = dir.join("status.json.tmp");
    let path = dir.join("status.json");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(status)?).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

const MAX_SPAWN_DEPTH: usize = 3;

/// Launches a bounded sub-agent run in the background and returns
/// immediately with `{task_id}`. Grounded on the teacher's `task_tool.rs`
/// `TaskTool`/`MAX_DEPTH` nesting cap, reshaped from a synchronous
/// `agent.submit(...).await` into a fire-and-forget `tokio::spawn` task
/// that `spawn_status` polls, since spec's `spawn` must return immediately.
pub struct SpawnTool {
    pub runtime: Arc<AgentRuntime>,
    pub state_root: PathBuf,
    pub depth: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }

    fn description(&self) -> &str {
        "Starts a sub-agent on a focused task in the background. Returns {task_id} \
         immediately; poll spawn_status for the result."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": { "type": "string" },
                "agent": { "type": "string", "description": "Sub-agent id (defaults to 'main')" }
            },
            "required": ["task"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let task = match call.args.get("task").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => return ToolOutput::err(&call.id, "empty task"),
        };
        let agent_id = call
            .args
            .get("agent")
            .and_then(|v| v.as_str())
            .unwrap_or("main")
            .to_string();

        let depth = self.depth.load(Ordering::Relaxed);
        let task_id = Uuid::new_v4().to_string();
        let dir = spawn_dir(&self.state_root, &task_id);

        if depth >= MAX_SPAWN_DEPTH {
            if let Err(e) = write_status(&dir, &json!({"status": "error", "output": format!("maximum sub-agent depth ({MAX_SPAWN_DEPTH}) reached")})).await {
                return ToolOutput::err(&call.id, format!("failed to record spawn status: {e}"));
            }
            return ToolOutput::ok(&call.id, json!({"task_id": task_id}).to_string());
        }

        if let Err(e) = write_status(&dir, &json!({"status": "running"})).await {
            return ToolOutput::err(&call.id, format!("failed to start spawn: {e}"));
        }

        let runtime = Arc::clone(&self.runtime);
        let depth_counter = Arc::clone(&self.depth);
        let dir_for_task = dir.clone();
        depth_counter.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            // §4.5's Open Question #3: a spawned sub-agent starts a fresh,
            // isolated session scope rather than inheriting the parent's.
            let output = runtime.run(&agent_id, &task, "spawn", &task_id).await;
            let _ = write_status(&dir_for_task, &json!({"status": "done", "output": output})).await;
            depth_counter.fetch_sub(1, Ordering::Relaxed);
        });

        ToolOutput::ok(&call.id, json!({"task_id": task_id}).to_string())
    }
}

/// Polls a spawned task's recorded status.
pub struct SpawnStatusTool {
    pub state_root: PathBuf,
}

#[async_trait]
impl Tool for SpawnStatusTool {
    fn name(&self) -> &str {
        "spawn_status"
    }

    fn description(&self) -> &str {
        "Returns {status: running|done|error, output?} for a task_id returned by spawn."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "task_id": { "type": "string" } },
            "required": ["task_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let task_id = match call.args.get("task_id").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolOutput::err(&call.id, "missing 'task_id'"),
        };
        let path = spawn_dir(&self.state_root, task_id).join("status.json");
        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(v) => ToolOutput::ok(&call.id, v.to_string()),
                Err(e) => ToolOutput::err(&call.id, format!("corrupt status record: {e}")),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ToolOutput::err(&call.id, format!("unknown id: {task_id}"))
            }
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

/// Lists every agent id with at least one session file on disk, by walking
/// the session store root one directory deep.
pub struct SessionsListTool {
    pub sessions_root: PathBuf,
}

#[async_trait]
impl Tool for SessionsListTool {
    fn name(&self) -> &str {
        "sessions_list"
    }

    fn description(&self) -> &str {
        "Lists agent ids that have at least one session file on disk."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let mut agents = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&self.sessions_root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolOutput::ok(&call.id, json!({"agents": Vec::<String>::new()}).to_string());
            }
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };
        while let Some(entry) = match read_dir.next_entry().await {
            Ok(e) => e,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        } {
            let name = entry.file_name().to_string_lossy().to_string();
            let agent_id = name.strip_suffix(".jsonl").map(str::to_string).unwrap_or(name);
            agents.push(agent_id);
        }
        agents.sort();
        agents.dedup();
        ToolOutput::ok(&call.id, json!({"agents": agents}).to_string())
    }
}

/// Reports whether a given `(agent_id, channel, sender)` session exists and
/// how many entries it holds. Always resolves the path under `PerSender`
/// scope (the configured default) regardless of the runtime's actual
/// `session.scope` setting, since this is a diagnostic tool taking explicit
/// coordinates rather than a live agent run.
pub struct SessionStatusTool {
    pub sessions_root: PathBuf,
}

#[async_trait]
impl Tool for SessionStatusTool {
    fn name(&self) -> &str {
        "session_status"
    }

    fn description(&self) -> &str {
        "Returns {exists, entry_count, last_ts_ms?} for a given agent/channel/sender session."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": { "type": "string" },
                "channel": { "type": "string" },
                "sender": { "type": "string" }
            },
            "required": ["agent_id", "channel"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let agent_id = match call.args.get("agent_id").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolOutput::err(&call.id, "missing 'agent_id'"),
        };
        let channel = call.args.get("channel").and_then(|v| v.as_str()).unwrap_or("");
        let sender = call.args.get("sender").and_then(|v| v.as_str()).unwrap_or("");

        let path = session_path(&self.sessions_root, agent_id, channel, sender, StoreScope::PerSender);
        let store = SessionStore::new(path);
        match store.load(None).await {
            Ok(entries) if entries.is_empty() => {
                ToolOutput::ok(&call.id, json!({"exists": false, "entry_count": 0}).to_string())
            }
            Ok(entries) => {
                let last_ts = entries.last().map(Entry::ts_ms);
                ToolOutput::ok(
                    &call.id,
                    json!({"exists": true, "entry_count": entries.len(), "last_ts_ms": last_ts}).to_string(),
                )
            }
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

/// Injects a `user` entry directly into another agent's session without
/// running the tool loop — an introspection/testing primitive, not a full
/// turn. Distinct from `spawn`, which *does* run the loop. Resolves the
/// session path under `PerSender` scope, same caveat as `SessionStatusTool`.
pub struct AgentMessageTool {
    pub sessions_root: PathBuf,
}

#[async_trait]
impl Tool for AgentMessageTool {
    fn name(&self) -> &str {
        "agent_message"
    }

    fn description(&self) -> &str {
        "Appends a user entry to another agent's session without triggering a model \
         turn. Returns {appended: true}."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": { "type": "string" },
                "channel": { "type": "string" },
                "sender": { "type": "string" },
                "text": { "type": "string" }
            },
            "required": ["agent_id", "channel", "text"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let agent_id = match call.args.get("agent_id").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolOutput::err(&call.id, "missing 'agent_id'"),
        };
        let channel = call.args.get("channel").and_then(|v| v.as_str()).unwrap_or("");
        let sender = call.args.get("sender").and_then(|v| v.as_str()).unwrap_or("");
        let text = match call.args.get("text").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolOutput::err(&call.id, "missing 'text'"),
        };

        let path = session_path(&self.sessions_root, agent_id, channel, sender, StoreScope::PerSender);
        let store = SessionStore::new(path);
        match store
            .append(Entry::User { content: text.to_string(), ts_ms: now_ms() })
            .await
        {
            Ok(()) => ToolOutput::ok(&call.id, json!({"appended": true}).to_string()),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}
