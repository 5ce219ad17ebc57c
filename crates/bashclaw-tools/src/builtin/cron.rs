// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CronJob {
    id: String,
    schedule: String,
    command: String,
}

fn state_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("BASHCLAW_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bashclaw")
}

fn jobs_path() -> PathBuf {
    state_dir().join("cron").join("jobs.json")
}

async fn load_jobs() -> anyhow::Result<Vec<CronJob>> {
    match tokio::fs::read(jobs_path()).await {
        Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn save_jobs(jobs: &[CronJob]) -> anyhow::Result<()> {
    let path = jobs_path();
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(jobs)?).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

/// Built-in tool managing scheduled jobs. Execution of due jobs is out of
/// scope here; this tool only maintains the `cron/jobs.json` record that an
/// external scheduler daemon consumes.
pub struct CronTool;

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }

    fn description(&self) -> &str {
        "Manage scheduled jobs. Actions: add(schedule,command), list(), remove(id), run(id).\n\
         'schedule' is a standard 5-field cron expression. 'run' executes a job's command\n\
         immediately and does not alter its schedule."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list", "remove", "run"]
                },
                "id": { "type": "string" },
                "schedule": { "type": "string" },
                "command": { "type": "string" }
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

        debug!(action, "cron tool");

        let result = match action {
            "add" => do_add(&call.args).await,
            "list" => do_list().await,
            "remove" => do_remove(&call.args).await,
            "run" => do_run(&call.args).await,
            other => return ToolOutput::err(&call.id, format!("unknown action: {other}")),
        };

        match result {
            Ok(v) => ToolOutput::ok(&call.id, v.to_string()),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

/// The `cron` crate parses the 6-field `sec min hour dom month dow` format
/// (seconds mandatory); the tool's own contract is a standard 5-field
/// expression, so a 0-seconds field is prepended before validation.
fn to_six_field(schedule: &str) -> String {
    if schedule.split_whitespace().count() == 5 {
        format!("0 {schedule}")
    } else {
        schedule.to_string()
    }
}

async fn do_add(args: &Value) -> anyhow::Result<Value> {
    let schedule = args
        .get("schedule")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing 'schedule'"))?
        .to_string();
    let command = args
        .get("command")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing 'command'"))?
        .to_string();

    cron::Schedule::from_str(&to_six_field(&schedule))
        .map_err(|e| anyhow::anyhow!("invalid cron expression: {e}"))?;

    let job = CronJob {
        id: Uuid::new_v4().to_string(),
        schedule,
        command,
    };

    let mut jobs = load_jobs().await?;
    jobs.push(job.clone());
    save_jobs(&jobs).await?;

    Ok(json!({"id": job.id, "schedule": job.schedule, "command": job.command}))
}

async fn do_list() -> anyhow::Result<Value> {
    let jobs = load_jobs().await?;
    Ok(json!({"jobs": jobs}))
}

async fn do_remove(args: &Value) -> anyhow::Result<Value> {
    let id = args
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing 'id'"))?;

    let mut jobs = load_jobs().await?;
    let before = jobs.len();
    jobs.retain(|j| j.id != id);
    let removed = jobs.len() != before;
    save_jobs(&jobs).await?;

    Ok(json!({"id": id, "removed": removed}))
}

async fn do_run(args: &Value) -> anyhow::Result<Value> {
    let id = args
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing 'id'"))?;

    let jobs = load_jobs().await?;
    let job = jobs
        .iter()
        .find(|j| j.id == id)
        .ok_or_else(|| anyhow::anyhow!("no such job: {id}"))?;

    let output = tokio::process::Command::new("bash")
        .arg("-c")
        .arg(&job.command)
        .output()
        .await?;

    Ok(json!({
        "id": id,
        "exitCode": output.status.code().unwrap_or(-1),
        "output": String::from_utf8_lossy(&output.stdout),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn to_six_field_prepends_seconds_for_five_field_input() {
        assert_eq!(to_six_field("0 9 * * *"), "0 0 9 * * *");
        assert_eq!(to_six_field("0 0 9 * * *"), "0 0 9 * * *");
    }

    #[tokio::test]
    async fn add_accepts_standard_five_field_schedule() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("BASHCLAW_STATE_DIR", dir.path());

        let t = CronTool;
        let out = t
            .execute(&ToolCall {
                id: "1".into(),
                name: "cron".into(),
                args: json!({"action": "add", "schedule": "0 9 * * *", "command": "echo hi"}),
            })
            .await;
        assert!(!out.is_error, "{}", out.content);

        std::env::remove_var("BASHCLAW_STATE_DIR");
    }

    #[tokio::test]
    async fn add_then_list_shows_job() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("BASHCLAW_STATE_DIR", dir.path());

        let t = CronTool;
        let out = t
            .execute(&ToolCall {
                id: "1".into(),
                name: "cron".into(),
                args: json!({"action": "add", "schedule": "0 0 * * * *", "command": "echo hi"}),
            })
            .await;
        assert!(!out.is_error, "{}", out.content);

        let out = t
            .execute(&ToolCall {
                id: "2".into(),
                name: "cron".into(),
                args: json!({"action": "list"}),
            })
            .await;
        assert!(out.content.contains("echo hi"));

        std::env::remove_var("BASHCLAW_STATE_DIR");
    }

    #[tokio::test]
    async fn invalid_schedule_is_error() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("BASHCLAW_STATE_DIR", dir.path());

        let t = CronTool;
        let out = t
            .execute(&ToolCall {
                id: "1".into(),
                name: "cron".into(),
                args: json!({"action": "add", "schedule": "not a schedule", "command": "echo hi"}),
            })
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid cron expr"));

        std::env::remove_var("BASHCLAW_STATE_DIR");
    }

    #[tokio::test]
    async fn remove_unknown_job_reports_not_removed() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("BASHCLAW_STATE_DIR", dir.path());

        let t = CronTool;
        let out = t
            .execute(&ToolCall {
                id: "1".into(),
                name: "cron".into(),
                args: json!({"action": "remove", "id": "nonexistent"}),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("\"removed\":false"));

        std::env::remove_var("BASHCLAW_STATE_DIR");
    }
}
