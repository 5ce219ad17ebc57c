// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
#[cfg(unix)]
use libc;
use regex::Regex;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Hard byte ceiling for combined stdout + stderr kept by head/tail truncation,
/// independent of the registry-wide 16 KiB result cap applied afterwards.
const OUTPUT_LIMIT_BYTES: usize = 20_000;
const HEAD_LINES: usize = 100;
const TAIL_LINES: usize = 100;

/// Patterns rejected before a command is ever spawned. Checked against the raw
/// command string; on a match the tool returns an error without forking a
/// process.
fn blocklist() -> &'static Vec<Regex> {
    static BLOCKLIST: OnceLock<Vec<Regex>> = OnceLock::new();
    BLOCKLIST.get_or_init(|| {
        vec![
            Regex::new(r"\brm\s+-[a-zA-Z]*r[a-zA-Z]*f?\s+/").unwrap(),
            Regex::new(r"\bmkfs\b").unwrap(),
            Regex::new(r"\bdd\s+if=").unwrap(),
            Regex::new(r":\(\)\s*\{\s*:\|:").unwrap(),
            Regex::new(r"/dev/sd[a-z]").unwrap(),
            Regex::new(r"/dev/nvme").unwrap(),
            Regex::new(r"/dev/disk").unwrap(),
        ]
    })
}

fn blocked(command: &str) -> bool {
    blocklist().iter().any(|re| re.is_match(command))
}

/// Built-in tool that runs a shell command.
pub struct ShellTool {
    pub timeout_secs: u64,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return {\"output\": <text>, \"exitCode\": <int>}.\n\
         'command' is required. Output is head/tail-truncated at ~20 KB so both the command\n\
         preamble and the final result are preserved. Default timeout 60s.\n\
         A fixed blocklist rejects destructive commands (rm -rf /, mkfs, dd if= to a block\n\
         device, fork bombs, raw writes to /dev/sd*, /dev/nvme*, /dev/disk*) before execution."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "workdir": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to cwd)"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (optional, default 60)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'command'"),
        };
        let workdir = call
            .args
            .get("workdir")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let timeout = call
            .args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);

        if blocked(&command) {
            return ToolOutput::err(
                &call.id,
                json!({"output": "blocked", "exitCode": -1}).to_string(),
            );
        }

        debug!(cmd = %command, "executing shell tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
        if let Some(wd) = &workdir {
            cmd.current_dir(wd);
        }

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(timeout), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let mut content = String::new();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                if !stdout.is_empty() {
                    content.push_str(&head_tail_truncate(&stdout));
                }
                if !stderr.is_empty() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str("[stderr]\n");
                    content.push_str(&head_tail_truncate(&stderr));
                }

                let code = output.status.code().unwrap_or(-1);
                let body = json!({"output": content, "exitCode": code}).to_string();
                if code == 0 {
                    ToolOutput::ok(&call.id, body)
                } else {
                    ToolOutput::err(&call.id, body)
                }
            }
            Ok(Err(e)) => ToolOutput::err(
                &call.id,
                json!({"output": format!("spawn error: {e}"), "exitCode": -1}).to_string(),
            ),
            Err(_) => ToolOutput::err(
                &call.id,
                json!({"output": format!("timeout after {timeout}s"), "exitCode": -1})
                    .to_string(),
            ),
        }
    }
}

/// Keep the first [`HEAD_LINES`] and last [`TAIL_LINES`] when output exceeds
/// [`OUTPUT_LIMIT_BYTES`], with an omission marker showing what was dropped.
pub(crate) fn head_tail_truncate(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT_BYTES {
        return s.to_string();
    }

    let lines: Vec<&str> = s.lines().collect();
    let total = lines.len();

    if total <= HEAD_LINES + TAIL_LINES {
        let tail_start = s.len().saturating_sub(OUTPUT_LIMIT_BYTES / 2);
        let tail_str = &s[tail_start..];
        let head_end = OUTPUT_LIMIT_BYTES / 2;
        let head_str = &s[..head_end.min(s.len())];
        let omitted_bytes = s.len() - head_str.len() - tail_str.len();
        return format!(
            "{}\n...[{} bytes omitted]...\n{}",
            head_str, omitted_bytes, tail_str
        );
    }

    let head: Vec<&str> = lines[..HEAD_LINES].to_vec();
    let tail: Vec<&str> = lines[total - TAIL_LINES..].to_vec();
    let omitted_lines = total - HEAD_LINES - TAIL_LINES;
    let shown_bytes = head.join("\n").len() + tail.join("\n").len();
    let omitted_bytes = s.len().saturating_sub(shown_bytes);

    format!(
        "{}\n...[{} lines / ~{} bytes omitted]...\n{}",
        head.join("\n"),
        omitted_lines,
        omitted_bytes,
        tail.join("\n")
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
