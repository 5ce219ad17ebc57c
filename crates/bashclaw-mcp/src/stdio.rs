// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Single-threaded NDJSON JSON-RPC 2.0 server over stdin/stdout. One line in
//! is one message; responses are emitted only for requests that carry an
//! `id` (never for notifications). New logic — the teacher builds its MCP
//! server on `rmcp`'s `ServiceExt::serve`/`ServerHandler` transport; this is
//! a hand-rolled loop per spec's minimal bridge contract.

use std::sync::{Arc, OnceLock};

use bashclaw_tools::{ToolCall, ToolRegistry};
use regex::Regex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::bridge::{output_to_call_result, schema_to_mcp_tool};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "bashclaw-agent";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn tool_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Runs the bridge to completion: reads NDJSON requests from `input`,
/// writes NDJSON responses to `output`, until `input` reaches EOF.
pub async fn run<R, W>(registry: Arc<ToolRegistry>, input: R, mut output: W) -> anyhow::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    let mut cached_tools_list: Option<Value> = None;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "malformed JSON-RPC line");
                continue;
            }
        };

        let id = request.get("id").cloned();
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");

        // A notification (no id) never gets a response.
        let Some(id) = id else { continue };

        let response = dispatch(&registry, method, request.get("params"), &mut cached_tools_list).await;
        let envelope = match response {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err((code, message)) => {
                json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
            }
        };

        let mut line = serde_json::to_string(&envelope)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }

    Ok(())
}

async fn dispatch(
    registry: &Arc<ToolRegistry>,
    method: &str,
    params: Option<&Value>,
    cached_tools_list: &mut Option<Value>,
) -> Result<Value, (i64, String)> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
        })),
        "tools/list" => {
            if cached_tools_list.is_none() {
                let tools: Vec<Value> = registry
                    .bridge_schemas()
                    .iter()
                    .map(schema_to_mcp_tool)
                    .collect();
                *cached_tools_list = Some(json!({ "tools": tools }));
            }
            Ok(cached_tools_list.clone().unwrap())
        }
        "tools/call" => {
            let params = params.ok_or((-32602, "missing params".to_string()))?;
            let name = params
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or((-32602, "missing tool name".to_string()))?;
            if !tool_name_re().is_match(name) {
                return Err((-32602, format!("invalid tool name: {name}")));
            }
            let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            let call = ToolCall {
                id: uuid_like_id(),
                name: name.to_string(),
                args,
            };
            let output = registry.execute(&call).await;
            Ok(output_to_call_result(output))
        }
        "resources/list" => Ok(json!({ "resources": [] })),
        "prompts/list" => Ok(json!({ "prompts": [] })),
        other => Err((-32601, format!("Method not found: {other}"))),
    }
}

/// A simple unique-enough id for a tool call originating from the bridge
/// (the caller never round-trips this; it is only used in logs / the
/// session store if the registry dispatches into session-aware tools).
fn uuid_like_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("mcp-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
