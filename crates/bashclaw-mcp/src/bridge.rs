// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Conversions between the tool registry's types and the MCP wire shapes
//! used by `tools/list` and `tools/call`. Grounded on the teacher's
//! `sven-mcp/src/bridge.rs` schema/output conversion pair, simplified to
//! plain `serde_json::Value` construction since this crate hand-rolls the
//! JSON-RPC transport instead of building on `rmcp`'s server runtime, and
//! since [`bashclaw_tools::ToolOutput`] has no image-part variant to bridge.

use bashclaw_tools::{ToolOutput, ToolSchema};
use serde_json::{json, Value};

/// Converts a [`ToolSchema`] into the `{name, description, inputSchema}`
/// shape `tools/list` returns.
pub fn schema_to_mcp_tool(schema: &ToolSchema) -> Value {
    json!({
        "name": schema.name,
        "description": schema.description,
        "inputSchema": schema.parameters,
    })
}

/// Converts a [`ToolOutput`] into the `tools/call` result shape: content is
/// always a single text part, newlines flattened to spaces so the whole
/// response stays on one NDJSON line, with `isError` mirroring the tool's
/// error flag.
pub fn output_to_call_result(output: ToolOutput) -> Value {
    let flattened = output.content.replace('\n', " ");
    json!({
        "content": [{ "type": "text", "text": flattened }],
        "isError": output.is_error,
    })
}
