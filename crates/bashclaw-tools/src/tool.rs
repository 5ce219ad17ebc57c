// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// Hard byte ceiling applied to every tool result before it is appended to
/// the session as a `tool_result` entry.
pub const OUTPUT_CAP_BYTES: usize = 16 * 1024;

/// Truncate `s` to [`OUTPUT_CAP_BYTES`], appending an explicit marker stating
/// how much was cut. Truncation happens on a UTF-8 char boundary at or before
/// the cap so the result is always valid UTF-8.
pub fn truncate_output(s: &str) -> String {
    if s.len() <= OUTPUT_CAP_BYTES {
        return s.to_string();
    }
    let mut end = OUTPUT_CAP_BYTES;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}...[truncated at {OUTPUT_CAP_BYTES} bytes; {} bytes total]",
        &s[..end],
        s.len()
    )
}

/// The result of executing a tool. `content` is always plain text; tools that
/// need structured data encode it as a JSON string.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful result. Content is truncated to [`OUTPUT_CAP_BYTES`].
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: truncate_output(&content.into()),
            is_error: false,
        }
    }

    /// Error result containing a plain-text error message.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: truncate_output(&msg.into()),
            is_error: true,
        }
    }
}

/// Trait that every built-in tool must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn input_schema(&self) -> Value;
    /// Optional tools are excluded from the effective set unless explicitly
    /// named in `agent.tool_allow`. Non-optional tools are always included.
    fn optional(&self) -> bool {
        false
    }
    /// Whether this tool is advertised over the MCP bridge's `tools/list`.
    fn bridge_exposed(&self) -> bool {
        true
    }
    /// A tool is unavailable when a required dependency (env var, binary) is
    /// missing at construction time. Unavailable tools are dropped from the
    /// effective set regardless of `tool_allow`.
    fn unavailable(&self) -> bool {
        false
    }
    /// Execute the tool. Faults must be caught and reported via [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct MinimalTool;

    #[async_trait]
    impl Tool for MinimalTool {
        fn name(&self) -> &str {
            "minimal"
        }
        fn description(&self) -> &str {
            "a minimal tool"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "ok")
        }
    }

    #[test]
    fn defaults_are_non_optional_and_bridge_exposed_and_available() {
        let t = MinimalTool;
        assert!(!t.optional());
        assert!(t.bridge_exposed());
        assert!(!t.unavailable());
    }

    #[test]
    fn short_output_passes_through_unchanged() {
        assert_eq!(truncate_output("hello"), "hello");
    }

    #[test]
    fn long_output_is_truncated_with_marker() {
        let s = "x".repeat(OUTPUT_CAP_BYTES + 100);
        let truncated = truncate_output(&s);
        assert!(truncated.len() < s.len());
        assert!(truncated.contains("truncated at 16384 bytes"));
        assert!(truncated.contains(&format!("{} bytes total", s.len())));
    }

    #[test]
    fn truncate_respects_utf8_boundaries() {
        // Build a string whose cap falls in the middle of a multi-byte char.
        let mut s = "a".repeat(OUTPUT_CAP_BYTES - 1);
        s.push('€'); // 3-byte char straddling the cap
        s.push_str(&"b".repeat(100));
        let truncated = truncate_output(&s);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
    }

    #[test]
    fn tool_output_ok_is_not_error() {
        let out = ToolOutput::ok("1", "done");
        assert!(!out.is_error);
        assert_eq!(out.content, "done");
    }

    #[test]
    fn tool_output_err_sets_is_error() {
        let out = ToolOutput::err("1", "boom");
        assert!(out.is_error);
        assert_eq!(out.content, "boom");
    }
}
