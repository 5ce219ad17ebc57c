// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `bashclaw-mcp` — MCP (Model Context Protocol) stdio bridge.
//!
//! Exposes a [`bashclaw_tools::ToolRegistry`] to any MCP-compatible host
//! over line-delimited JSON-RPC on stdin/stdout.
//!
//! # Architecture
//!
//! ```text
//! MCP client (Cursor, Claude Desktop, …)
//!       │  stdin/stdout (line-delimited JSON-RPC)
//!       ▼
//! stdio::run()
//!       │
//!       ▼
//! ToolRegistry  ──►  Tool::execute()
//! ```

pub mod bridge;
mod stdio;

use std::sync::Arc;

use anyhow::Result;
use bashclaw_tools::ToolRegistry;

/// Starts the MCP stdio bridge, serving the tools in `registry` on
/// `stdin`/`stdout`. Blocks until stdin reaches EOF.
pub async fn serve_stdio(registry: Arc<ToolRegistry>) -> Result<()> {
    stdio::run(registry, tokio::io::stdin(), tokio::io::stdout()).await
}
