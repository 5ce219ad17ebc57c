// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Minimal binary entry point: wires config, the tool registry, and the
//! agent runtime, then either serves the MCP stdio bridge or runs a single
//! turn for manual testing. No subcommand tree — channel ingestion (chat
//! platforms, the HTTP/WS API, the CLI loop) lives outside this crate's
//! scope; this binary only proves the runtime wires together end to end.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use anyhow::Context;
use bashclaw_config::Config;
use bashclaw_core::{
    AgentMessageTool, AgentRuntime, MessageTool, SessionStatusTool, SessionsListTool,
    SpawnStatusTool, SpawnTool,
};
use bashclaw_tools::{
    AgentsListTool, CronTool, FileSearchTool, ListFilesTool, ListToolsTool, MemoryTool,
    ReadFileTool, ShellTool, ToolRegistry, WebFetchTool, WebSearchTool, WriteFileTool,
};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = bashclaw_config::load(None).context("loading configuration")?;
    let state_root = state_root();
    let sessions_root = state_root.join("sessions");

    // Sub-agents spawned via `spawn` run against an inner runtime built from
    // a registry that has no `spawn`/`spawn_status` of its own — this bounds
    // spawn recursion to one level without needing a cyclic Arc.
    let mut inner_registry = base_registry(&config, &sessions_root);
    register_list_tools(&mut inner_registry);
    let inner_registry = Arc::new(inner_registry);
    let inner_runtime = Arc::new(AgentRuntime::new(
        inner_registry,
        config.agents.clone(),
        config.session.clone(),
        state_root.clone(),
    ));

    let mut registry = base_registry(&config, &sessions_root);
    registry.register(SpawnTool {
        runtime: inner_runtime,
        state_root: state_root.clone(),
        depth: Arc::new(AtomicUsize::new(0)),
    });
    registry.register(SpawnStatusTool {
        state_root: state_root.clone(),
    });
    register_list_tools(&mut registry);
    let registry = Arc::new(registry);

    let runtime = Arc::new(AgentRuntime::new(
        registry.clone(),
        config.agents,
        config.session,
        state_root,
    ));

    if std::env::args().nth(1).as_deref() == Some("mcp") {
        return bashclaw_mcp::serve_stdio(registry).await;
    }

    run_one_shot(runtime).await
}

/// The fixed set of origin platforms a message can be addressed to.
const KNOWN_CHANNELS: [&str; 6] = ["telegram", "discord", "slack", "web", "cli", "mcp"];

/// Tools that don't depend on the spawn tool's own runtime handle: every
/// built-in plus the session-aware core tools.
fn base_registry(config: &Config, sessions_root: &Path) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool);
    registry.register(WriteFileTool);
    registry.register(ListFilesTool);
    registry.register(FileSearchTool);
    registry.register(ShellTool::default());
    registry.register(WebFetchTool);
    registry.register(WebSearchTool::default());
    registry.register(MemoryTool);
    registry.register(CronTool);

    let agent_ids: Vec<String> = config.agents.overrides.keys().cloned().collect();
    registry.register(AgentsListTool { agent_ids });

    registry.register(MessageTool {
        known_channels: KNOWN_CHANNELS.iter().map(|s| s.to_string()).collect(),
    });
    registry.register(SessionsListTool {
        sessions_root: sessions_root.to_path_buf(),
    });
    registry.register(SessionStatusTool {
        sessions_root: sessions_root.to_path_buf(),
    });
    registry.register(AgentMessageTool {
        sessions_root: sessions_root.to_path_buf(),
    });
    registry
}

/// `list_tools` snapshots the registry's schemas at registration time, so it
/// must be registered last — after every other tool the final registry will
/// carry, `spawn`/`spawn_status` included — or it silently under-reports.
fn register_list_tools(registry: &mut ToolRegistry) {
    let schemas = registry.schemas_for(&registry.names());
    registry.register(ListToolsTool { schemas });
}

/// Runs a single turn for manual testing: reads the whole of stdin as the
/// user message and prints the assistant's reply to stdout.
async fn run_one_shot(runtime: Arc<AgentRuntime>) -> anyhow::Result<()> {
    use tokio::io::AsyncReadExt;

    let agent_id = std::env::var("BASHCLAW_AGENT").unwrap_or_else(|_| "default".to_string());
    let channel = std::env::var("BASHCLAW_CHANNEL").unwrap_or_else(|_| "cli".to_string());
    let sender = std::env::var("BASHCLAW_SENDER").unwrap_or_else(|_| "local".to_string());

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("reading stdin")?;

    let reply = runtime.run(&agent_id, input.trim(), &channel, &sender).await;
    println!("{reply}");
    Ok(())
}

/// Defaults to `~/.bashclaw`, matching the built-in tools' own fallback
/// (`memory`/`cron` resolve the same default independently since they don't
/// receive `state_root` through the registry).
fn state_root() -> PathBuf {
    std::env::var_os("BASHCLAW_STATE_DIR")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|d| d.join(".bashclaw")))
        .unwrap_or_else(|| PathBuf::from(".bashclaw"))
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("BASHCLAW_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
