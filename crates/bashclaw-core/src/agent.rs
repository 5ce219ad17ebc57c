// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The bounded tool-use loop: `INIT → PREPARE → CALL_MODEL → DISPATCH_TOOLS →
//! … → FINALIZE`. Turn-taking structure grounded on the teacher's
//! `sven-core/src/agent.rs`; streaming, compaction, and parallel tool
//! dispatch are not carried over (out of scope).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bashclaw_config::{AgentsSection, SessionConfig};
use bashclaw_model::catalog::{api_format_for_provider, ApiFormat};
use bashclaw_model::{default_api_key_env, provider_for_model_id, Block, Message, Role};
use bashclaw_tools::{ToolCall, ToolRegistry};
use tracing::{error, warn};

use crate::prompts::system_prompt;
use crate::session_store::{session_path, Entry, SessionScope, SessionStore};

/// Synthetic text appended when the iteration budget is exhausted mid-loop.
const BUDGET_EXHAUSTED_TEXT: &str = "tool-loop budget exhausted";

/// Note appended to user text when images were stripped for a vision-less model.
const IMAGE_OMITTED_NOTE: &str = "[image omitted: model lacks vision]";

fn default_max_iters() -> usize {
    std::env::var("AGENT_MAX_TOOL_ITERATIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn to_session_scope(scope: bashclaw_config::SessionScope) -> SessionScope {
    match scope {
        bashclaw_config::SessionScope::PerSender => SessionScope::PerSender,
        bashclaw_config::SessionScope::PerChannel => SessionScope::PerChannel,
        bashclaw_config::SessionScope::Global => SessionScope::Global,
    }
}

/// Which base tool names a named `tool_profile` contributes before
/// `tool_allow`/`tool_deny` apply. Not defined by spec.md as a formal table;
/// this mapping is an Open Question decision (see DESIGN.md).
fn profile_tools(profile: Option<&str>, registry: &ToolRegistry) -> Vec<String> {
    match profile {
        Some("minimal") => Vec::new(),
        Some("coding") => vec![
            "read_file".into(),
            "write_file".into(),
            "list_files".into(),
            "file_search".into(),
            "shell".into(),
        ],
        // "full", unset, or an unrecognized name all fail open to every tool
        // rather than silently stripping an agent down to nothing.
        _ => registry.names(),
    }
}

/// `ANTHROPIC_BASE_URL` is a proxy override for any provider speaking the
/// Anthropic wire format, not just the literal `anthropic` provider id.
fn anthropic_base_url_override(provider_id: &str) -> Option<String> {
    if api_format_for_provider(provider_id) != ApiFormat::Anthropic {
        return None;
    }
    std::env::var("ANTHROPIC_BASE_URL").ok()
}

fn to_model_tool_schema(s: bashclaw_tools::ToolSchema) -> bashclaw_model::ToolSchema {
    bashclaw_model::ToolSchema {
        name: s.name,
        description: s.description,
        parameters: s.parameters,
    }
}

/// Drives the tool loop for a gateway's worth of agents, sharing one tool
/// registry and one durable session store rooted at `state_root`.
pub struct AgentRuntime {
    pub tools: Arc<ToolRegistry>,
    pub agents: AgentsSection,
    pub session_cfg: SessionConfig,
    pub state_root: PathBuf,
}

impl AgentRuntime {
    pub fn new(
        tools: Arc<ToolRegistry>,
        agents: AgentsSection,
        session_cfg: SessionConfig,
        state_root: PathBuf,
    ) -> Self {
        Self {
            tools,
            agents,
            session_cfg,
            state_root,
        }
    }

    fn sessions_root(&self) -> PathBuf {
        self.state_root.join("sessions")
    }

    fn store_for(&self, agent_id: &str, channel: &str, sender: &str) -> SessionStore {
        let path = session_path(
            &self.sessions_root(),
            agent_id,
            channel,
            sender,
            to_session_scope(self.session_cfg.scope),
        );
        SessionStore::new(path)
    }

    /// Entry point: `run(agent_id, user_text, channel, sender) → assistant_text`.
    pub async fn run(&self, agent_id: &str, user_text: &str, channel: &str, sender: &str) -> String {
        // ── INIT ──────────────────────────────────────────────────────────
        let config = self.agents.resolve(agent_id);
        let engine = config.engine.as_deref().unwrap_or("builtin");
        if engine != "builtin" && engine != "auto" {
            return self
                .delegate_external(engine, agent_id, user_text, channel, sender)
                .await;
        }

        // ── PREPARE ───────────────────────────────────────────────────────
        let store = self.store_for(agent_id, channel, sender);
        let _ = store
            .check_idle_reset(self.session_cfg.idle_reset_minutes as i64, now_ms())
            .await;

        if let Err(e) = store
            .append(Entry::User {
                content: user_text.to_string(),
                ts_ms: now_ms(),
            })
            .await
        {
            error!(error = %e, "failed to append user entry");
            return "internal error: could not persist session entry".to_string();
        }

        let history = match store.load_as_messages(Some(self.session_cfg.max_history)).await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "session corrupted, starting from empty history");
                vec![Message::user(user_text)]
            }
        };
        let mut messages = history;

        let effective_names =
            self.tools
                .effective_tools(&profile_tools(config.tool_profile.as_deref(), &self.tools), &config.tool_allow, &config.tool_deny);
        let schemas: Vec<bashclaw_model::ToolSchema> = self
            .tools
            .schemas_for(&effective_names)
            .into_iter()
            .map(to_model_tool_schema)
            .collect();

        let model_id = match config
            .model_id
            .clone()
            .or_else(|| std::env::var("MODEL_ID").ok())
        {
            Some(id) => id,
            None => return "config error: no model configured for this agent".to_string(),
        };

        let (provider_id, _) = match model_id.split_once('/') {
            Some(parts) => parts,
            None => return format!("config error: invalid model id {model_id:?}"),
        };
        let api_key = std::env::var(default_api_key_env(provider_id)).ok();
        let base_url = anthropic_base_url_override(provider_id);

        let provider = match provider_for_model_id(
            &model_id,
            api_key,
            base_url,
            config.max_tokens,
            config.temperature,
        ) {
            Ok(p) => p,
            Err(e) => return format!("config error: {e}"),
        };

        if !provider.supports_images() {
            strip_images(&mut messages);
        }

        let system = system_prompt(config.system_prompt.as_deref(), &effective_names);

        // ── CALL_MODEL / DISPATCH_TOOLS loop ─────────────────────────────
        let max_iters = default_max_iters();
        let mut iter = 0usize;
        let final_text;

        loop {
            let response = match provider.complete(&messages, &schemas, &system).await {
                Ok(r) => r,
                Err(e) => {
                    let text = format!("provider error: {e}");
                    let _ = store
                        .append(Entry::Assistant {
                            content: text.clone(),
                            ts_ms: now_ms(),
                        })
                        .await;
                    final_text = text;
                    break;
                }
            };

            let text = response.text();
            let _ = store
                .append(Entry::Assistant {
                    content: text.clone(),
                    ts_ms: now_ms(),
                })
                .await;

            let tool_uses: Vec<(String, String, serde_json::Value)> = response
                .tool_uses()
                .into_iter()
                .filter_map(|b| match b {
                    Block::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();
            for (id, name, input) in &tool_uses {
                let _ = store
                    .append(Entry::ToolCall {
                        tool_name: name.clone(),
                        tool_input: input.clone(),
                        tool_id: id.clone(),
                        ts_ms: now_ms(),
                    })
                    .await;
            }

            let mut assistant_blocks = vec![Block::text(text.clone())];
            for (id, name, input) in &tool_uses {
                assistant_blocks.push(Block::tool_use(id.clone(), name.clone(), input.clone()));
            }
            messages.push(Message::assistant(assistant_blocks));

            match response.stop_reason {
                bashclaw_model::StopReason::EndTurn | bashclaw_model::StopReason::MaxTokens => {
                    final_text = text;
                    break;
                }
                bashclaw_model::StopReason::StopSequence => {
                    final_text = text;
                    break;
                }
                bashclaw_model::StopReason::ToolUse => {
                    if iter >= max_iters {
                        let _ = store
                            .append(Entry::Assistant {
                                content: BUDGET_EXHAUSTED_TEXT.to_string(),
                                ts_ms: now_ms(),
                            })
                            .await;
                        final_text = BUDGET_EXHAUSTED_TEXT.to_string();
                        break;
                    }

                    // ── DISPATCH_TOOLS ──────────────────────────────────
                    let mut result_blocks = Vec::with_capacity(tool_uses.len());
                    for (id, name, input) in &tool_uses {
                        let output = if !effective_names.contains(name) {
                            bashclaw_tools::ToolOutput::err(
                                id.clone(),
                                format!("tool not permitted for this agent: {name}"),
                            )
                        } else {
                            self.tools
                                .execute(&ToolCall {
                                    id: id.clone(),
                                    name: name.clone(),
                                    args: input.clone(),
                                })
                                .await
                        };

                        let _ = store
                            .append(Entry::ToolResult {
                                tool_id: id.clone(),
                                content: output.content.clone(),
                                is_error: output.is_error,
                                ts_ms: now_ms(),
                            })
                            .await;

                        result_blocks.push(Block::tool_result(id.clone(), output.content, output.is_error));
                    }
                    messages.push(Message::tool_results(result_blocks));
                    iter += 1;
                }
            }
        }

        // ── FINALIZE ──────────────────────────────────────────────────────
        if let Ok(entries) = store.load(None).await {
            if entries.len() > self.session_cfg.max_history {
                let _ = store.prune(self.session_cfg.max_history).await;
            }
        }

        final_text
    }

    /// §4.5.1 external engine delegation: invoke `claude`/`codex` as a CLI,
    /// wrap the user message in a `<bashclaw-context>` envelope, and parse a
    /// single JSON result from stdout. Invalid JSON or empty output yields
    /// empty text and surfaces no error.
    async fn delegate_external(
        &self,
        engine: &str,
        agent_id: &str,
        user_text: &str,
        channel: &str,
        sender: &str,
    ) -> String {
        let store = self.store_for(agent_id, channel, sender);
        let resume_id = store
            .load(None)
            .await
            .ok()
            .and_then(|entries| {
                entries.into_iter().rev().find_map(|e| match e {
                    Entry::Meta { payload, .. } => payload
                        .get("cc_session_id")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                    _ => None,
                })
            });

        let envelope = format!(
            "<bashclaw-context channel=\"{channel}\" sender=\"{sender}\">\n{user_text}\n</bashclaw-context>"
        );

        let mut cmd = tokio::process::Command::new(engine);
        cmd.arg("--print").arg("--output-format").arg("json");
        if let Some(id) = &resume_id {
            cmd.arg("--resume").arg(id);
        }
        cmd.arg(&envelope);

        let output = match cmd.output().await {
            Ok(o) => o,
            Err(e) => {
                warn!(engine, error = %e, "external engine invocation failed");
                return String::new();
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return String::new();
        }
        let parsed: serde_json::Value = match serde_json::from_str(stdout.trim()) {
            Ok(v) => v,
            Err(_) => return String::new(),
        };

        let result_text = parsed
            .get("result")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if let Some(session_id) = parsed.get("session_id").and_then(|v| v.as_str()) {
            let _ = store
                .append(Entry::Meta {
                    payload: serde_json::json!({"cc_session_id": session_id}),
                    ts_ms: now_ms(),
                })
                .await;
        }
        result_text
    }
}

/// Strips `Image` blocks from the most recent user-role message and appends
/// a note in its place.
fn strip_images(messages: &mut [Message]) {
    let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == Role::User) else {
        return;
    };
    let had_image = last_user.content.iter().any(|b| matches!(b, Block::Image { .. }));
    if !had_image {
        return;
    }
    last_user.content.retain(|b| !matches!(b, Block::Image { .. }));
    last_user.content.push(Block::text(IMAGE_OMITTED_NOTE));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bashclaw_model::Message;

    #[test]
    fn profile_minimal_grants_no_base_tools() {
        let reg = ToolRegistry::new();
        assert!(profile_tools(Some("minimal"), &reg).is_empty());
    }

    #[test]
    fn profile_coding_grants_shell() {
        let reg = ToolRegistry::new();
        let tools = profile_tools(Some("coding"), &reg);
        assert!(tools.contains(&"shell".to_string()));
    }

    #[test]
    fn unknown_or_unset_profile_fails_open_to_every_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(crate::core_tools::SessionsListTool {
            sessions_root: PathBuf::from("/tmp"),
        });
        let all = reg.names();
        assert_eq!(profile_tools(Some("bogus"), &reg), all);
        assert_eq!(profile_tools(None, &reg), all);
        assert_eq!(profile_tools(Some("full"), &reg), all);
    }

    #[test]
    fn strip_images_removes_image_blocks_and_adds_note() {
        let mut messages = vec![Message::assistant(vec![Block::text("hi")]),
            Message {
                role: Role::User,
                content: vec![Block::text("look"), Block::Image { source: "data:image/png;base64,AA".into() }],
            }];
        strip_images(&mut messages);
        let last = messages.last().unwrap();
        assert!(!last.content.iter().any(|b| matches!(b, Block::Image { .. })));
        assert!(last.content.iter().any(|b| matches!(b, Block::Text { text } if text == IMAGE_OMITTED_NOTE)));
    }

    #[test]
    fn strip_images_noop_without_images() {
        let mut messages = vec![Message::user("hello")];
        let before = messages.clone();
        strip_images(&mut messages);
        assert_eq!(messages[0].content, before[0].content);
    }

    #[test]
    fn anthropic_base_url_override_applies_to_anthropic_format() {
        std::env::set_var("ANTHROPIC_BASE_URL", "https://proxy.example/v1/messages");
        assert_eq!(
            anthropic_base_url_override("anthropic").as_deref(),
            Some("https://proxy.example/v1/messages")
        );
        std::env::remove_var("ANTHROPIC_BASE_URL");
    }

    #[test]
    fn anthropic_base_url_override_ignored_for_other_formats() {
        std::env::set_var("ANTHROPIC_BASE_URL", "https://proxy.example/v1/messages");
        assert_eq!(anthropic_base_url_override("openai"), None);
        std::env::remove_var("ANTHROPIC_BASE_URL");
    }

    #[test]
    fn anthropic_base_url_override_none_when_unset() {
        std::env::remove_var("ANTHROPIC_BASE_URL");
        assert_eq!(anthropic_base_url_override("anthropic"), None);
    }

    #[test]
    fn default_max_iters_falls_back_to_ten() {
        std::env::remove_var("AGENT_MAX_TOOL_ITERATIONS");
        assert_eq!(default_max_iters(), 10);
    }

    #[test]
    fn default_max_iters_reads_env_override() {
        std::env::set_var("AGENT_MAX_TOOL_ITERATIONS", "2");
        assert_eq!(default_max_iters(), 2);
        std::env::remove_var("AGENT_MAX_TOOL_ITERATIONS");
    }
}
