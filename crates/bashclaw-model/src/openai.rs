// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI-compatible chat-completions driver.
//!
//! Also backs any provider whose catalog entry maps to
//! [`crate::catalog::ApiFormat::Openai`] (e.g. "deepseek", "xiaomi") — those
//! callers construct this same provider with a different `base_url`.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    retry::send_with_retry,
    types::{Block, Message, Response, Role, StopReason, ToolSchema, Usage},
    ModelProvider,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiProvider {
    provider_id: String,
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self::with_provider_id(
            "openai",
            model,
            api_key,
            base_url,
            max_tokens,
            temperature,
        )
    }

    /// Construct the provider under a different catalog provider id
    /// ("deepseek", "xiaomi", ...) while reusing the OpenAI wire format.
    pub fn with_provider_id(
        provider_id: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            model: model.into(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: max_tokens.unwrap_or(4096),
            temperature,
            client: reqwest::Client::new(),
        }
    }
}

fn content_part(block: &Block) -> Option<Value> {
    match block {
        Block::Text { text } => Some(json!({ "type": "text", "text": text })),
        Block::Image { source } => Some(json!({
            "type": "image_url",
            "image_url": { "url": source },
        })),
        _ => None,
    }
}

fn build_messages(messages: &[Message], system: &str) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        out.push(json!({ "role": "system", "content": system }));
    }

    for m in messages.iter().filter(|m| m.role != Role::System) {
        let tool_results: Vec<&Block> = m
            .content
            .iter()
            .filter(|b| matches!(b, Block::ToolResult { .. }))
            .collect();
        if !tool_results.is_empty() {
            for b in tool_results {
                if let Block::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } = b
                {
                    out.push(json!({
                        "role": "tool",
                        "tool_call_id": tool_use_id,
                        "content": content,
                    }));
                }
            }
            continue;
        }

        let role = match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => unreachable!("system messages filtered above"),
        };

        let tool_uses: Vec<Value> = m
            .content
            .iter()
            .filter_map(|b| match b {
                Block::ToolUse { id, name, input } => Some(json!({
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": serde_json::to_string(input).unwrap_or_default(),
                    },
                })),
                _ => None,
            })
            .collect();

        let parts: Vec<Value> = m.content.iter().filter_map(content_part).collect();

        let mut msg = json!({ "role": role });
        if parts.len() == 1 {
            if let Some(Value::Object(o)) = parts.first() {
                if o.get("type") == Some(&json!("text")) {
                    msg["content"] = o.get("text").cloned().unwrap_or(Value::Null);
                } else {
                    msg["content"] = json!(parts);
                }
            }
        } else if !parts.is_empty() {
            msg["content"] = json!(parts);
        } else if tool_uses.is_empty() {
            msg["content"] = json!("");
        }
        if !tool_uses.is_empty() {
            msg["tool_calls"] = json!(tool_uses);
        }
        out.push(msg);
    }

    out
}

fn build_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                },
            })
        })
        .collect()
}

fn stop_reason_from_finish(s: &str) -> StopReason {
    match s {
        "tool_calls" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        "stop" => StopReason::EndTurn,
        _ => StopReason::EndTurn,
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        system: &str,
    ) -> anyhow::Result<Response> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": build_messages(messages, system),
        });
        if !tools.is_empty() {
            body["tools"] = json!(build_tools(tools));
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }

        let api_key = self.api_key.clone();

        let resp = send_with_retry(|| {
            let mut req = self.client.post(&self.base_url).json(&body);
            if let Some(key) = &api_key {
                req = req.bearer_auth(key);
            }
            req
        })
        .await?;

        let payload: Value = resp.json().await.context("parsing openai response body")?;
        let choice = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .context("openai response missing choices[0]")?;
        let message = choice.get("message").context("choice missing message")?;

        let mut content = Vec::new();
        if let Some(text) = message.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                content.push(Block::text(text));
            }
        }
        if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
                let func = call.get("function").context("tool_call missing function")?;
                let name = func.get("name").and_then(Value::as_str).unwrap_or_default();
                let args_str = func.get("arguments").and_then(Value::as_str).unwrap_or("{}");
                let input: Value = serde_json::from_str(args_str).unwrap_or(Value::Null);
                content.push(Block::tool_use(id, name, input));
            }
        }

        let stop_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(stop_reason_from_finish)
            .unwrap_or(StopReason::EndTurn);

        let usage = payload
            .get("usage")
            .map(|u| Usage {
                input_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                output_tokens: u
                    .get("completion_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
            })
            .unwrap_or_default();

        Ok(Response {
            stop_reason,
            content,
            usage,
        })
    }
}
