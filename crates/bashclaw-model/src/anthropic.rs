// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    retry::send_with_retry,
    types::{Block, Message, Response, Role, StopReason, ToolSchema, Usage},
    ModelProvider,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            model: model.into(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: max_tokens.unwrap_or(4096),
            temperature,
            client: reqwest::Client::new(),
        }
    }
}

fn block_to_anthropic(block: &Block) -> Value {
    match block {
        Block::Text { text } => json!({ "type": "text", "text": text }),
        Block::ToolUse { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        Block::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let mut v = json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
            });
            if *is_error {
                v["is_error"] = json!(true);
            }
            v
        }
        Block::Image { source } => {
            if let Some((mime, data)) = source
                .strip_prefix("data:")
                .and_then(|rest| rest.split_once(";base64,"))
            {
                json!({
                    "type": "image",
                    "source": { "type": "base64", "media_type": mime, "data": data },
                })
            } else {
                json!({
                    "type": "image",
                    "source": { "type": "url", "url": source },
                })
            }
        }
    }
}

fn build_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => unreachable!("system messages filtered above"),
            };
            json!({
                "role": role,
                "content": m.content.iter().map(block_to_anthropic).collect::<Vec<_>>(),
            })
        })
        .collect()
}

fn build_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.parameters,
            })
        })
        .collect()
}

fn anthropic_block_to_block(v: &Value) -> Option<Block> {
    match v.get("type").and_then(Value::as_str)? {
        "text" => Some(Block::text(v.get("text")?.as_str()?.to_string())),
        "tool_use" => Some(Block::tool_use(
            v.get("id")?.as_str()?.to_string(),
            v.get("name")?.as_str()?.to_string(),
            v.get("input").cloned().unwrap_or(Value::Null),
        )),
        _ => None,
    }
}

fn stop_reason_from_str(s: &str) -> StopReason {
    match s {
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        "anthropic"
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
            "system": system,
            "messages": build_messages(messages),
        });
        if !tools.is_empty() {
            body["tools"] = json!(build_tools(tools));
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }

        let api_key = self
            .api_key
            .clone()
            .context("ANTHROPIC_API_KEY not configured")?;

        let resp = send_with_retry(|| {
            self.client
                .post(&self.base_url)
                .header("x-api-key", &api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
        })
        .await?;

        let payload: Value = resp.json().await.context("parsing anthropic response body")?;

        let content = payload
            .get("content")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(anthropic_block_to_block).collect())
            .unwrap_or_default();

        let stop_reason = payload
            .get("stop_reason")
            .and_then(Value::as_str)
            .map(stop_reason_from_str)
            .unwrap_or(StopReason::EndTurn);

        let usage = payload
            .get("usage")
            .map(|u| Usage {
                input_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                output_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            })
            .unwrap_or_default();

        Ok(Response {
            stop_reason,
            content,
            usage,
        })
    }
}
