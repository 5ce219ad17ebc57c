// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Google Gemini driver — native Generative Language API (`generateContent`).

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    retry::send_with_retry,
    types::{Block, Message, Response, Role, StopReason, ToolSchema, Usage},
    ModelProvider,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GoogleProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl GoogleProvider {
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

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

/// Converts blocks to Gemini `parts`, tracking `tool_use_id -> name` so a
/// later `ToolResult` (which the wire format matches by name, not id) can be
/// translated into a `functionResponse`.
fn build_contents(messages: &[Message], id_to_name: &mut HashMap<String, String>) -> Vec<Value> {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
                Role::System => unreachable!("system messages filtered above"),
            };
            let parts: Vec<Value> = m
                .content
                .iter()
                .map(|b| match b {
                    Block::Text { text } => json!({ "text": text }),
                    Block::ToolUse { id, name, input } => {
                        id_to_name.insert(id.clone(), name.clone());
                        json!({ "functionCall": { "name": name, "args": input } })
                    }
                    Block::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => {
                        let name = id_to_name
                            .get(tool_use_id)
                            .cloned()
                            .unwrap_or_else(|| tool_use_id.clone());
                        json!({
                            "functionResponse": {
                                "name": name,
                                "response": { "result": content },
                            },
                        })
                    }
                    Block::Image { source } => {
                        if let Some((mime, data)) = source
                            .strip_prefix("data:")
                            .and_then(|rest| rest.split_once(";base64,"))
                        {
                            json!({ "inlineData": { "mimeType": mime, "data": data } })
                        } else {
                            json!({ "text": format!("[image: {source}]") })
                        }
                    }
                })
                .collect();
            json!({ "role": role, "parts": parts })
        })
        .collect()
}

fn build_tools(tools: &[ToolSchema]) -> Vec<Value> {
    if tools.is_empty() {
        return vec![];
    }
    vec![json!({
        "functionDeclarations": tools.iter().map(|t| json!({
            "name": t.name,
            "description": t.description,
            "parameters": t.parameters,
        })).collect::<Vec<_>>(),
    })]
}

fn stop_reason_from_finish(s: &str) -> StopReason {
    match s {
        "MAX_TOKENS" => StopReason::MaxTokens,
        "STOP" => StopReason::EndTurn,
        _ => StopReason::EndTurn,
    }
}

#[async_trait]
impl ModelProvider for GoogleProvider {
    fn provider_id(&self) -> &str {
        "google"
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
        let mut id_to_name = HashMap::new();
        let mut body = json!({
            "contents": build_contents(messages, &mut id_to_name),
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
            },
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        let tool_decls = build_tools(tools);
        if !tool_decls.is_empty() {
            body["tools"] = json!(tool_decls);
        }
        if let Some(t) = self.temperature {
            body["generationConfig"]["temperature"] = json!(t);
        }

        let api_key = self.api_key.clone().context("GOOGLE_API_KEY not configured")?;
        let endpoint = self.endpoint();

        let resp = send_with_retry(|| {
            self.client
                .post(&endpoint)
                .query(&[("key", &api_key)])
                .json(&body)
        })
        .await?;

        let payload: Value = resp.json().await.context("parsing google response body")?;
        let candidate = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .context("google response missing candidates[0]")?;

        let mut content = Vec::new();
        if let Some(parts) = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
        {
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    content.push(Block::text(text));
                } else if let Some(call) = part.get("functionCall") {
                    let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
                    let args = call.get("args").cloned().unwrap_or(Value::Null);
                    // Gemini does not assign call ids; synthesize one so
                    // downstream tool dispatch has something stable to echo
                    // back in the matching ToolResult block.
                    let id = format!("gfc_{}", uuid::Uuid::new_v4());
                    content.push(Block::tool_use(id, name, args));
                }
            }
        }

        let stop_reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .map(stop_reason_from_finish)
            .unwrap_or(StopReason::EndTurn);
        let stop_reason = if content.iter().any(|b| matches!(b, Block::ToolUse { .. })) {
            StopReason::ToolUse
        } else {
            stop_reason
        };

        let usage = payload
            .get("usageMetadata")
            .map(|u| Usage {
                input_tokens: u
                    .get("promptTokenCount")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                output_tokens: u
                    .get("candidatesTokenCount")
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn build_contents_maps_assistant_to_model_role() {
        let msgs = vec![Message::assistant(vec![Block::text("hi")])];
        let mut map = HashMap::new();
        let built = build_contents(&msgs, &mut map);
        assert_eq!(built[0]["role"], "model");
    }

    #[test]
    fn build_contents_tracks_tool_use_id_to_name() {
        let msgs = vec![
            Message::assistant(vec![Block::tool_use("tc_1", "shell", json!({}))]),
            Message {
                role: Role::User,
                content: vec![Block::tool_result("tc_1", "output", false)],
            },
        ];
        let mut map = HashMap::new();
        let built = build_contents(&msgs, &mut map);
        assert_eq!(built[1]["parts"][0]["functionResponse"]["name"], "shell");
    }

    #[tokio::test]
    async fn complete_parses_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "hello back"}]},
                    "finishReason": "STOP",
                }],
                "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5},
            })))
            .mount(&server)
            .await;

        let provider = GoogleProvider::new(
            "gemini-2.0-flash",
            Some("test-key".into()),
            Some(server.uri()),
            None,
            None,
        );

        let resp = provider
            .complete(&[Message::user("hi")], &[], "be helpful")
            .await
            .unwrap();
        assert_eq!(resp.text(), "hello back");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn complete_parses_function_call_as_tool_use_stop_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"functionCall": {"name": "shell", "args": {"shell_command": "ls"}}}]},
                    "finishReason": "STOP",
                }],
                "usageMetadata": {"promptTokenCount": 20, "candidatesTokenCount": 8},
            })))
            .mount(&server)
            .await;

        let provider = GoogleProvider::new(
            "gemini-2.0-flash",
            Some("test-key".into()),
            Some(server.uri()),
            None,
            None,
        );

        let resp = provider
            .complete(&[Message::user("list files")], &[], "be helpful")
            .await
            .unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.tool_uses().len(), 1);
    }
}
