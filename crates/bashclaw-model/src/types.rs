// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// A single content block within a message.
///
/// This is the provider-neutral wire shape every adapter converts to and
/// from: Anthropic, OpenAI, and Google each have their own block
/// representations, but the agent runtime only ever sees these four
/// variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    Image {
        /// Data URL (`data:<mime>;base64,<b64>`) or HTTPS URL.
        source: String,
    },
}

impl Block {
    pub fn text(text: impl Into<String>) -> Self {
        Block::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Block::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Block::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Block::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the conversation history, addressed to a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<Block>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![Block::text(text)],
        }
    }

    pub fn assistant(content: Vec<Block>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_results(results: Vec<Block>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }

    /// Concatenation of every text block, for callers that just want a
    /// best-effort plain-text rendering (session store summaries, logs).
    pub fn text_summary(&self) -> String {
        self.content
            .iter()
            .filter_map(Block::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every tool_use block requested by this message, if any.
    pub fn tool_uses(&self) -> Vec<&Block> {
        self.content
            .iter()
            .filter(|b| matches!(b, Block::ToolUse { .. }))
            .collect()
    }
}

/// A tool schema offered to the model for this completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: serde_json::Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// Token usage for one completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A single, non-streaming completion response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub stop_reason: StopReason,
    pub content: Vec<Block>,
    pub usage: Usage,
}

impl Response {
    pub fn tool_uses(&self) -> Vec<&Block> {
        self.content
            .iter()
            .filter(|b| matches!(b, Block::ToolUse { .. }))
            .collect()
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(Block::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
