// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Which configured backend services a `web_search` call. Brave is tried
/// first since it returns a ranked result list directly; Perplexity is an
/// answer-engine fallback when only its key is configured.
enum Backend {
    Brave(String),
    Perplexity(String),
}

fn selected_backend(api_key: Option<&str>) -> Option<Backend> {
    if let Some(key) = api_key {
        return Some(Backend::Brave(key.to_string()));
    }
    if let Ok(key) = std::env::var("BRAVE_SEARCH_API_KEY") {
        return Some(Backend::Brave(key));
    }
    if let Ok(key) = std::env::var("PERPLEXITY_API_KEY") {
        return Some(Backend::Perplexity(key));
    }
    None
}

#[derive(Default)]
pub struct WebSearchTool {
    /// Optional API key override (falls back to env BRAVE_SEARCH_API_KEY / PERPLEXITY_API_KEY).
    pub api_key: Option<String>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Real-time web search returning ranked results. Requires BRAVE_SEARCH_API_KEY or\n\
         PERPLEXITY_API_KEY to be configured; Brave is used if both are set.\n\
         count: 1-10 (default 5). Include the current year in queries for recent info."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "count": {
                    "type": "integer",
                    "description": "Number of results to return (default 5, max 10)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn optional(&self) -> bool {
        true
    }

    fn unavailable(&self) -> bool {
        selected_backend(self.api_key.as_deref()).is_none()
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let query = match call.args.get("query").and_then(|v| v.as_str()) {
            Some(q) => q.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'query'"),
        };
        let count = call
            .args
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(5)
            .clamp(1, 10) as usize;

        debug!(query = %query, count, "web_search tool");

        let Some(backend) = selected_backend(self.api_key.as_deref()) else {
            return ToolOutput::err(
                &call.id,
                "missing key for selected backend: set BRAVE_SEARCH_API_KEY or PERPLEXITY_API_KEY",
            );
        };

        let result = match backend {
            Backend::Brave(key) => brave_search(&query, count, &key).await,
            Backend::Perplexity(key) => perplexity_search(&query, &key).await,
        };

        match result {
            Ok(results) => ToolOutput::ok(&call.id, results),
            Err(e) => ToolOutput::err(&call.id, format!("search error: {e}")),
        }
    }
}

async fn brave_search(query: &str, count: usize, api_key: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("bashclaw-agent/0.1")
        .build()?;

    let url = format!(
        "https://api.search.brave.com/res/v1/web/search?q={}&count={}",
        urlencoding(query),
        count
    );

    let resp = client
        .get(&url)
        .header("Accept", "application/json")
        .header("Accept-Encoding", "gzip")
        .header("X-Subscription-Token", api_key)
        .send()
        .await?;

    if !resp.status().is_success() {
        anyhow::bail!("Brave API returned status {}", resp.status());
    }

    let json: Value = resp.json().await?;

    let results = json
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|arr| arr.as_slice())
        .unwrap_or(&[]);

    if results.is_empty() {
        return Ok("(no results)".to_string());
    }

    let mut output = Vec::new();
    for (i, r) in results.iter().enumerate().take(count) {
        let title = r
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("(no title)");
        let url = r.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let desc = r.get("description").and_then(|v| v.as_str()).unwrap_or("");
        output.push(format!("{}. **{}**\n   {}\n   {}", i + 1, title, url, desc));
    }

    Ok(output.join("\n\n"))
}

/// Perplexity's chat-completions endpoint with an online model acts as the
/// answer-engine fallback when no Brave key is configured.
async fn perplexity_search(query: &str, api_key: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent("bashclaw-agent/0.1")
        .build()?;

    let resp = client
        .post("https://api.perplexity.ai/chat/completions")
        .bearer_auth(api_key)
        .json(&json!({
            "model": "sonar",
            "messages": [{"role": "user", "content": query}],
        }))
        .send()
        .await?;

    if !resp.status().is_success() {
        anyhow::bail!("Perplexity API returned status {}", resp.status());
    }

    let json: Value = resp.json().await?;
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or("(no answer)");

    Ok(content.to_string())
}

fn urlencoding(s: &str) -> String {
    let mut encoded = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => encoded.push(c),
            ' ' => encoded.push('+'),
            c => {
                for byte in c.to_string().as_bytes() {
                    encoded.push_str(&format!("%{:02X}", byte));
                }
            }
        }
    }
    encoded
}
