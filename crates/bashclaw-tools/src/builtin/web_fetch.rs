// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::ssrf;
use crate::tool::{Tool, ToolCall, ToolOutput};

const DEFAULT_MAX_CHARS: usize = 50_000;

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch content from a URL and convert it to readable text.\n\n\
         ## Usage\n\
         - Fetch webpage content for analysis\n\
         - Extract text from HTML pages\n\
         - Retrieve documentation or reference material\n\
         - URL must be fully-formed and valid\n\n\
         ## Supported\n\
         - HTTP and HTTPS URLs\n\
         - HTML content conversion to text\n\
         - Maximum 50,000 characters per request (configurable)\n\n\
         ## Limitations\n\
         - No authentication support\n\
         - No binary content fetching\n\
         - No localhost or private/internal IP access (SSRF guard)\n\
         - Read-only (no requests with side effects)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (http or https)"
                },
                "maxChars": {
                    "type": "integer",
                    "description": "Maximum characters to return (default 50000)"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let url = match call.args.get("url").and_then(|v| v.as_str()) {
            Some(u) => u.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'url'"),
        };
        let max_chars = call
            .args
            .get("maxChars")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_CHARS as u64) as usize;

        debug!(url = %url, "web_fetch tool");

        match fetch_url(&url, max_chars).await {
            Ok(content) => ToolOutput::ok(&call.id, content),
            Err(e) => ToolOutput::err(&call.id, format!("fetch error: {e}")),
        }
    }
}

const MAX_REDIRECTS: u8 = 3;

async fn fetch_url(raw_url: &str, max_chars: usize) -> anyhow::Result<String> {
    let mut url = ssrf::validate_scheme_and_literal_host(raw_url)?;

    // Redirects are followed manually, one validated hop at a time: letting
    // reqwest's own redirect policy run would let a server bounce the
    // request to an internal address after the initial checks passed.
    let mut hops = 0u8;
    let response = loop {
        let response = fetch_one_hop(&url).await?;
        if response.status().is_redirection() {
            if hops >= MAX_REDIRECTS {
                anyhow::bail!("too many redirects");
            }
            let location = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| anyhow::anyhow!("redirect response has no Location header"))?;
            url = url
                .join(location)
                .with_context(|| format!("invalid redirect target: {location}"))?;
            ssrf::validate_scheme_and_literal_host(url.as_str())?;
            hops += 1;
            continue;
        }
        break response;
    };

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let body = response.text().await?;

    let content = if content_type.contains("html") {
        html_to_text(&body)
    } else if content_type.contains("json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    };

    if content.len() > max_chars {
        let mut end = max_chars.min(content.len());
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        Ok(format!(
            "{}...[truncated at {max_chars} chars; total {} chars]",
            &content[..end],
            content.len()
        ))
    } else {
        Ok(content)
    }
}

/// Resolves, validates, and pins `url`'s host to the address just checked,
/// then issues a single GET with redirect-following disabled.
async fn fetch_one_hop(url: &url::Url) -> anyhow::Result<reqwest::Response> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("URL has no host"))?
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow::anyhow!("URL has no resolvable port"))?;
    let resolved = ssrf::resolve_and_validate(&host, port).await?;
    let pinned_addr = resolved
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("DNS resolution returned no addresses for {host}"))?;

    // Pin the connection to the address just validated: without this,
    // reqwest re-resolves the host itself when it connects, which a
    // DNS-rebinding attacker could answer differently than the lookup above.
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::none())
        .user_agent("bashclaw-agent/0.1")
        .resolve(&host, std::net::SocketAddr::new(pinned_addr, port))
        .build()?;

    Ok(client.get(url.clone()).send().await?)
}

/// Convert HTML to plain text using html2text.
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_tags() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }

    #[test]
    fn schema_requires_url() {
        use crate::tool::Tool;
        let t = WebFetchTool;
        let schema = t.input_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v.as_str() == Some("url")));
    }

    #[tokio::test]
    async fn fetch_rejects_private_address() {
        let err = fetch_url("http://127.0.0.1/", DEFAULT_MAX_CHARS)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not publicly routable"));
    }

    #[tokio::test]
    async fn fetch_rejects_non_http_scheme() {
        let err = fetch_url("ftp://example.com/", DEFAULT_MAX_CHARS)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }

    #[tokio::test]
    async fn execute_missing_url_is_error() {
        let t = WebFetchTool;
        let call = ToolCall {
            id: "1".into(),
            name: "web_fetch".into(),
            args: json!({}),
        };
        let out = t.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing 'url'"));
    }
}
