// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod catalog;
pub mod sanitize;
mod anthropic;
mod google;
mod openai;
mod provider;
mod retry;
mod types;

pub use anthropic::AnthropicProvider;
pub use catalog::{ApiFormat, ModelCatalogEntry};
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use provider::ModelProvider;
pub use types::{Block, Message, Response, Role, StopReason, ToolSchema, Usage};

use anyhow::Context;

/// Construct a boxed [`ModelProvider`] for `model_id`, a `"<provider_id>/<model>"`
/// string such as `"anthropic/claude-opus-4-6"` or `"deepseek/deepseek-chat"`.
///
/// The concrete adapter is chosen by looking up `provider_id`'s wire format in
/// the static catalog (falling back to OpenAI-compatible for unknown
/// providers, the common shape for third-party gateways).
pub fn provider_for_model_id(
    model_id: &str,
    api_key: Option<String>,
    base_url: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
) -> anyhow::Result<Box<dyn ModelProvider>> {
    let (provider_id, model) = model_id
        .split_once('/')
        .with_context(|| format!("model id {model_id:?} must be \"<provider>/<model>\""))?;

    let format = catalog::api_format_for_provider(provider_id);
    match format {
        ApiFormat::Anthropic => Ok(Box::new(AnthropicProvider::new(
            model, api_key, base_url, max_tokens, temperature,
        ))),
        ApiFormat::Google => Ok(Box::new(GoogleProvider::new(
            model, api_key, base_url, max_tokens, temperature,
        ))),
        ApiFormat::Openai => Ok(Box::new(OpenAiProvider::with_provider_id(
            provider_id, model, api_key, base_url, max_tokens, temperature,
        ))),
    }
}

/// Resolve the environment variable name conventionally used for a
/// provider's API key, for providers the static catalog knows about.
pub fn default_api_key_env(provider_id: &str) -> String {
    format!("{}_API_KEY", provider_id.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_for_model_id_rejects_missing_slash() {
        let result = provider_for_model_id("gpt-4o", None, None, None, None);
        assert!(result.is_err());
    }

    #[test]
    fn provider_for_model_id_anthropic() {
        let p = provider_for_model_id("anthropic/claude-opus-4-6", None, None, None, None).unwrap();
        assert_eq!(p.provider_id(), "anthropic");
        assert_eq!(p.model_name(), "claude-opus-4-6");
    }

    #[test]
    fn provider_for_model_id_deepseek_uses_openai_adapter() {
        let p = provider_for_model_id("deepseek/deepseek-chat", None, None, None, None).unwrap();
        assert_eq!(p.provider_id(), "deepseek");
    }

    #[test]
    fn default_api_key_env_uppercases_provider() {
        assert_eq!(default_api_key_env("anthropic"), "ANTHROPIC_API_KEY");
    }
}
