// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model catalog: static metadata for known models, decoupled from the
//! concrete network adapter that talks to them.

use serde::{Deserialize, Serialize};

/// Which of the three supported wire formats a `provider_id` speaks.
///
/// Several provider ids (e.g. "deepseek", "xiaomi") are OpenAI-compatible
/// gateways and map onto the `Openai` adapter even though they are not the
/// OpenAI service itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    Anthropic,
    Openai,
    Google,
}

/// Metadata for a single model entry in the static catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCatalogEntry {
    /// Model identifier forwarded to the provider API (e.g. "gpt-4o").
    pub id: String,
    /// Provider identifier used in agent config ("anthropic", "openai",
    /// "google", "deepseek", "xiaomi", ...).
    pub provider_id: String,
    /// Which of the three concrete network adapters handles this provider.
    pub api_format: ApiFormat,
    pub context_window: u32,
    pub max_output_tokens: u32,
    #[serde(default)]
    pub supports_images: bool,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    models: Vec<ModelCatalogEntry>,
}

/// Return all entries from the bundled static catalog.
pub fn static_catalog() -> Vec<ModelCatalogEntry> {
    let json = include_str!("../models.json");
    let catalog: CatalogFile =
        serde_json::from_str(json).expect("bundled models.json must be valid");
    catalog.models
}

/// Look up a single model by provider id and model id.
pub fn lookup(provider_id: &str, model_id: &str) -> Option<ModelCatalogEntry> {
    static_catalog()
        .into_iter()
        .find(|e| e.provider_id == provider_id && e.id == model_id)
}

/// Resolve the wire format a given provider id speaks, defaulting to
/// OpenAI-compatible for unrecognised providers (the most common shape for
/// third-party gateways).
pub fn api_format_for_provider(provider_id: &str) -> ApiFormat {
    static_catalog()
        .into_iter()
        .find(|e| e.provider_id == provider_id)
        .map(|e| e.api_format)
        .unwrap_or(ApiFormat::Openai)
}

pub fn supports_images(provider_id: &str, model_id: &str) -> bool {
    lookup(provider_id, model_id)
        .map(|e| e.supports_images)
        .unwrap_or(false)
}

pub fn context_window(provider_id: &str, model_id: &str, default: u32) -> u32 {
    lookup(provider_id, model_id)
        .map(|e| e.context_window)
        .unwrap_or(default)
}

pub fn max_output_tokens(provider_id: &str, model_id: &str, default: u32) -> u32 {
    lookup(provider_id, model_id)
        .map(|e| e.max_output_tokens)
        .unwrap_or(default)
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_catalog_is_non_empty() {
        assert!(!static_catalog().is_empty());
    }

    #[test]
    fn gpt4o_is_in_catalog_and_supports_images() {
        let entry = lookup("openai", "gpt-4o").expect("gpt-4o must be in catalog");
        assert_eq!(entry.api_format, ApiFormat::Openai);
        assert!(entry.supports_images);
    }

    #[test]
    fn claude_opus_is_in_catalog() {
        let entry = lookup("anthropic", "claude-opus-4-6").expect("must be in catalog");
        assert_eq!(entry.api_format, ApiFormat::Anthropic);
        assert!(entry.context_window >= 200_000);
    }

    #[test]
    fn deepseek_uses_openai_wire_format() {
        assert_eq!(api_format_for_provider("deepseek"), ApiFormat::Openai);
    }

    #[test]
    fn xiaomi_uses_openai_wire_format() {
        assert_eq!(api_format_for_provider("xiaomi"), ApiFormat::Openai);
    }

    #[test]
    fn unknown_provider_defaults_to_openai_format() {
        assert_eq!(api_format_for_provider("totally-unknown"), ApiFormat::Openai);
    }

    #[test]
    fn lookup_unknown_model_returns_none() {
        assert!(lookup("openai", "no-such-model").is_none());
    }

    #[test]
    fn context_window_fallback_used_when_unknown() {
        assert_eq!(context_window("openai", "no-such-model", 4096), 4096);
    }

    #[test]
    fn all_entries_have_non_zero_windows() {
        for entry in static_catalog() {
            assert!(entry.context_window > 0, "{} has zero context_window", entry.id);
            assert!(entry.max_output_tokens > 0, "{} has zero max_output_tokens", entry.id);
        }
    }
}
