// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{
    catalog,
    types::{Message, Response, ToolSchema},
};

/// A provider-neutral, non-streaming model completion.
///
/// Every adapter (Anthropic, OpenAI, Google) implements this trait against
/// its own wire format and returns a single [`Response`] once the model has
/// finished generating.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider identifier as used in the model catalog ("anthropic" | "openai" | "google" | ...).
    fn provider_id(&self) -> &str;

    /// Model identifier forwarded to the provider API.
    fn model_name(&self) -> &str;

    /// Send a completion request and wait for the full response.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        system: &str,
    ) -> anyhow::Result<Response>;

    /// Returns `true` if this provider/model combination accepts image
    /// input blocks. Unknown models are treated conservatively as text-only.
    fn supports_images(&self) -> bool {
        catalog::supports_images(self.provider_id(), self.model_name())
    }

    /// Context window size for this provider/model combination, if known.
    fn context_window(&self) -> Option<u32> {
        catalog::lookup(self.provider_id(), self.model_name()).map(|e| e.context_window)
    }

    /// Maximum output tokens for this provider/model combination, if known.
    fn max_output_tokens(&self) -> Option<u32> {
        catalog::lookup(self.provider_id(), self.model_name()).map(|e| e.max_output_tokens)
    }
}
