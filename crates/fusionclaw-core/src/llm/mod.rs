//! Synthesis backends.
//!
//! The orchestrator makes its one model call through [`LlmProvider`].
//! [`OpenAiProvider`] speaks Chat Completions (including self-hosted
//! OpenAI-compatible servers) and [`AnthropicProvider`] speaks the Messages
//! API. [`create_provider`] picks one from the `[synthesis]` section.

pub mod anthropic;
pub mod openai;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use provider::{LlmError, LlmProvider};
pub use types::{ChatMessage, ChatRequest, ChatResponse, FinishReason, Role, TokenUsage};

use fusionclaw_config::{LlmProviderKind, SynthesisConfig};
use tracing::debug;

/// Build the configured synthesis provider.
///
/// The API key is resolved from `synthesis.api_key`, then from the
/// environment variable named by `synthesis.api_key_env` (or the provider's
/// conventional variable). Fails with [`LlmError::Auth`] when neither is set.
pub fn create_provider(config: &SynthesisConfig) -> Result<Box<dyn LlmProvider>, LlmError> {
    let Some(api_key) = config.resolve_api_key() else {
        let env_var = config
            .api_key_env
            .as_deref()
            .unwrap_or_else(|| config.provider.default_api_key_env());
        return Err(LlmError::Auth(format!(
            "no API key: set synthesis.api_key or ${env_var}"
        )));
    };

    let provider: Box<dyn LlmProvider> = match config.provider {
        LlmProviderKind::OpenAi => {
            let base = OpenAiProvider::new(api_key).with_model(&config.model);
            Box::new(match config.resolve_base_url() {
                Some(url) => base.with_base_url(url),
                None => base,
            })
        }
        LlmProviderKind::Anthropic => {
            Box::new(AnthropicProvider::new(api_key).with_model(&config.model))
        }
    };
    debug!(provider = provider.name(), model = %config.model, "Synthesis provider ready");
    Ok(provider)
}
