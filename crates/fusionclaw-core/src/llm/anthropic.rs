//! Anthropic Messages API backend.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::BoxFuture;

use super::provider::{LlmError, LlmProvider, post_json};
use super::types::{ChatRequest, ChatResponse, FinishReason, Role, TokenUsage};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub struct AnthropicProvider {
    client: Client,
    api_key: Zeroizing<String>,
    default_model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: Zeroizing::new(api_key.into()),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Model used when a request leaves `model` empty.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// The Messages API has no system role inside `messages`; any system
    /// turns are folded into the top-level `system` field after the
    /// request's own instruction.
    fn wire_request<'a>(&'a self, request: &'a ChatRequest) -> WireRequest<'a> {
        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };
        let (system_turns, turns): (Vec<_>, Vec<_>) = request
            .messages
            .iter()
            .partition(|m| m.role == Role::System);
        let system: Vec<&str> = request
            .system
            .as_deref()
            .into_iter()
            .chain(system_turns.into_iter().map(|m| m.content.as_str()))
            .collect();
        WireRequest {
            model,
            max_tokens: request.max_tokens,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: turns
                .into_iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: m.content.as_str(),
                })
                .collect(),
            temperature: request.temperature,
        }
    }
}

fn into_response(reply: WireResponse) -> ChatResponse {
    let text: String = reply
        .content
        .iter()
        .filter_map(|block| match block {
            WireBlock::Text { text } => Some(text.as_str()),
            WireBlock::Other => None,
        })
        .collect();
    ChatResponse {
        text: (!text.is_empty()).then_some(text),
        finish_reason: FinishReason::from_raw(reply.stop_reason.as_deref()),
        usage: reply
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default(),
        model: reply.model,
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "Anthropic"
    }

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let request = request.clone();
        Box::pin(async move {
            let body = self.wire_request(&request);
            debug!(model = body.model, turns = body.messages.len(), "Messages request");
            let http = self
                .client
                .post(MESSAGES_URL)
                .header("x-api-key", self.api_key.as_str())
                .header("anthropic-version", API_VERSION);
            let reply: WireResponse = post_json(http, &body).await?;
            Ok(into_response(reply))
        })
    }
}

// Wire format

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<WireBlock>,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}
