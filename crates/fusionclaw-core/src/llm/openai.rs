//! Chat Completions backend.
//!
//! Works against api.openai.com or any server exposing the same
//! `/chat/completions` shape (Ollama, vLLM, Together AI).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::BoxFuture;

use super::provider::{LlmError, LlmProvider, post_json};
use super::types::{ChatRequest, ChatResponse, FinishReason, Role, TokenUsage};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const COMPLETIONS_SUFFIX: &str = "/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiProvider {
    client: Client,
    api_key: Zeroizing<String>,
    endpoint: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: Zeroizing::new(api_key.into()),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Model used when a request leaves `model` empty.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Point at another server. Both an API root (`http://host/v1`) and a
    /// full completions URL are accepted.
    pub fn with_base_url(mut self, url: impl AsRef<str>) -> Self {
        let url = url.as_ref().trim_end_matches('/');
        self.endpoint = if url.ends_with(COMPLETIONS_SUFFIX) {
            url.to_string()
        } else {
            format!("{url}{COMPLETIONS_SUFFIX}")
        };
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn wire_request<'a>(&'a self, request: &'a ChatRequest) -> WireRequest<'a> {
        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };
        let system = request.system.as_deref().map(|content| WireMessage {
            role: Role::System,
            content,
        });
        let turns = request.messages.iter().map(|m| WireMessage {
            role: m.role,
            content: m.content.as_str(),
        });
        WireRequest {
            model,
            messages: system.into_iter().chain(turns).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

fn into_response(reply: WireResponse) -> Result<ChatResponse, LlmError> {
    let choice = reply
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("completion has no choices".to_string()))?;
    let usage = reply
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();
    Ok(ChatResponse {
        text: choice.message.content,
        finish_reason: FinishReason::from_raw(choice.finish_reason.as_deref()),
        usage,
        model: reply.model,
    })
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let request = request.clone();
        Box::pin(async move {
            let body = self.wire_request(&request);
            debug!(
                model = body.model,
                endpoint = %self.endpoint,
                turns = body.messages.len(),
                "Chat completions request"
            );
            let http = self
                .client
                .post(&self.endpoint)
                .bearer_auth(self.api_key.as_str());
            let reply: WireResponse = post_json(http, &body).await?;
            into_response(reply)
        })
    }
}

// Wire format

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
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
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
