//! The synthesis call contract and its HTTP error mapping.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::BoxFuture;

use super::types::{ChatRequest, ChatResponse};

/// Seconds to wait after a 429 that carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Errors from a synthesis provider. No variant is retried.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("provider error {status}: {message}")]
    ProviderError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::Parse(e.to_string())
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

/// A chat-completion backend used for the single synthesis call.
///
/// Object safe so the orchestrator can hold a `Box<dyn LlmProvider>`.
pub trait LlmProvider: Send + Sync {
    /// Display name, used in logs.
    fn name(&self) -> &str;

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>>;
}

/// Classify a non-success status. Returns `None` for 2xx.
pub(crate) fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> Option<LlmError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED => LlmError::Auth(format!("provider rejected the API key: {body}")),
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            retry_after_secs: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        other => LlmError::ProviderError {
            status: other.as_u16(),
            message: body.to_string(),
        },
    })
}

/// POST `body` as JSON and decode a JSON reply, mapping failures onto
/// [`LlmError`].
pub(crate) async fn post_json<B, R>(request: RequestBuilder, body: &B) -> Result<R, LlmError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let resp = request.json(body).send().await?;
    let status = resp.status();
    if status.is_success() {
        return resp.json().await.map_err(|e| LlmError::Parse(e.to_string()));
    }
    let headers = resp.headers().clone();
    let text = resp.text().await.unwrap_or_default();
    Err(match status_error(status, &headers, &text) {
        Some(err) => err,
        None => LlmError::ProviderError {
            status: status.as_u16(),
            message: text,
        },
    })
}
