//! Mock producers and synthesis providers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fusionclaw_core::BoxFuture;
use fusionclaw_core::llm::{ChatRequest, ChatResponse, FinishReason, LlmError, LlmProvider};
use fusionclaw_core::{Finding, Producer, ProducerError, TokenUsage};

enum Behavior {
    Succeed,
    Fail(String),
    WrongId(String),
}

/// A producer returning a canned finding, optionally after a delay.
///
/// `completed()` reports whether a run reached its end, which lets tests see
/// that a slow sibling was aborted.
pub struct MockProducer {
    id: String,
    finding: Finding,
    delay: Option<Duration>,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicBool>,
}

impl MockProducer {
    /// Succeeds with `finding`; the producer id is taken from it.
    pub fn new(finding: Finding) -> Self {
        Self {
            id: finding.producer_id.clone(),
            finding,
            delay: None,
            behavior: Behavior::Succeed,
            calls: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fails with [`ProducerError::Execution`].
    pub fn failing(id: &str, message: &str) -> Self {
        let mut producer = Self::new(Finding::new(id, "unused"));
        producer.behavior = Behavior::Fail(message.to_string());
        producer
    }

    /// Returns a finding stamped with `actual_id` instead of its own id.
    pub fn wrong_id(id: &str, actual_id: &str) -> Self {
        let mut producer = Self::new(Finding::new(id, "mislabelled"));
        producer.behavior = Behavior::WrongId(actual_id.to_string());
        producer
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of `run` invocations.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Shared flag set when a run finishes (after any delay).
    pub fn completed(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.completed)
    }

    pub fn into_arc(self) -> Arc<dyn Producer> {
        Arc::new(self)
    }
}

impl Producer for MockProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        "mock producer"
    }

    fn run(&self, _input: &str) -> BoxFuture<'_, Result<Finding, ProducerError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.completed.store(true, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed => Ok(self.finding.clone()),
                Behavior::Fail(message) => Err(ProducerError::Execution(message.clone())),
                Behavior::WrongId(actual) => {
                    let mut finding = self.finding.clone();
                    finding.producer_id = actual.clone();
                    Ok(finding)
                }
            }
        })
    }
}

/// Shared record of the requests a [`ScriptedProvider`] received.
#[derive(Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<ChatRequest>>>);

impl RequestLog {
    pub fn all(&self) -> Vec<ChatRequest> {
        self.0.lock().expect("request log poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().expect("request log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The user turn of the only request.
    pub fn single_prompt(&self) -> String {
        let requests = self.all();
        assert_eq!(requests.len(), 1, "expected exactly one synthesis request");
        requests[0]
            .last_user_turn()
            .expect("request has no user turn")
            .to_string()
    }

    fn push(&self, request: ChatRequest) {
        self.0.lock().expect("request log poisoned").push(request);
    }
}

enum Script {
    Answer {
        content: Option<String>,
        usage: TokenUsage,
    },
    Error {
        status: u16,
        message: String,
    },
}

/// A synthesis provider that records requests and replays a fixed outcome.
pub struct ScriptedProvider {
    script: Script,
    log: RequestLog,
}

impl ScriptedProvider {
    /// Answer every request with `content` and zero usage.
    pub fn answer(content: &str) -> Self {
        Self {
            script: Script::Answer {
                content: Some(content.to_string()),
                usage: TokenUsage::default(),
            },
            log: RequestLog::default(),
        }
    }

    /// Answer with no content at all.
    pub fn empty() -> Self {
        Self {
            script: Script::Answer {
                content: None,
                usage: TokenUsage::default(),
            },
            log: RequestLog::default(),
        }
    }

    /// Fail every request with [`LlmError::ProviderError`].
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            script: Script::Error {
                status,
                message: message.to_string(),
            },
            log: RequestLog::default(),
        }
    }

    pub fn with_usage(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        if let Script::Answer { usage, .. } = &mut self.script {
            *usage = TokenUsage::new(prompt_tokens, completion_tokens);
        }
        self
    }

    /// Handle onto the requests this provider will receive.
    pub fn requests(&self) -> RequestLog {
        self.log.clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        self.log.push(request.clone());
        let model = request.model.clone();
        Box::pin(async move {
            match &self.script {
                Script::Answer { content, usage } => Ok(ChatResponse {
                    text: content.clone(),
                    finish_reason: FinishReason::Stop,
                    usage: *usage,
                    model,
                }),
                Script::Error { status, message } => Err(LlmError::ProviderError {
                    status: *status,
                    message: message.clone(),
                }),
            }
        })
    }
}
