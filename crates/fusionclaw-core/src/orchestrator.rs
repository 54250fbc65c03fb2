//! Orchestrator: concurrent fan-out, fusion, and a single synthesis call.
//!
//! ```text
//!            ┌────────────┐
//!  input ───▶│ producer A │──┐
//!       ├───▶│ producer B │──┼──▶ ContextFuser ──▶ build_prompt ──▶ LlmProvider
//!       └───▶│ producer C │──┘     (budget)                         (one call)
//!            └────────────┘
//! ```
//!
//! Producers run as tasks on a [`JoinSet`]. Findings are re-slotted into
//! producer order, so fusion sees the same input regardless of which
//! producer finished first.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use fusionclaw_config::{AppConfig, FanOutPolicy};

use crate::fusion::{ContextFuser, Priorities, build_prompt};
use crate::llm::{self, ChatRequest, LlmError, LlmProvider};
use crate::model::{Finding, SynthesisResult};
use crate::producer::{Producer, ProducerError};
use crate::registry::ProducerRegistry;

/// Instruction sent as the system turn of every synthesis call.
pub const SYSTEM_PROMPT: &str = "You are a synthesis engine. You receive a fused context window \
containing structured knowledge from multiple specialist producers.

Your job:
1. Analyze ALL context blocks, both FULL and COMPRESSED fidelity.
2. Synthesize a coherent, specific answer to the user's query.
3. Cite facts from the context. Do not invent information.
4. If blocks are marked COMPRESSED, note that some detail may be missing.

Be direct. No filler.";

/// Sampling temperature of the synthesis call.
pub const SYNTHESIS_TEMPERATURE: f32 = 0.3;

/// Errors from an orchestrated query.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("producer '{producer_id}' failed: {source}")]
    Producer {
        producer_id: String,
        #[source]
        source: ProducerError,
    },

    #[error("synthesis failed: {0}")]
    Synthesis(#[from] LlmError),
}

/// Runtime knobs for an orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Maximum tokens the synthesis call may generate.
    pub max_tokens: u32,
    /// Per-producer deadline; `None` waits indefinitely.
    pub producer_timeout: Option<Duration>,
    pub fan_out: FanOutPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            producer_timeout: None,
            fan_out: FanOutPolicy::AllOrNothing,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_tokens: config.synthesis.max_tokens,
            producer_timeout: config.orchestrator.producer_timeout(),
            fan_out: config.orchestrator.fan_out,
        }
    }
}

/// Runs producers, fuses their findings, and synthesizes one answer.
pub struct Orchestrator {
    provider: Box<dyn LlmProvider>,
    fuser: ContextFuser,
    producers: Vec<Arc<dyn Producer>>,
    model: String,
    priorities: Priorities,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Create an orchestrator synthesizing with the fuser's model.
    pub fn new(
        provider: Box<dyn LlmProvider>,
        fuser: ContextFuser,
        producers: Vec<Arc<dyn Producer>>,
    ) -> Self {
        Self {
            provider,
            model: fuser.model().to_string(),
            fuser,
            producers,
            priorities: Priorities::new(),
            settings: OrchestratorSettings::default(),
        }
    }

    /// Build provider, fuser, and producers from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, LlmError> {
        let producers = ProducerRegistry::from_config(&config.producers)
            .list()
            .to_vec();
        Self::from_config_with_producers(config, producers)
    }

    /// Like [`Orchestrator::from_config`], but with an already chosen
    /// producer set instead of every configured producer.
    pub fn from_config_with_producers(
        config: &AppConfig,
        producers: Vec<Arc<dyn Producer>>,
    ) -> Result<Self, LlmError> {
        let provider = llm::create_provider(&config.synthesis)?;
        let fuser = ContextFuser::from_config(config);
        Ok(Self::new(provider, fuser, producers)
            .with_priorities(config.fusion.priorities.clone())
            .with_settings(OrchestratorSettings::from_config(config)))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Priorities used when a query supplies none.
    pub fn with_priorities(mut self, priorities: Priorities) -> Self {
        self.priorities = priorities;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn producers(&self) -> &[Arc<dyn Producer>] {
        &self.producers
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn fuser(&self) -> &ContextFuser {
        &self.fuser
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Query all of this orchestrator's producers with the default budget.
    ///
    /// `None` priorities fall back to the configured ones.
    pub async fn query(
        &self,
        input: &str,
        priorities: Option<&Priorities>,
    ) -> Result<SynthesisResult, OrchestratorError> {
        let priorities = priorities.or(Some(&self.priorities));
        self.query_with(
            &self.producers,
            input,
            &self.model,
            self.fuser.default_budget(),
            priorities,
        )
        .await
    }

    /// Fan out to `producers`, fuse within `budget`, and synthesize with
    /// `model`.
    pub async fn query_with(
        &self,
        producers: &[Arc<dyn Producer>],
        input: &str,
        model: &str,
        budget: NonZeroUsize,
        priorities: Option<&Priorities>,
    ) -> Result<SynthesisResult, OrchestratorError> {
        info!(
            producers = producers.len(),
            model,
            budget = budget.get(),
            "Query started"
        );

        let findings = self.fan_out(producers, input).await?;

        let fuser = self.fuser.clone().with_model(model);
        let fused = fuser.fuse(&findings, budget, priorities);
        let prompt = build_prompt(&fused, input);

        let request = ChatRequest::new(model)
            .system(SYSTEM_PROMPT)
            .user(prompt)
            .max_tokens(self.settings.max_tokens)
            .temperature(SYNTHESIS_TEMPERATURE);
        debug!(provider = self.provider.name(), "Sending synthesis request");
        let response = self.provider.chat(&request).await?;

        info!(
            blocks = fused.blocks.len(),
            fused_tokens = fused.total_tokens,
            compression = fused.compression_applied,
            total_tokens = response.usage.total_tokens,
            "Query complete"
        );

        Ok(SynthesisResult {
            answer: response.text.unwrap_or_default(),
            fused_context: fused,
            model: model.to_string(),
            usage: response.usage,
        })
    }

    /// Run every producer concurrently and collect findings in producer order.
    async fn fan_out(
        &self,
        producers: &[Arc<dyn Producer>],
        input: &str,
    ) -> Result<Vec<Finding>, OrchestratorError> {
        let mut set = JoinSet::new();
        let mut slot_of = HashMap::with_capacity(producers.len());
        for (idx, producer) in producers.iter().enumerate() {
            let producer = Arc::clone(producer);
            let input = input.to_string();
            let timeout = self.settings.producer_timeout;
            let handle =
                set.spawn(async move { run_producer(producer.as_ref(), &input, timeout).await });
            slot_of.insert(handle.id(), idx);
        }

        let mut slots: Vec<Option<Result<Finding, ProducerError>>> =
            producers.iter().map(|_| None).collect();

        while let Some(joined) = set.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(ProducerError::Task(e.to_string()))),
            };
            let Some(&idx) = slot_of.get(&id) else {
                continue;
            };

            match result {
                Ok(finding) => {
                    debug!(producer = producers[idx].id(), "Producer finished");
                    slots[idx] = Some(Ok(finding));
                }
                Err(source) => {
                    let producer_id = producers[idx].id().to_string();
                    match self.settings.fan_out {
                        FanOutPolicy::AllOrNothing => {
                            warn!(producer = %producer_id, error = %source, "Producer failed, aborting query");
                            // Dropping the set aborts the producers still running.
                            return Err(OrchestratorError::Producer {
                                producer_id,
                                source,
                            });
                        }
                        FanOutPolicy::BestEffort => {
                            warn!(producer = %producer_id, error = %source, "Producer failed, skipping");
                            slots[idx] = Some(Err(source));
                        }
                    }
                }
            }
        }

        let mut findings = Vec::with_capacity(slots.len());
        let mut first_failure = None;
        for (idx, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(finding)) => findings.push(finding),
                Some(Err(source)) => {
                    if first_failure.is_none() {
                        first_failure = Some((idx, source));
                    }
                }
                None => {}
            }
        }

        if findings.is_empty()
            && let Some((idx, source)) = first_failure
        {
            return Err(OrchestratorError::Producer {
                producer_id: producers[idx].id().to_string(),
                source,
            });
        }
        Ok(findings)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("producers", &self.producers.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Run one producer, enforcing the deadline and the id contract.
async fn run_producer(
    producer: &dyn Producer,
    input: &str,
    timeout: Option<Duration>,
) -> Result<Finding, ProducerError> {
    let finding = match timeout {
        Some(after) => tokio::time::timeout(after, producer.run(input))
            .await
            .map_err(|_| ProducerError::Timeout { after })??,
        None => producer.run(input).await?,
    };

    if finding.producer_id != producer.id() {
        return Err(ProducerError::IdMismatch {
            expected: producer.id().to_string(),
            actual: finding.producer_id,
        });
    }
    Ok(finding)
}
