//! Data model shared by producers, the fusion engine, and the orchestrator.
//!
//! A [`Finding`] is what a producer exports after doing its work. The fusion
//! engine turns a list of findings into a [`FusedContext`] made of
//! [`ContentBlock`]s, and the orchestrator wraps the synthesis answer into a
//! [`SynthesisResult`].

use serde::{Deserialize, Deserializer, Serialize};

pub use crate::llm::TokenUsage;

/// A single verifiable data point extracted by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub key: String,
    pub value: String,
    /// Confidence in `[0.0, 1.0]`.
    #[serde(
        default = "default_confidence",
        deserialize_with = "deserialize_confidence"
    )]
    pub confidence: f64,
}

impl Fact {
    /// A fact with full confidence.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            confidence: 1.0,
        }
    }

    /// Set the confidence, clamped into `[0.0, 1.0]` (NaN becomes 0).
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }
}

fn default_confidence() -> f64 {
    1.0
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(serde::de::Error::custom(format!(
            "confidence must be in [0.0, 1.0], got {value}"
        )))
    }
}

/// Structured output of one producer run.
///
/// Findings are never mutated after creation. `token_count` is the
/// producer's own estimate and is not used for budget accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub producer_id: String,
    pub summary: String,
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub raw_context: String,
    #[serde(default)]
    pub token_count: usize,
}

impl Finding {
    /// A finding with a summary and nothing else.
    pub fn new(producer_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            producer_id: producer_id.into(),
            summary: summary.into(),
            facts: Vec::new(),
            raw_context: String::new(),
            token_count: 0,
        }
    }

    pub fn with_fact(mut self, fact: Fact) -> Self {
        self.facts.push(fact);
        self
    }

    pub fn with_facts(mut self, facts: impl IntoIterator<Item = Fact>) -> Self {
        self.facts.extend(facts);
        self
    }

    pub fn with_raw_context(mut self, raw_context: impl Into<String>) -> Self {
        self.raw_context = raw_context.into();
        self
    }

    pub fn with_token_count(mut self, token_count: usize) -> Self {
        self.token_count = token_count;
        self
    }
}

/// Fidelity label carried by a fused block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fidelity {
    /// Summary, facts, and raw context.
    Full,
    /// Raw context (and possibly the summary) removed to fit the budget.
    Compressed,
}

impl Fidelity {
    pub fn as_str(self) -> &'static str {
        match self {
            Fidelity::Full => "FULL",
            Fidelity::Compressed => "COMPRESSED",
        }
    }
}

impl std::fmt::Display for Fidelity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One producer's contribution to the fused context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub source_id: String,
    pub content: String,
    pub fidelity: Fidelity,
    /// Token count of the full-fidelity rendering.
    pub original_tokens: usize,
    /// Token count of `content`.
    pub final_tokens: usize,
}

impl ContentBlock {
    pub fn is_compressed(&self) -> bool {
        self.fidelity == Fidelity::Compressed
    }
}

/// The merged, token-bounded context handed to synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusedContext {
    pub blocks: Vec<ContentBlock>,
    /// Always the sum of `final_tokens` over `blocks`.
    pub total_tokens: usize,
    pub compression_applied: bool,
    /// Producer ids that contributed no block, in priority order.
    #[serde(default)]
    pub dropped: Vec<String>,
}

impl FusedContext {
    /// Assemble a context, deriving `total_tokens` and `compression_applied`
    /// from the blocks and the dropped ids.
    pub fn from_blocks(blocks: Vec<ContentBlock>, dropped: Vec<String>) -> Self {
        let total_tokens = blocks.iter().map(|b| b.final_tokens).sum();
        let compression_applied = !dropped.is_empty() || blocks.iter().any(|b| b.is_compressed());
        Self {
            blocks,
            total_tokens,
            compression_applied,
            dropped,
        }
    }

    /// Look up the block contributed by a producer.
    pub fn block(&self, source_id: &str) -> Option<&ContentBlock> {
        self.blocks.iter().find(|b| b.source_id == source_id)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Final output of one orchestrated query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub answer: String,
    pub fused_context: FusedContext,
    pub model: String,
    pub usage: TokenUsage,
}
