#![deny(unsafe_code)]

//! FusionClaw core: context fusion and orchestration.
//!
//! Independent producers each export a [`Finding`]. The [`ContextFuser`]
//! merges findings into one token-bounded [`FusedContext`], degrading
//! lower-priority findings when the budget is tight, and the
//! [`Orchestrator`] runs producers concurrently, fuses their findings, and
//! makes exactly one synthesis call on the result.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future and the standard return type for async
/// trait methods that require dynamic dispatch (`dyn Trait`).
///
/// Native `async fn` in traits produces opaque return types that are **not**
/// object-safe. Traits consumed via `Arc<dyn Trait>` or `Box<dyn Trait>` must
/// return a concrete `Pin<Box<dyn Future>>` instead.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Budget-bounded merging of findings and prompt serialization.
pub mod fusion;
/// Synthesis providers (OpenAI-compatible, Anthropic).
pub mod llm;
/// Findings, facts, fused blocks, and synthesis results.
pub mod model;
/// Concurrent fan-out, fusion, and synthesis.
pub mod orchestrator;
/// The producer trait and its errors.
pub mod producer;
/// Built-in producers.
pub mod producers;
/// Insertion-ordered producer registry.
pub mod registry;
/// Token counting.
pub mod tokenizer;

pub use fusion::{ContextFuser, Priorities, Rendering, build_prompt, render};
pub use llm::{LlmError, LlmProvider, TokenUsage};
pub use model::{ContentBlock, Fact, Fidelity, Finding, FusedContext, SynthesisResult};
pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorSettings};
pub use producer::{Producer, ProducerError};
pub use registry::{ProducerInfo, ProducerRegistry, RegistryError};
pub use tokenizer::{BpeTokenizer, EstimateTokenizer, Tokenizer, estimate_tokens};
