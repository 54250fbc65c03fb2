//! Context fusion: merges producer findings into one token-bounded context.
//!
//! When every finding fits the budget at full fidelity they are all kept
//! verbatim. Otherwise findings are ranked by priority (descending, ties keep
//! input order) and packed greedily, each one taking the first rung of the
//! fidelity ladder that still fits:
//!
//! ```text
//! FULL        summary + facts + raw context
//!  └▶ COMPRESSED  summary + facts
//!      └▶ FACTS-ONLY  facts (or a "no facts" placeholder)
//!          └▶ DROP
//! ```
//!
//! The allocation is greedy, not an optimal knapsack solve.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::{debug, info};

use fusionclaw_config::AppConfig;

use crate::model::{ContentBlock, Fidelity, Finding, FusedContext};
use crate::tokenizer::{self, Tokenizer};

/// Per-producer priorities. Higher values are protected first; producers
/// without an entry have priority 0.
pub type Priorities = HashMap<String, i64>;

/// A rung of the fidelity ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering {
    Full,
    Compressed,
    FactsOnly,
}

impl Rendering {
    /// Fidelity label the rendering is tagged with in the prompt.
    pub fn fidelity(self) -> Fidelity {
        match self {
            Rendering::Full => Fidelity::Full,
            Rendering::Compressed | Rendering::FactsOnly => Fidelity::Compressed,
        }
    }
}

impl std::fmt::Display for Rendering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rendering::Full => write!(f, "full"),
            Rendering::Compressed => write!(f, "compressed"),
            Rendering::FactsOnly => write!(f, "facts-only"),
        }
    }
}

/// Render a finding at the given rung of the ladder.
pub fn render(finding: &Finding, rendering: Rendering) -> String {
    let mut lines: Vec<String> = Vec::new();
    match rendering {
        Rendering::Full | Rendering::Compressed => {
            lines.push(format!("Summary: {}", finding.summary));
            if !finding.facts.is_empty() {
                lines.push("Key Facts:".to_string());
                for fact in &finding.facts {
                    if fact.confidence < 1.0 {
                        lines.push(format!(
                            "  - {}: {} (confidence: {:?})",
                            fact.key, fact.value, fact.confidence
                        ));
                    } else {
                        lines.push(format!("  - {}: {}", fact.key, fact.value));
                    }
                }
            }
            if rendering == Rendering::Full && !finding.raw_context.is_empty() {
                lines.push(format!("Full Context:\n{}", finding.raw_context));
            }
        }
        Rendering::FactsOnly => {
            if finding.facts.is_empty() {
                return format!("[{}: no facts available]", finding.producer_id);
            }
            lines.push("Key Facts:".to_string());
            for fact in &finding.facts {
                lines.push(format!("  - {}: {}", fact.key, fact.value));
            }
        }
    }
    lines.join("\n")
}

/// Serialize a fused context and the user query into the synthesis prompt.
///
/// Blocks are emitted in stored order, unmodified, each tagged with its
/// source and fidelity.
pub fn build_prompt(fused: &FusedContext, query: &str) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(fused.blocks.len() * 3 + 4);
    parts.push("<FUSED_CONTEXT>".to_string());
    for block in &fused.blocks {
        parts.push(format!(
            "<CONTEXT_BLOCK source=\"{}\" fidelity=\"{}\">",
            block.source_id, block.fidelity
        ));
        parts.push(block.content.clone());
        parts.push("</CONTEXT_BLOCK>".to_string());
    }
    parts.push("</FUSED_CONTEXT>".to_string());
    parts.push(String::new());
    parts.push(format!("<USER_QUERY>{query}</USER_QUERY>"));
    parts.join("\n")
}

/// The fusion engine.
///
/// Holds only configuration defaults; every [`fuse`](Self::fuse) call keeps its
/// own budget accounting, so one fuser can serve concurrent queries.
#[derive(Clone)]
pub struct ContextFuser {
    default_budget: NonZeroUsize,
    model: String,
    tokenizer: Arc<dyn Tokenizer>,
}

impl ContextFuser {
    /// Budget used when none is configured.
    pub const DEFAULT_BUDGET: NonZeroUsize = NonZeroUsize::new(120_000).unwrap();

    /// Create a fuser counting tokens with `tokenizer` as seen by `model`.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, model: impl Into<String>) -> Self {
        Self {
            default_budget: Self::DEFAULT_BUDGET,
            model: model.into(),
            tokenizer,
        }
    }

    /// Build a fuser from the `[fusion]` and `[synthesis]` config sections.
    pub fn from_config(config: &AppConfig) -> Self {
        let tokenizer = tokenizer::create_tokenizer(config.fusion.tokenizer);
        let budget =
            NonZeroUsize::new(config.fusion.token_budget).unwrap_or(Self::DEFAULT_BUDGET);
        Self::new(tokenizer, &config.synthesis.model).with_default_budget(budget)
    }

    /// Set the budget used by [`fuse_default`](Self::fuse_default).
    pub fn with_default_budget(mut self, budget: NonZeroUsize) -> Self {
        self.default_budget = budget;
        self
    }

    /// Count tokens as seen by a different model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn default_budget(&self) -> NonZeroUsize {
        self.default_budget
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Count tokens the way the fuser does.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count(text, &self.model)
    }

    /// Fuse with the default budget.
    pub fn fuse_default(&self, findings: &[Finding], priorities: Option<&Priorities>) -> FusedContext {
        self.fuse(findings, self.default_budget, priorities)
    }

    /// Fuse `findings` into a context of at most `budget` tokens.
    pub fn fuse(
        &self,
        findings: &[Finding],
        budget: NonZeroUsize,
        priorities: Option<&Priorities>,
    ) -> FusedContext {
        let budget = budget.get();

        let full_blocks: Vec<ContentBlock> = findings
            .iter()
            .map(|finding| {
                let content = render(finding, Rendering::Full);
                let tokens = self.count_tokens(&content);
                ContentBlock {
                    source_id: finding.producer_id.clone(),
                    content,
                    fidelity: Fidelity::Full,
                    original_tokens: tokens,
                    final_tokens: tokens,
                }
            })
            .collect();

        let full_total: usize = full_blocks.iter().map(|b| b.final_tokens).sum();
        if full_total <= budget {
            debug!(
                findings = findings.len(),
                tokens = full_total,
                budget,
                "All findings fit at full fidelity"
            );
            return FusedContext::from_blocks(full_blocks, Vec::new());
        }

        let priority_of = |finding: &Finding| -> i64 {
            priorities
                .and_then(|p| p.get(&finding.producer_id))
                .copied()
                .unwrap_or(0)
        };

        // Stable: equal priorities keep their input order.
        let mut ranked: Vec<(&Finding, ContentBlock)> =
            findings.iter().zip(full_blocks).collect();
        ranked.sort_by_key(|(finding, _)| Reverse(priority_of(finding)));

        let mut remaining = budget;
        let mut blocks = Vec::with_capacity(ranked.len());
        let mut dropped = Vec::new();

        for (finding, full_block) in ranked {
            match self.fit(finding, full_block, remaining) {
                Some((rendering, block)) => {
                    debug!(
                        producer = %finding.producer_id,
                        %rendering,
                        tokens = block.final_tokens,
                        original = block.original_tokens,
                        remaining,
                        "Packed finding"
                    );
                    remaining -= block.final_tokens;
                    blocks.push(block);
                }
                None => {
                    debug!(producer = %finding.producer_id, remaining, "Dropped finding");
                    dropped.push(finding.producer_id.clone());
                }
            }
        }

        let fused = FusedContext::from_blocks(blocks, dropped);
        info!(
            findings = findings.len(),
            full_tokens = full_total,
            budget,
            fused_tokens = fused.total_tokens,
            compressed = fused.blocks.iter().filter(|b| b.is_compressed()).count(),
            dropped = fused.dropped.len(),
            "Over budget, compressed fused context"
        );
        fused
    }

    /// Walk the ladder for one finding; `None` means drop.
    fn fit(
        &self,
        finding: &Finding,
        full_block: ContentBlock,
        remaining: usize,
    ) -> Option<(Rendering, ContentBlock)> {
        if full_block.final_tokens <= remaining {
            return Some((Rendering::Full, full_block));
        }

        for rendering in [Rendering::Compressed, Rendering::FactsOnly] {
            let content = render(finding, rendering);
            let tokens = self.count_tokens(&content);
            if tokens <= remaining {
                return Some((
                    rendering,
                    ContentBlock {
                        source_id: full_block.source_id,
                        content,
                        fidelity: rendering.fidelity(),
                        original_tokens: full_block.original_tokens,
                        final_tokens: tokens,
                    },
                ));
            }
        }
        None
    }
}

impl std::fmt::Debug for ContextFuser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextFuser")
            .field("default_budget", &self.default_budget)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Fact;
    use pretty_assertions::assert_eq;

    /// One token per whitespace-separated word.
    struct Words;

    impl Tokenizer for Words {
        fn count(&self, text: &str, _model: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    fn fuser() -> ContextFuser {
        ContextFuser::new(Arc::new(Words), "test-model")
    }

    fn budget(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn finding(id: &str, raw_words: usize) -> Finding {
        Finding::new(id, format!("{id} summary"))
            .with_facts([Fact::new("fact1", "value1"), Fact::new("fact2", "value2")])
            .with_raw_context("word ".repeat(raw_words).trim_end().to_string())
    }

    #[test]
    fn test_render_full() {
        let f = Finding::new("pricing", "Pricing snapshot")
            .with_fact(Fact::new("price", "$49"))
            .with_fact(Fact::new("tier", "pro").with_confidence(0.8))
            .with_raw_context("line one\nline two");
        assert_eq!(
            render(&f, Rendering::Full),
            "Summary: Pricing snapshot\nKey Facts:\n  - price: $49\n  - tier: pro (confidence: 0.8)\nFull Context:\nline one\nline two"
        );
    }

    #[test]
    fn test_render_compressed_omits_raw_context() {
        let f = Finding::new("a", "S")
            .with_fact(Fact::new("k", "v"))
            .with_raw_context("secret detail");
        assert_eq!(render(&f, Rendering::Compressed), "Summary: S\nKey Facts:\n  - k: v");
    }

    #[test]
    fn test_render_zero_confidence_keeps_decimal() {
        let f = Finding::new("a", "S").with_fact(Fact::new("k", "v").with_confidence(0.0));
        assert_eq!(
            render(&f, Rendering::Full),
            "Summary: S\nKey Facts:\n  - k: v (confidence: 0.0)"
        );
    }

    #[test]
    fn test_render_facts_only_drops_summary_and_confidence() {
        let f = Finding::new("a", "S").with_fact(Fact::new("k", "v").with_confidence(0.5));
        assert_eq!(render(&f, Rendering::FactsOnly), "Key Facts:\n  - k: v");
    }

    #[test]
    fn test_render_facts_only_placeholder() {
        let f = Finding::new("web", "nothing found");
        assert_eq!(render(&f, Rendering::FactsOnly), "[web: no facts available]");
    }

    #[test]
    fn test_render_without_facts_or_context() {
        let f = Finding::new("a", "just a summary");
        assert_eq!(render(&f, Rendering::Full), "Summary: just a summary");
    }

    #[test]
    fn test_full_merge_under_budget() {
        let result = fuser().fuse(&[finding("a", 50), finding("b", 50)], budget(100_000), None);
        assert!(!result.compression_applied);
        assert_eq!(result.blocks.len(), 2);
        assert!(result.blocks.iter().all(|b| b.fidelity == Fidelity::Full));
        assert_eq!(result.blocks[0].source_id, "a");
        assert_eq!(result.blocks[1].source_id, "b");
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn test_full_token_count() {
        // 13 structural words + raw context words
        let fuser = fuser();
        let result = fuser.fuse(&[finding("a", 200)], budget(1000), None);
        assert_eq!(result.blocks[0].final_tokens, 213);
        assert_eq!(result.total_tokens, 213);
    }

    #[test]
    fn test_budget_equal_to_total_is_lossless() {
        let findings = [finding("a", 10), finding("b", 20)];
        // 23 + 33
        let result = fuser().fuse(&findings, budget(56), None);
        assert!(!result.compression_applied);
        assert_eq!(result.total_tokens, 56);

        let result = fuser().fuse(&findings, budget(55), None);
        assert!(result.compression_applied);
    }

    #[test]
    fn test_priority_keeps_important_finding_full() {
        let fuser = fuser();
        let findings = [finding("nice_to_have", 200), finding("important", 200)];
        let full = fuser.count_tokens(&render(&findings[1], Rendering::Full));
        let compressed = fuser.count_tokens(&render(&findings[0], Rendering::Compressed));
        let priorities = Priorities::from([
            ("important".to_string(), 10),
            ("nice_to_have".to_string(), 1),
        ]);

        let result = fuser.fuse(&findings, budget(full + compressed + 10), Some(&priorities));

        let important = result.block("important").unwrap();
        let nice = result.block("nice_to_have").unwrap();
        assert_eq!(important.fidelity, Fidelity::Full);
        assert_eq!(nice.fidelity, Fidelity::Compressed);
        // Output follows priority order, not input order
        assert_eq!(result.blocks[0].source_id, "important");
        assert_eq!(result.blocks[1].source_id, "nice_to_have");
    }

    #[test]
    fn test_equal_priorities_keep_input_order() {
        // Budget fits the first finding full, then only facts for the second.
        let findings = [finding("first", 100), finding("second", 100)];
        let result = fuser().fuse(&findings, budget(113 + 8), None);
        assert_eq!(result.blocks[0].source_id, "first");
        assert_eq!(result.blocks[0].fidelity, Fidelity::Full);
        assert_eq!(result.blocks[1].source_id, "second");
        assert_eq!(result.blocks[1].content, "Key Facts:\n  - fact1: value1\n  - fact2: value2");
    }

    #[test]
    fn test_facts_only_fallback() {
        let result = fuser().fuse(&[finding("a", 500), finding("b", 500)], budget(10), None);
        assert!(result.compression_applied);
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].source_id, "a");
        assert_eq!(result.blocks[0].final_tokens, 8);
        assert_eq!(result.dropped, vec!["b".to_string()]);
    }

    #[test]
    fn test_tiny_budget_drops_everything() {
        let result = fuser().fuse(&[finding("a", 50)], budget(1), None);
        assert!(result.blocks.is_empty());
        assert_eq!(result.total_tokens, 0);
        assert!(result.compression_applied);
        assert_eq!(result.dropped, vec!["a".to_string()]);
    }

    #[test]
    fn test_finding_never_retries_earlier_rung() {
        // "big" only fits facts-only; "small" later still gets full fidelity
        // from what is left.
        let big = finding("big", 300);
        let small = Finding::new("small", "tiny");
        let priorities = Priorities::from([("big".to_string(), 2)]);
        let result = fuser().fuse(&[small, big], budget(10), Some(&priorities));
        assert_eq!(result.blocks[0].source_id, "big");
        assert_eq!(result.blocks[0].final_tokens, 8);
        assert_eq!(result.blocks[1].source_id, "small");
        assert_eq!(result.blocks[1].fidelity, Fidelity::Full);
        assert_eq!(result.total_tokens, 10);
    }

    #[test]
    fn test_unknown_priority_keys_are_ignored() {
        let findings = [finding("a", 100), finding("b", 100)];
        let priorities = Priorities::from([("ghost".to_string(), 99)]);
        let with = fuser().fuse(&findings, budget(150), Some(&priorities));
        let without = fuser().fuse(&findings, budget(150), None);
        assert_eq!(with, without);
    }

    #[test]
    fn test_negative_priority_sorts_last() {
        let findings = [finding("low", 10), finding("mid", 10)];
        let priorities = Priorities::from([("low".to_string(), -1)]);
        let result = fuser().fuse(&findings, budget(30), Some(&priorities));
        assert_eq!(result.blocks[0].source_id, "mid");
    }

    #[test]
    fn test_empty_findings() {
        let result = fuser().fuse(&[], budget(1), None);
        assert!(result.blocks.is_empty());
        assert_eq!(result.total_tokens, 0);
        assert!(!result.compression_applied);
    }

    #[test]
    fn test_fuse_default_uses_configured_budget() {
        let fuser = fuser().with_default_budget(budget(20));
        let result = fuser.fuse_default(&[finding("a", 100)], None);
        assert!(result.compression_applied);
        assert!(result.total_tokens <= 20);
    }

    #[test]
    fn test_from_config() {
        let mut config = AppConfig::default();
        config.fusion.token_budget = 777;
        config.fusion.tokenizer = fusionclaw_config::TokenizerKind::Estimate;
        let fuser = ContextFuser::from_config(&config);
        assert_eq!(fuser.default_budget().get(), 777);
        assert_eq!(fuser.model(), "gpt-4o");
        assert_eq!(fuser.count_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_build_prompt_layout() {
        let fused = fuser().fuse(&[Finding::new("a", "S")], budget(100), None);
        let prompt = build_prompt(&fused, "What is the threat?");
        assert_eq!(
            prompt,
            "<FUSED_CONTEXT>\n<CONTEXT_BLOCK source=\"a\" fidelity=\"FULL\">\nSummary: S\n</CONTEXT_BLOCK>\n</FUSED_CONTEXT>\n\n<USER_QUERY>What is the threat?</USER_QUERY>"
        );
    }

    #[test]
    fn test_build_prompt_tags_compression() {
        let fused = fuser().fuse(&[finding("a", 200)], budget(30), None);
        let prompt = build_prompt(&fused, "query");
        assert!(prompt.contains("fidelity=\"COMPRESSED\""));
        assert!(!prompt.contains("fidelity=\"FULL\""));
    }

    #[test]
    fn test_build_prompt_empty_context() {
        let prompt = build_prompt(&FusedContext::default(), "q");
        assert_eq!(prompt, "<FUSED_CONTEXT>\n</FUSED_CONTEXT>\n\n<USER_QUERY>q</USER_QUERY>");
    }
}
