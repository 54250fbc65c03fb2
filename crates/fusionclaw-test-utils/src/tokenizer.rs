//! Deterministic tokenizer for hand-computable budgets.

use fusionclaw_core::Tokenizer;

/// One token per whitespace-separated word, regardless of model.
///
/// With this tokenizer a rendered finding costs exactly what you can count
/// by eye: `"Summary: Pricing"` is 2 tokens, each `"  - key: value"` fact
/// line is 3.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn count(&self, text: &str, _model: &str) -> usize {
        text.split_whitespace().count()
    }
}
