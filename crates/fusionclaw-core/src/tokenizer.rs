//! Token counting for budget accounting.
//!
//! The fusion engine only needs a deterministic `count(text, model)`. Two
//! implementations are provided:
//!
//! - [`BpeTokenizer`]: byte-pair encoding via `tiktoken-rs`, matching the
//!   synthesis model where the encoding is known and falling back to
//!   `cl100k_base` otherwise.
//! - [`EstimateTokenizer`]: the ~4 bytes per token approximation, useful when
//!   exact counts are not worth the encoding tables.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use fusionclaw_config::TokenizerKind;

/// Deterministic token counter. Must be total: never fails, never panics.
pub trait Tokenizer: Send + Sync {
    /// Count tokens in `text` as seen by `model`.
    fn count(&self, text: &str, model: &str) -> usize;
}

/// Estimate the token count for a string (~4 bytes per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Approximate tokenizer; ignores the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimateTokenizer;

impl Tokenizer for EstimateTokenizer {
    fn count(&self, text: &str, _model: &str) -> usize {
        estimate_tokens(text)
    }
}

/// BPE tokenizer with one cached encoding per model identifier.
#[derive(Default)]
pub struct BpeTokenizer {
    encodings: Mutex<HashMap<String, Option<Arc<CoreBPE>>>>,
}

impl BpeTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve (and cache) the encoding for `model`. `None` means no encoding
    /// could be built at all and callers should estimate.
    fn encoding(&self, model: &str) -> Option<Arc<CoreBPE>> {
        if let Ok(cache) = self.encodings.lock()
            && let Some(cached) = cache.get(model)
        {
            return cached.clone();
        }

        let encoding = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Some(Arc::new(bpe)),
            Err(_) => {
                debug!(model, "Unknown model for BPE, using cl100k_base");
                match tiktoken_rs::cl100k_base() {
                    Ok(bpe) => Some(Arc::new(bpe)),
                    Err(e) => {
                        warn!(error = %e, "Failed to build cl100k_base, estimating tokens");
                        None
                    }
                }
            }
        };

        if let Ok(mut cache) = self.encodings.lock() {
            cache.insert(model.to_string(), encoding.clone());
        }
        encoding
    }
}

impl std::fmt::Debug for BpeTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.encodings.lock().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("BpeTokenizer")
            .field("cached_models", &cached)
            .finish()
    }
}

impl Tokenizer for BpeTokenizer {
    fn count(&self, text: &str, model: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.encoding(model) {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => estimate_tokens(text),
        }
    }
}

/// Build the tokenizer selected in configuration.
pub fn create_tokenizer(kind: TokenizerKind) -> Arc<dyn Tokenizer> {
    match kind {
        TokenizerKind::Bpe => Arc::new(BpeTokenizer::new()),
        TokenizerKind::Estimate => Arc::new(EstimateTokenizer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        // "hello world" = 11 bytes ≈ 3 tokens
        assert_eq!(estimate_tokens("hello world"), 3);
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens(&"x".repeat(100)), 25);
    }

    #[test]
    fn test_estimate_tokenizer_ignores_model() {
        let t = EstimateTokenizer;
        assert_eq!(t.count("abcdefgh", "gpt-4o"), t.count("abcdefgh", "whatever"));
    }

    #[test]
    fn test_bpe_counts_are_positive_and_deterministic() {
        let t = BpeTokenizer::new();
        let a = t.count("hello world", "gpt-4o");
        let b = t.count("hello world", "gpt-4o");
        assert!(a > 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_bpe_empty_text_is_zero() {
        let t = BpeTokenizer::new();
        assert_eq!(t.count("", "gpt-4o"), 0);
    }

    #[test]
    fn test_bpe_unknown_model_falls_back() {
        let t = BpeTokenizer::new();
        let n = t.count("the quick brown fox", "definitely-not-a-model");
        assert!(n > 0);
        // Cached under the unknown name after the first lookup
        assert_eq!(t.count("the quick brown fox", "definitely-not-a-model"), n);
    }

    #[test]
    fn test_bpe_longer_text_has_more_tokens() {
        let t = BpeTokenizer::new();
        let short = t.count("word", "gpt-4");
        let long = t.count(&"word ".repeat(50), "gpt-4");
        assert!(long > short);
    }

    #[test]
    fn test_create_tokenizer_estimate() {
        let t = create_tokenizer(TokenizerKind::Estimate);
        assert_eq!(t.count("abcd", "any"), 1);
    }
}
