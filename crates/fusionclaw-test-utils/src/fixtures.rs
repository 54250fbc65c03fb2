//! Finding fixtures.
//!
//! The pricing/product pair is sized for [`WordTokenizer`](crate::WordTokenizer):
//!
//! | finding | FULL | COMPRESSED | FACTS-ONLY |
//! |---------|------|------------|------------|
//! | pricing | 80   | 11         | 8          |
//! | product | 90   | 11         | 8          |

use fusionclaw_core::{Fact, Finding, Priorities};

/// Fluent builder for [`Finding`] values in tests.
pub struct FindingBuilder {
    finding: Finding,
}

impl FindingBuilder {
    pub fn new(producer_id: &str) -> Self {
        Self {
            finding: Finding::new(producer_id, format!("{producer_id} summary")),
        }
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.finding.summary = summary.to_string();
        self
    }

    pub fn fact(mut self, key: &str, value: &str) -> Self {
        self.finding.facts.push(Fact::new(key, value));
        self
    }

    pub fn fact_with_confidence(mut self, key: &str, value: &str, confidence: f64) -> Self {
        self.finding
            .facts
            .push(Fact::new(key, value).with_confidence(confidence));
        self
    }

    pub fn raw_context(mut self, raw: &str) -> Self {
        self.finding.raw_context = raw.to_string();
        self
    }

    /// Raw context of exactly `n` distinct words, prefixed with `prefix`.
    pub fn raw_words(mut self, prefix: &str, n: usize) -> Self {
        self.finding.raw_context = (1..=n)
            .map(|i| format!("{prefix}{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        self
    }

    pub fn token_count(mut self, n: usize) -> Self {
        self.finding.token_count = n;
        self
    }

    pub fn build(self) -> Finding {
        self.finding
    }
}

/// Competitor pricing finding: 80 tokens at full fidelity.
pub fn pricing_finding() -> Finding {
    FindingBuilder::new("pricing")
        .summary("Competitor pricing")
        .fact("price", "$49")
        .fact("tier", "pro")
        .raw_words("pricing", 67)
        .build()
}

/// Product catalogue finding: 90 tokens at full fidelity.
pub fn product_finding() -> Finding {
    FindingBuilder::new("product")
        .summary("Product catalogue")
        .fact("sku", "FC-100")
        .fact("stock", "low")
        .raw_words("product", 77)
        .build()
}

/// Pricing protected over product.
pub fn scenario_priorities() -> Priorities {
    Priorities::from([("pricing".to_string(), 5), ("product".to_string(), 1)])
}

/// A finding with both facts and raw context, `raw` words long.
pub fn sized_finding(producer_id: &str, raw: usize) -> Finding {
    FindingBuilder::new(producer_id)
        .fact("fact1", "value1")
        .fact("fact2", "value2")
        .raw_words("w", raw)
        .build()
}
