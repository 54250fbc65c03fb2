//! Producer that returns fixed, configured content.

use fusionclaw_config::ProducerEntryConfig;

use crate::BoxFuture;
use crate::model::{Fact, Finding};
use crate::producer::{Producer, ProducerError};
use crate::tokenizer::estimate_tokens;

/// Returns the same summary and facts for every input.
///
/// Useful for pinning known context (pricing tables, product notes) next to
/// live producers, and for exercising fusion without network access.
#[derive(Debug, Clone)]
pub struct StaticProducer {
    id: String,
    description: String,
    summary: String,
    facts: Vec<Fact>,
}

impl StaticProducer {
    /// A static producer whose summary is its description.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            summary: String::new(),
            facts: Vec::new(),
        }
    }

    /// Build from a `[[producers]]` config entry.
    pub fn from_entry(entry: &ProducerEntryConfig) -> Self {
        Self::new(&entry.id, &entry.description)
            .with_summary(&entry.summary)
            .with_facts(
                entry
                    .facts
                    .iter()
                    .map(|f| Fact::new(&f.key, &f.value).with_confidence(f.confidence)),
            )
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_facts(mut self, facts: impl IntoIterator<Item = Fact>) -> Self {
        self.facts.extend(facts);
        self
    }

    fn finding(&self) -> Finding {
        let summary = if self.summary.is_empty() {
            &self.description
        } else {
            &self.summary
        };
        let raw_context = format!("Static producer: {}", self.description);
        let tokens = estimate_tokens(&raw_context);
        Finding::new(&self.id, summary.as_str())
            .with_facts(self.facts.iter().cloned())
            .with_raw_context(raw_context)
            .with_token_count(tokens)
    }
}

impl Producer for StaticProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, _input: &str) -> BoxFuture<'_, Result<Finding, ProducerError>> {
        let finding = self.finding();
        Box::pin(async move { Ok(finding) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusionclaw_config::{FactConfig, ProducerKind};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_static_finding() {
        let producer = StaticProducer::new("pricing", "Competitor pricing")
            .with_summary("Pricing snapshot")
            .with_facts([Fact::new("price", "$49")]);

        let finding = producer.run("anything").await.unwrap();
        assert_eq!(finding.producer_id, "pricing");
        assert_eq!(finding.summary, "Pricing snapshot");
        assert_eq!(finding.facts, vec![Fact::new("price", "$49")]);
        assert_eq!(finding.raw_context, "Static producer: Competitor pricing");
        assert!(finding.token_count > 0);
    }

    #[tokio::test]
    async fn test_summary_falls_back_to_description() {
        let producer = StaticProducer::new("notes", "Release notes");
        let finding = producer.run("q").await.unwrap();
        assert_eq!(finding.summary, "Release notes");
        assert!(finding.facts.is_empty());
    }

    #[test]
    fn test_from_entry() {
        let entry = ProducerEntryConfig {
            id: "pricing".to_string(),
            kind: ProducerKind::Static,
            description: "Competitor pricing".to_string(),
            summary: String::new(),
            facts: vec![FactConfig {
                key: "tier".to_string(),
                value: "pro".to_string(),
                confidence: 0.7,
            }],
            max_files: 20,
            max_results: 5,
        };
        let producer = StaticProducer::from_entry(&entry);
        assert_eq!(producer.id(), "pricing");
        assert_eq!(producer.description(), "Competitor pricing");
        let finding = producer.finding();
        assert_eq!(finding.facts[0].confidence, 0.7);
        assert_eq!(finding.summary, "Competitor pricing");
    }
}
