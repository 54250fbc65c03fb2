//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::PathBuf;

use fusionclaw_config::{
    AppConfig, FactConfig, FanOutPolicy, ProducerEntryConfig, ProducerKind, TokenizerKind,
};
use tempfile::TempDir;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .token_budget(100)
///     .priority("pricing", 5)
///     .static_producer("pricing", "Competitor pricing", &[("price", "$49")])
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    /// Defaults plus an inline API key, so providers can be constructed.
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.synthesis.api_key = "test-key".to_string();
        Self { config }
    }

    pub fn model(mut self, model: &str) -> Self {
        self.config.synthesis.model = model.to_string();
        self
    }

    pub fn token_budget(mut self, budget: usize) -> Self {
        self.config.fusion.token_budget = budget;
        self
    }

    pub fn tokenizer(mut self, kind: TokenizerKind) -> Self {
        self.config.fusion.tokenizer = kind;
        self
    }

    pub fn priority(mut self, producer_id: &str, priority: i64) -> Self {
        self.config
            .fusion
            .priorities
            .insert(producer_id.to_string(), priority);
        self
    }

    pub fn producer_timeout_secs(mut self, secs: u64) -> Self {
        self.config.orchestrator.producer_timeout_secs = secs;
        self
    }

    pub fn fan_out(mut self, policy: FanOutPolicy) -> Self {
        self.config.orchestrator.fan_out = policy;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn static_producer(mut self, id: &str, description: &str, facts: &[(&str, &str)]) -> Self {
        self.config.producers.push(ProducerEntryConfig {
            id: id.to_string(),
            kind: ProducerKind::Static,
            description: description.to_string(),
            summary: String::new(),
            facts: facts
                .iter()
                .map(|(key, value)| FactConfig {
                    key: key.to_string(),
                    value: value.to_string(),
                    confidence: 1.0,
                })
                .collect(),
            max_files: 20,
            max_results: 5,
        });
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A TOML config file in an owned temp directory.
///
/// The directory is deleted when this value is dropped, even on panic.
pub struct TempConfigFile {
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TempConfigFile {
    pub async fn new(toml_content: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("fusionclaw.toml");
        tokio::fs::write(&path, toml_content)
            .await
            .expect("failed to write test config");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }
}
