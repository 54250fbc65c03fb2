#![deny(unsafe_code)]

//! FusionClaw configuration.
//!
//! [`AppConfig`] is read from a single TOML file. Every section is optional
//! and falls back to its defaults; [`AppConfig::validate`] runs after parsing
//! so a loaded config always has a positive budget, a model, and unique
//! producer ids.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Downstream synthesis call configuration.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Context fusion defaults.
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Producer fan-out behaviour.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Producers registered at startup.
    #[serde(default)]
    pub producers: Vec<ProducerEntryConfig>,
}

/// Which LLM backend serves the synthesis call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    /// OpenAI Chat Completions, or any compatible endpoint.
    #[default]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

impl LlmProviderKind {
    /// Environment variable consulted when no API key is configured.
    pub fn default_api_key_env(self) -> &'static str {
        match self {
            LlmProviderKind::OpenAi => "OPENAI_API_KEY",
            LlmProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

/// Synthesis backend configuration.
///
/// ## TOML Example
///
/// ```toml
/// [synthesis]
/// provider = "openai"
/// model = "gpt-4o"
/// api_key_env = "OPENAI_API_KEY"
/// base_url = "http://localhost:11434/v1"
/// max_tokens = 2048
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Provider kind: "openai" or "anthropic".
    #[serde(default)]
    pub provider: LlmProviderKind,

    /// Model identifier, also used to pick the tokenizer encoding.
    #[serde(default = "default_model")]
    pub model: String,

    /// Inline API key. Never written back out by `config --show`.
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Environment variable holding the API key when `api_key` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Custom API root for OpenAI-compatible servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Maximum tokens the synthesis call may generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            model: default_model(),
            api_key: String::new(),
            api_key_env: None,
            base_url: None,
            max_tokens: default_max_tokens(),
        }
    }
}

impl SynthesisConfig {
    /// Resolve the API key: the inline value wins, then the configured
    /// environment variable, then the provider's conventional variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        let var = self
            .api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env());
        std::env::var(var).ok().filter(|v| !v.is_empty())
    }

    /// Resolve the API root, honouring `OPENAI_BASE_URL` for OpenAI.
    pub fn resolve_base_url(&self) -> Option<String> {
        if self.base_url.is_some() {
            return self.base_url.clone();
        }
        match self.provider {
            LlmProviderKind::OpenAi => std::env::var("OPENAI_BASE_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            LlmProviderKind::Anthropic => None,
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

/// Token counting strategy used by the fusion engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// Byte-pair encoding matching the synthesis model.
    #[default]
    Bpe,
    /// ~4 bytes per token approximation.
    Estimate,
}

/// Context fusion defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Default token budget for the fused context.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Tokenizer used for budget accounting.
    #[serde(default)]
    pub tokenizer: TokenizerKind,

    /// Per-producer priorities (higher = kept at full fidelity first).
    /// Producers not listed default to 0.
    #[serde(default)]
    pub priorities: HashMap<String, i64>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            tokenizer: TokenizerKind::default(),
            priorities: HashMap::new(),
        }
    }
}

fn default_token_budget() -> usize {
    120_000
}

/// What happens when a producer fails during fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FanOutPolicy {
    /// Any producer failure fails the whole query.
    #[default]
    AllOrNothing,
    /// Failed producers are skipped; the query fails only if all fail.
    BestEffort,
}

/// Producer fan-out configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-producer timeout in seconds (0 = no timeout).
    #[serde(default)]
    pub producer_timeout_secs: u64,

    /// Failure policy for the fan-out.
    #[serde(default)]
    pub fan_out: FanOutPolicy,
}

impl OrchestratorConfig {
    /// The producer timeout, or `None` when disabled.
    pub fn producer_timeout(&self) -> Option<std::time::Duration> {
        (self.producer_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.producer_timeout_secs))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Built-in producer implementations selectable from config.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProducerKind {
    /// Fixed summary and facts.
    #[default]
    Static,
    /// Source tree symbol analysis; the query is a path.
    CodeAnalyzer,
    /// DuckDuckGo Lite web search.
    WebSearch,
}

/// A single producer entry.
///
/// ## TOML Example
///
/// ```toml
/// [[producers]]
/// id = "pricing"
/// kind = "static"
/// description = "Competitor pricing"
/// summary = "Pricing snapshot"
/// facts = [{ key = "price", value = "$49" }]
///
/// [[producers]]
/// id = "code"
/// kind = "code-analyzer"
/// max_files = 50
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerEntryConfig {
    /// Unique producer id.
    pub id: String,

    /// Implementation to instantiate.
    #[serde(default)]
    pub kind: ProducerKind,

    /// Human-readable description, also matched by registry search.
    #[serde(default)]
    pub description: String,

    /// Static summary (static producers only; defaults to the description).
    #[serde(default)]
    pub summary: String,

    /// Static facts (static producers only).
    #[serde(default)]
    pub facts: Vec<FactConfig>,

    /// Maximum files analyzed (code analyzer only).
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum search results kept (web search only).
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_files() -> usize {
    20
}

fn default_max_results() -> usize {
    5
}

/// A statically configured fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactConfig {
    pub key: String,
    pub value: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl AppConfig {
    /// Read, parse, and validate `path`.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), producers = config.producers.len(), "Loaded config");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.synthesis.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "synthesis.model must not be empty".to_string(),
            ));
        }
        if self.synthesis.max_tokens == 0 {
            return Err(ConfigError::Validation(
                "synthesis.max_tokens must be non-zero".to_string(),
            ));
        }
        if self.fusion.token_budget == 0 {
            return Err(ConfigError::Validation(
                "fusion.token_budget must be non-zero".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for (i, entry) in self.producers.iter().enumerate() {
            if entry.id.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "producers[{i}].id must not be empty"
                )));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "producers[{i}].id {:?} is defined more than once",
                    entry.id
                )));
            }
            for (j, fact) in entry.facts.iter().enumerate() {
                if !(0.0..=1.0).contains(&fact.confidence) {
                    return Err(ConfigError::Validation(format!(
                        "producers[{i}].facts[{j}].confidence must be in [0.0, 1.0], got {}",
                        fact.confidence
                    )));
                }
            }
            match entry.kind {
                ProducerKind::CodeAnalyzer if entry.max_files == 0 => {
                    return Err(ConfigError::Validation(format!(
                        "producers[{i}].max_files must be at least 1"
                    )));
                }
                ProducerKind::WebSearch if entry.max_results == 0 => {
                    return Err(ConfigError::Validation(format!(
                        "producers[{i}].max_results must be at least 1"
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.synthesis.provider, LlmProviderKind::OpenAi);
        assert_eq!(config.synthesis.model, "gpt-4o");
        assert_eq!(config.fusion.token_budget, 120_000);
        assert_eq!(config.fusion.tokenizer, TokenizerKind::Bpe);
        assert_eq!(config.orchestrator.fan_out, FanOutPolicy::AllOrNothing);
        assert_eq!(config.logging.level, "info");
        assert!(config.producers.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.fusion.token_budget, 120_000);
        assert_eq!(config.orchestrator.producer_timeout(), None);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [synthesis]
            provider = "anthropic"
            model = "claude-sonnet-4-20250514"
            api_key_env = "MY_KEY"
            max_tokens = 1024

            [fusion]
            token_budget = 8000
            tokenizer = "estimate"

            [fusion.priorities]
            pricing = 5
            product = 1

            [orchestrator]
            producer_timeout_secs = 30
            fan_out = "best-effort"

            [logging]
            level = "debug"

            [[producers]]
            id = "pricing"
            description = "Competitor pricing"
            summary = "Pricing snapshot"
            facts = [{ key = "price", value = "$49" }, { key = "tier", value = "pro", confidence = 0.7 }]

            [[producers]]
            id = "code"
            kind = "code-analyzer"
            max_files = 50
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.synthesis.provider, LlmProviderKind::Anthropic);
        assert_eq!(config.synthesis.max_tokens, 1024);
        assert_eq!(config.fusion.token_budget, 8000);
        assert_eq!(config.fusion.tokenizer, TokenizerKind::Estimate);
        assert_eq!(config.fusion.priorities.get("pricing"), Some(&5));
        assert_eq!(
            config.orchestrator.producer_timeout(),
            Some(std::time::Duration::from_secs(30))
        );
        assert_eq!(config.orchestrator.fan_out, FanOutPolicy::BestEffort);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.producers.len(), 2);
        assert_eq!(config.producers[0].kind, ProducerKind::Static);
        assert_eq!(config.producers[0].facts[1].confidence, 0.7);
        assert_eq!(config.producers[0].facts[0].confidence, 1.0);
        assert_eq!(config.producers[1].kind, ProducerKind::CodeAnalyzer);
        assert_eq!(config.producers[1].max_files, 50);
    }

    #[test]
    fn test_validation_rejects_zero_budget() {
        let toml = r#"
            [fusion]
            token_budget = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_model() {
        let toml = r#"
            [synthesis]
            model = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_max_tokens() {
        let toml = r#"
            [synthesis]
            max_tokens = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let toml = r#"
            [logging]
            level = "loud"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_unknown_provider_is_parse_error() {
        let toml = r#"
            [synthesis]
            provider = "carrier-pigeon"
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_rejects_duplicate_producer_ids() {
        let toml = r#"
            [[producers]]
            id = "a"

            [[producers]]
            id = "a"
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_validation_rejects_empty_producer_id() {
        let toml = r#"
            [[producers]]
            id = "  "
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_confidence() {
        let toml = r#"
            [[producers]]
            id = "a"
            facts = [{ key = "k", value = "v", confidence = 1.5 }]
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_max_results() {
        let toml = r#"
            [[producers]]
            id = "web"
            kind = "web-search"
            max_results = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_inline_api_key_wins() {
        let config = SynthesisConfig {
            api_key: "inline-key".to_string(),
            api_key_env: Some("FUSIONCLAW_TEST_UNSET_KEY_VAR".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("inline-key"));
    }

    #[test]
    fn test_missing_api_key_env_resolves_none() {
        let config = SynthesisConfig {
            api_key_env: Some("FUSIONCLAW_TEST_DEFINITELY_UNSET".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key(), None);
    }

    #[test]
    fn test_configured_base_url_wins() {
        let config = SynthesisConfig {
            base_url: Some("http://localhost:11434/v1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_base_url().as_deref(),
            Some("http://localhost:11434/v1")
        );
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = AppConfig::default();
        config.synthesis.api_key = "sk-secret".to_string();
        let out = toml::to_string_pretty(&config).unwrap();
        assert!(!out.contains("sk-secret"));
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[test_log::test(tokio::test)]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fusionclaw.toml");
        tokio::fs::write(&path, b"[fusion]\ntoken_budget = 4242\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.fusion.token_budget, 4242);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test_log::test(tokio::test)]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
