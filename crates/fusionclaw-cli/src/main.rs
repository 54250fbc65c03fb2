#![deny(unsafe_code)]

//! FusionClaw CLI: run fused queries and inspect fusion offline.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use fusionclaw_config::AppConfig;
use fusionclaw_core::build_info;
use fusionclaw_core::{
    ContextFuser, Finding, FusedContext, Orchestrator, Priorities, Producer, ProducerRegistry,
    SynthesisResult, build_prompt,
};

/// FusionClaw: fuse findings from many producers into one synthesis call.
#[derive(Parser)]
#[command(name = "fusionclaw", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "fusionclaw.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run producers, fuse their findings, and synthesize an answer.
    Query(QueryArgs),

    /// Fuse findings from a JSON file without calling any producer or model.
    Fuse(FuseArgs),

    /// List configured producers.
    Producers {
        /// Only show producers whose id or description contains this text.
        #[arg(long)]
        search: Option<String>,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// Show build information.
    Version {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// The question to answer.
    text: String,

    /// Comma-separated producer ids (default: all configured producers).
    #[arg(long, value_delimiter = ',')]
    producers: Vec<String>,

    /// Token budget for the fused context.
    #[arg(long)]
    budget: Option<usize>,

    /// Producer priority as `id=N`; repeatable, overrides config.
    #[arg(long = "priority", value_parser = parse_priority)]
    priorities: Vec<(String, i64)>,

    /// Print the full result as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct FuseArgs {
    /// JSON file holding an array of findings.
    #[arg(long)]
    findings: PathBuf,

    /// Token budget for the fused context.
    #[arg(long)]
    budget: Option<usize>,

    /// Producer priority as `id=N`; repeatable, overrides config.
    #[arg(long = "priority", value_parser = parse_priority)]
    priorities: Vec<(String, i64)>,

    /// User query embedded in the prompt.
    #[arg(long)]
    query: Option<String>,

    /// Print the synthesis prompt instead of the fused context JSON.
    #[arg(long, requires = "query")]
    prompt: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, from_file) = load_config(&cli.config).await?;
    init_tracing(cli.verbose, &config.logging.level);
    if from_file {
        debug!(path = %cli.config.display(), "Loaded configuration");
    } else {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Query(args) => cmd_query(&config, args).await?,
        Commands::Fuse(args) => cmd_fuse(&config, args).await?,
        Commands::Producers { search } => cmd_producers(&config, search.as_deref()),
        Commands::Config { show } => cmd_config(&config, &cli.config, show)?,
        Commands::Version { json } => cmd_version(json)?,
    }

    Ok(())
}

/// `RUST_LOG` wins, then `-v`, then the configured level.
fn init_tracing(verbose: u8, configured: &str) {
    let level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_query(config: &AppConfig, args: QueryArgs) -> Result<()> {
    let producers = select_producers(config, &args.producers)?;
    let orchestrator = Orchestrator::from_config_with_producers(config, producers)
        .context("failed to set up synthesis provider")?;

    let budget = resolve_budget(args.budget, orchestrator.fuser().default_budget())?;
    let priorities = merge_priorities(&config.fusion.priorities, args.priorities);

    let result = orchestrator
        .query_with(
            orchestrator.producers(),
            &args.text,
            orchestrator.model(),
            budget,
            Some(&priorities),
        )
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

/// The configured producers, narrowed to `ids` when any are given.
fn select_producers(config: &AppConfig, ids: &[String]) -> Result<Vec<Arc<dyn Producer>>> {
    let registry = ProducerRegistry::from_config(&config.producers);
    let producers = if ids.is_empty() {
        registry.list().to_vec()
    } else {
        registry.select(ids)?
    };
    if producers.is_empty() {
        bail!("no producers configured; add [[producers]] entries to the config file");
    }
    Ok(producers)
}

fn print_result(result: &SynthesisResult) {
    println!("{}", result.answer);
    println!();
    println!("---");
    println!("{}", context_report(&result.fused_context));
    println!(
        "model: {}, tokens: {} prompt + {} completion",
        result.model, result.usage.prompt_tokens, result.usage.completion_tokens
    );
}

/// One line per block plus the dropped producers.
fn context_report(fused: &FusedContext) -> String {
    let mut lines: Vec<String> = fused
        .blocks
        .iter()
        .map(|b| {
            format!(
                "{}: {} ({} of {} tokens)",
                b.source_id, b.fidelity, b.final_tokens, b.original_tokens
            )
        })
        .collect();
    if !fused.dropped.is_empty() {
        lines.push(format!("dropped: {}", fused.dropped.join(", ")));
    }
    lines.push(format!(
        "fused context: {} tokens{}",
        fused.total_tokens,
        if fused.compression_applied {
            ", compressed"
        } else {
            ""
        }
    ));
    lines.join("\n")
}

async fn cmd_fuse(config: &AppConfig, args: FuseArgs) -> Result<()> {
    let findings = read_findings(&args.findings).await?;
    let fuser = ContextFuser::from_config(config);
    let budget = resolve_budget(args.budget, fuser.default_budget())?;
    let priorities = merge_priorities(&config.fusion.priorities, args.priorities);

    let fused = fuser.fuse(&findings, budget, Some(&priorities));
    info!(
        findings = findings.len(),
        tokens = fused.total_tokens,
        compressed = fused.compression_applied,
        "Fused findings"
    );

    if args.prompt {
        println!("{}", build_prompt(&fused, args.query.as_deref().unwrap_or_default()));
    } else {
        println!("{}", serde_json::to_string_pretty(&fused)?);
    }
    Ok(())
}

async fn read_findings(path: &Path) -> Result<Vec<Finding>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read findings from '{}'", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("'{}' is not a JSON array of findings", path.display()))
}

fn cmd_producers(config: &AppConfig, search: Option<&str>) {
    let registry = ProducerRegistry::from_config(&config.producers);
    let producers = match search {
        Some(query) => registry.search(query),
        None => registry.list().to_vec(),
    };
    if producers.is_empty() {
        println!("No producers found.");
        return;
    }
    for producer in producers {
        println!("{:<20} {}", producer.id(), producer.description());
    }
}

fn cmd_config(config: &AppConfig, path: &Path, show: bool) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", path.display());
    }
    Ok(())
}

fn cmd_version(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&build_info::BUILD_INFO)?);
    } else {
        println!("fusionclaw {}", build_info::version_string());
    }
    Ok(())
}

/// Load the config file, or defaults when it does not exist.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("invalid config '{}'", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}

/// Parse an `id=N` priority argument.
fn parse_priority(s: &str) -> Result<(String, i64), String> {
    let (id, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=PRIORITY, got '{s}'"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("missing producer id in '{s}'"));
    }
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid priority in '{s}': {e}"))?;
    Ok((id.to_string(), value))
}

/// Config priorities overlaid with command-line ones.
fn merge_priorities(configured: &HashMap<String, i64>, overrides: Vec<(String, i64)>) -> Priorities {
    let mut priorities = configured.clone();
    priorities.extend(overrides);
    priorities
}

fn resolve_budget(requested: Option<usize>, default: NonZeroUsize) -> Result<NonZeroUsize> {
    match requested {
        None => Ok(default),
        Some(n) => NonZeroUsize::new(n).context("--budget must be greater than zero"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusionclaw_config::TokenizerKind;
    use fusionclaw_core::Fidelity;
    use fusionclaw_test_utils::fixtures::{pricing_finding, product_finding};
    use fusionclaw_test_utils::{TempConfigFile, TestConfigBuilder};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority("pricing=5"), Ok(("pricing".to_string(), 5)));
        assert_eq!(parse_priority(" news = -2 "), Ok(("news".to_string(), -2)));
        assert!(parse_priority("pricing").is_err());
        assert!(parse_priority("=3").is_err());
        assert!(parse_priority("pricing=high").is_err());
    }

    #[test]
    fn test_merge_priorities_overrides_config() {
        let configured = HashMap::from([("pricing".to_string(), 1), ("news".to_string(), 2)]);
        let merged = merge_priorities(&configured, vec![("pricing".to_string(), 9)]);
        assert_eq!(merged["pricing"], 9);
        assert_eq!(merged["news"], 2);
    }

    #[test]
    fn test_resolve_budget() {
        let default = NonZeroUsize::new(500).unwrap();
        assert_eq!(resolve_budget(None, default).unwrap().get(), 500);
        assert_eq!(resolve_budget(Some(42), default).unwrap().get(), 42);
        assert!(resolve_budget(Some(0), default).is_err());
    }

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from([
            "fusionclaw",
            "-vv",
            "query",
            "How should we price?",
            "--producers",
            "pricing,product",
            "--priority",
            "pricing=5",
            "--budget",
            "100",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Query(args) = cli.command else {
            panic!("expected query command");
        };
        assert_eq!(args.text, "How should we price?");
        assert_eq!(args.producers, vec!["pricing", "product"]);
        assert_eq!(args.priorities, vec![("pricing".to_string(), 5)]);
        assert_eq!(args.budget, Some(100));
        assert!(!args.json);
    }

    #[test]
    fn test_cli_prompt_requires_query() {
        let parsed = Cli::try_parse_from(["fusionclaw", "fuse", "--findings", "f.json", "--prompt"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_context_report() {
        let config = TestConfigBuilder::new()
            .tokenizer(TokenizerKind::Estimate)
            .build();
        let fuser = ContextFuser::from_config(&config);
        let fused = fuser.fuse(
            &[pricing_finding(), product_finding()],
            NonZeroUsize::new(250).unwrap(),
            None,
        );
        let report = context_report(&fused);
        assert!(report.contains("pricing: FULL"));
        assert!(report.ends_with(", compressed"));
    }

    #[test_log::test(tokio::test)]
    async fn test_read_findings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.json");
        let findings = vec![pricing_finding(), product_finding()];
        std::fs::write(&path, serde_json::to_string(&findings).unwrap()).unwrap();

        let read = read_findings(&path).await.unwrap();
        assert_eq!(read, findings);

        let config = TestConfigBuilder::new()
            .tokenizer(TokenizerKind::Estimate)
            .build();
        let fused = ContextFuser::from_config(&config).fuse_default(&read, None);
        assert!(fused.blocks.iter().all(|b| b.fidelity == Fidelity::Full));
    }

    #[tokio::test]
    async fn test_read_findings_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();
        assert!(read_findings(&path).await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_load_config_missing_uses_defaults() {
        let (config, from_file) = load_config(Path::new("/nonexistent/fusionclaw.toml"))
            .await
            .unwrap();
        assert!(!from_file);
        assert_eq!(config.fusion.token_budget, 120_000);
    }

    #[test_log::test(tokio::test)]
    async fn test_load_config_from_file() {
        let file = TempConfigFile::new("[fusion]\ntoken_budget = 500\n").await;
        let (config, from_file) = load_config(&file.path).await.unwrap();
        assert!(from_file);
        assert_eq!(config.fusion.token_budget, 500);
    }

    fn query_args(producers: &[&str]) -> QueryArgs {
        QueryArgs {
            text: "How should we price?".to_string(),
            producers: producers.iter().map(|p| p.to_string()).collect(),
            budget: None,
            priorities: Vec::new(),
            json: false,
        }
    }

    #[tokio::test]
    async fn test_query_reports_missing_producers_before_missing_key() {
        let mut config = AppConfig::default();
        config.synthesis.api_key_env = Some("FUSIONCLAW_CLI_TEST_UNSET_KEY".to_string());

        let err = cmd_query(&config, query_args(&[])).await.unwrap_err();
        assert!(err.to_string().contains("no producers configured"), "{err:#}");
    }

    #[test]
    fn test_select_producers_keeps_requested_order() {
        let config = TestConfigBuilder::new()
            .static_producer("pricing", "Competitor pricing", &[])
            .static_producer("product", "Product catalogue", &[])
            .build();

        let all = select_producers(&config, &[]).unwrap();
        let ids: Vec<&str> = all.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["pricing", "product"]);

        let picked = select_producers(&config, &["product".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id(), "product");

        let Err(err) = select_producers(&config, &["ghost".to_string()]) else {
            panic!("expected an unknown producer error");
        };
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_load_config_invalid_is_error() {
        let file = TempConfigFile::new("[fusion]\ntoken_budget = 0\n").await;
        assert!(load_config(&file.path).await.is_err());
    }
}
