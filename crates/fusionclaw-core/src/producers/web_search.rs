//! Web search producer backed by DuckDuckGo Lite (no API key needed).

use std::time::Duration;

use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::BoxFuture;
use crate::model::{Fact, Finding};
use crate::producer::{Producer, ProducerError};
use crate::tokenizer::estimate_tokens;

const DUCKDUCKGO_LITE_URL: &str = "https://lite.duckduckgo.com/lite/";
const USER_AGENT: &str = concat!("FusionClaw/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SNIPPET_FACT_CHARS: usize = 100;

/// One parsed search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Searches the web for the query input.
pub struct WebSearchProducer {
    id: String,
    description: String,
    max_results: usize,
    endpoint: String,
    client: Client,
}

impl WebSearchProducer {
    pub const DEFAULT_ID: &'static str = "web_search";

    /// Keep at most `max_results` hits per query.
    pub fn new(max_results: usize) -> Self {
        Self {
            id: Self::DEFAULT_ID.to_string(),
            description: "Searches the web for current information using DuckDuckGo".to_string(),
            max_results,
            endpoint: DUCKDUCKGO_LITE_URL.to_string(),
            client: Client::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Point at a different DuckDuckGo Lite compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProducerError> {
        let html = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .header("user-agent", USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let results = parse_results(&html);
        debug!(producer = %self.id, results = results.len(), "Parsed search results");
        Ok(results)
    }
}

impl std::fmt::Debug for WebSearchProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchProducer")
            .field("id", &self.id)
            .field("max_results", &self.max_results)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Producer for WebSearchProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, input: &str) -> BoxFuture<'_, Result<Finding, ProducerError>> {
        let query = input.to_string();
        Box::pin(async move {
            let results = self.search(&query).await?;
            Ok(build_finding(&self.id, &query, &results, self.max_results))
        })
    }
}

/// Turn search hits into a finding, keeping the first `max_results`.
pub fn build_finding(
    id: &str,
    query: &str,
    results: &[SearchResult],
    max_results: usize,
) -> Finding {
    if results.is_empty() {
        return Finding::new(id, format!("No web results found for: {query}"))
            .with_raw_context("Search returned no results.");
    }

    let kept = &results[..results.len().min(max_results)];
    let facts = kept.iter().enumerate().map(|(i, r)| {
        let snippet: String = r.snippet.chars().take(SNIPPET_FACT_CHARS).collect();
        Fact::new(format!("result_{}", i + 1), format!("{}: {snippet}", r.title))
    });
    let raw_context = kept
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}\n    URL: {}\n    {}\n", i + 1, r.title, r.url, r.snippet))
        .collect::<Vec<_>>()
        .join("\n");

    let tokens = estimate_tokens(&raw_context);
    Finding::new(
        id,
        format!("Found {} web results for '{query}'", results.len()),
    )
    .with_facts(facts)
    .with_raw_context(raw_context)
    .with_token_count(tokens)
}

/// Parse DuckDuckGo Lite result markup.
///
/// Each hit is an `<a rel="nofollow">` link, optionally followed by a
/// `td.result-snippet` cell before the next link. Relative links (ads,
/// pagination) are skipped along with any snippet that follows them.
pub fn parse_results(html: &str) -> Vec<SearchResult> {
    let Ok(selector) = Selector::parse(r#"a[rel="nofollow"], td.result-snippet"#) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut results: Vec<SearchResult> = Vec::new();
    let mut open = None;
    for element in document.select(&selector) {
        if element.value().name() == "a" {
            let url = element.value().attr("href").unwrap_or_default();
            let title = element_text(element);
            open = None;
            if url.is_empty() || url.starts_with('/') || title.is_empty() {
                continue;
            }
            results.push(SearchResult {
                title,
                url: url.to_string(),
                snippet: String::new(),
            });
            open = Some(results.len() - 1);
        } else if let Some(idx) = open.take() {
            results[idx].snippet = element_text(element);
        }
    }
    results
}

/// Visible text of an element with whitespace runs collapsed.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
