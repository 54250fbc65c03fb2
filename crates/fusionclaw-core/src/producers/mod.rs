//! Built-in producers.
//!
//! - [`StaticProducer`]: configured summary and facts
//! - [`CodeAnalyzerProducer`]: source tree structure for a path input
//! - [`WebSearchProducer`]: DuckDuckGo Lite results for a query input

pub mod code_analyzer;
pub mod static_producer;
pub mod web_search;

pub use code_analyzer::CodeAnalyzerProducer;
pub use static_producer::StaticProducer;
pub use web_search::WebSearchProducer;

use std::sync::Arc;

use fusionclaw_config::{ProducerEntryConfig, ProducerKind};

use crate::producer::Producer;

/// Instantiate the built-in producer described by a config entry.
pub fn from_entry(entry: &ProducerEntryConfig) -> Arc<dyn Producer> {
    match entry.kind {
        ProducerKind::Static => Arc::new(StaticProducer::from_entry(entry)),
        ProducerKind::CodeAnalyzer => {
            let mut producer = CodeAnalyzerProducer::new(entry.max_files).with_id(&entry.id);
            if !entry.description.is_empty() {
                producer = producer.with_description(&entry.description);
            }
            Arc::new(producer)
        }
        ProducerKind::WebSearch => {
            let mut producer = WebSearchProducer::new(entry.max_results).with_id(&entry.id);
            if !entry.description.is_empty() {
                producer = producer.with_description(&entry.description);
            }
            Arc::new(producer)
        }
    }
}
