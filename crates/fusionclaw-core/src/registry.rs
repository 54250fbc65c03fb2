//! Producer registry.
//!
//! An explicit, insertion-ordered collection of producers. Callers build one
//! (by hand or from config), then hand the orchestrator either the whole set
//! or a [`select`](ProducerRegistry::select)ed subset.

use std::sync::Arc;

use serde::Serialize;

use fusionclaw_config::ProducerEntryConfig;

use crate::producer::Producer;
use crate::producers;

/// Errors from registry lookups.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("producer '{id}' not found (available: {})", available.join(", "))]
    NotFound { id: String, available: Vec<String> },
}

/// Serializable listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProducerInfo {
    pub id: String,
    pub description: String,
}

/// Registry of available producers, in registration order.
#[derive(Default, Clone)]
pub struct ProducerRegistry {
    producers: Vec<Arc<dyn Producer>>,
}

impl ProducerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the built-in producers listed in config, in order.
    pub fn from_config(entries: &[ProducerEntryConfig]) -> Self {
        let mut registry = Self::new();
        for entry in entries {
            registry.add(producers::from_entry(entry));
        }
        tracing::debug!(producers = registry.len(), "Built producer registry from config");
        registry
    }

    /// Register a producer. One with the same id is replaced in place.
    pub fn add(&mut self, producer: Arc<dyn Producer>) {
        match self.position(producer.id()) {
            Some(idx) => self.producers[idx] = producer,
            None => self.producers.push(producer),
        }
    }

    /// Unregister a producer, returning it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<Arc<dyn Producer>> {
        let idx = self.position(id)?;
        Some(self.producers.remove(idx))
    }

    /// Look up a producer by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Producer>> {
        self.position(id).map(|idx| Arc::clone(&self.producers[idx]))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// All producers, in registration order.
    pub fn list(&self) -> &[Arc<dyn Producer>] {
        &self.producers
    }

    /// All producer ids, in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.producers.iter().map(|p| p.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Case-insensitive substring match on id or description.
    pub fn search(&self, query: &str) -> Vec<Arc<dyn Producer>> {
        let query = query.to_lowercase();
        self.producers
            .iter()
            .filter(|p| {
                p.id().to_lowercase().contains(&query)
                    || p.description().to_lowercase().contains(&query)
            })
            .cloned()
            .collect()
    }

    /// Producers for `ids`, in the order requested.
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Arc<dyn Producer>>, RegistryError> {
        ids.iter()
            .map(|id| {
                let id = id.as_ref();
                self.get(id).ok_or_else(|| RegistryError::NotFound {
                    id: id.to_string(),
                    available: self.ids().into_iter().map(str::to_string).collect(),
                })
            })
            .collect()
    }

    /// Id and description of every producer.
    pub fn describe(&self) -> Vec<ProducerInfo> {
        self.producers
            .iter()
            .map(|p| ProducerInfo {
                id: p.id().to_string(),
                description: p.description().to_string(),
            })
            .collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.producers.iter().position(|p| p.id() == id)
    }
}

impl std::fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerRegistry")
            .field("producers", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::StaticProducer;
    use fusionclaw_config::ProducerKind;
    use pretty_assertions::assert_eq;

    fn producer(id: &str, description: &str) -> Arc<dyn Producer> {
        Arc::new(StaticProducer::new(id, description))
    }

    fn registry() -> ProducerRegistry {
        let mut registry = ProducerRegistry::new();
        registry.add(producer("pricing", "Competitor pricing"));
        registry.add(producer("product", "Product catalogue"));
        registry.add(producer("news", "Industry NEWS feed"));
        registry
    }

    #[test]
    fn test_empty_registry() {
        let registry = ProducerRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_insertion_order() {
        assert_eq!(registry().ids(), vec!["pricing", "product", "news"]);
    }

    #[test]
    fn test_add_replaces_in_place() {
        let mut registry = registry();
        registry.add(producer("product", "Replacement"));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.ids(), vec!["pricing", "product", "news"]);
        assert_eq!(registry.get("product").unwrap().description(), "Replacement");
    }

    #[test]
    fn test_remove() {
        let mut registry = registry();
        let removed = registry.remove("pricing").unwrap();
        assert_eq!(removed.id(), "pricing");
        assert!(!registry.contains("pricing"));
        assert!(registry.remove("pricing").is_none());
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let registry = registry();
        let ids = |found: Vec<Arc<dyn Producer>>| {
            found.iter().map(|p| p.id().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(ids(registry.search("news")), vec!["news"]);
        assert_eq!(ids(registry.search("PRO")), vec!["product"]);
        assert_eq!(ids(registry.search("pric")), vec!["pricing"]);
        assert!(registry.search("zzz").is_empty());
    }

    #[test]
    fn test_select_preserves_requested_order() {
        let selected = registry().select(&["news", "pricing"]).unwrap();
        let ids: Vec<&str> = selected.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["news", "pricing"]);
    }

    #[test]
    fn test_select_unknown_lists_available() {
        let Err(err) = registry().select(&["pricing", "ghost"]) else {
            panic!("expected NotFound for an unknown id");
        };
        let RegistryError::NotFound { id, available } = &err;
        assert_eq!(id, "ghost");
        assert_eq!(available, &vec!["pricing", "product", "news"]);
        assert_eq!(
            err.to_string(),
            "producer 'ghost' not found (available: pricing, product, news)"
        );
    }

    #[test]
    fn test_describe() {
        let info = registry().describe();
        assert_eq!(
            info[0],
            ProducerInfo {
                id: "pricing".to_string(),
                description: "Competitor pricing".to_string(),
            }
        );
    }

    #[test]
    fn test_from_config() {
        let entries = vec![
            ProducerEntryConfig {
                id: "pricing".to_string(),
                kind: ProducerKind::Static,
                description: "Competitor pricing".to_string(),
                summary: String::new(),
                facts: Vec::new(),
                max_files: 20,
                max_results: 5,
            },
            ProducerEntryConfig {
                id: "code".to_string(),
                kind: ProducerKind::CodeAnalyzer,
                description: String::new(),
                summary: String::new(),
                facts: Vec::new(),
                max_files: 20,
                max_results: 5,
            },
        ];
        let registry = ProducerRegistry::from_config(&entries);
        assert_eq!(registry.ids(), vec!["pricing", "code"]);
    }
}
