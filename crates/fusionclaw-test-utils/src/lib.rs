#![deny(unsafe_code)]

//! Shared test utilities for the FusionClaw workspace.
//!
//! Provides finding fixtures, a word-counting tokenizer, mock producers and
//! providers, config builders, and tracing helpers so that individual crate
//! tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! fusionclaw-test-utils = { workspace = true }
//! ```
//!
//! Types from `fusionclaw-core` used here come from the library build of
//! that crate, so tests that combine them belong in `tests/` directories,
//! not in `#[cfg(test)]` modules inside `fusionclaw-core` itself.

pub mod config;
pub mod fixtures;
pub mod mocks;
pub mod tokenizer;
pub mod tracing_setup;

pub use config::{TempConfigFile, TestConfigBuilder};
pub use fixtures::FindingBuilder;
pub use mocks::{MockProducer, RequestLog, ScriptedProvider};
pub use tokenizer::WordTokenizer;
pub use tracing_setup::init_test_tracing;
