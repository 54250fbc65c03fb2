//! Fuzz target for context fusion.
//!
//! Run with: cargo +nightly fuzz run fuzz_fuse
//!
//! Builds findings, priorities, and a budget from arbitrary bytes and checks
//! the accounting invariants of every fused context.

#![no_main]

use std::num::NonZeroUsize;
use std::sync::Arc;

use fusionclaw_core::{ContextFuser, EstimateTokenizer, Fact, Finding, Priorities};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let budget = NonZeroUsize::new(u16::from_le_bytes([data[0], data[1]]) as usize + 1)
        .unwrap_or(NonZeroUsize::MIN);
    let text = String::from_utf8_lossy(&data[2..]);

    let mut findings = Vec::new();
    let mut priorities = Priorities::new();
    for (i, chunk) in text.split('|').take(16).enumerate() {
        let id = format!("p{i}");
        let mut parts = chunk.split(';');
        let mut finding = Finding::new(&id, parts.next().unwrap_or_default())
            .with_raw_context(parts.next().unwrap_or_default());
        for fact in parts {
            let (key, value) = fact.split_once('=').unwrap_or((fact, ""));
            finding = finding.with_fact(Fact::new(key, value));
        }
        priorities.insert(id, chunk.len() as i64 % 7 - 3);
        findings.push(finding);
    }

    let fuser = ContextFuser::new(Arc::new(EstimateTokenizer), "fuzz");
    let fused = fuser.fuse(&findings, budget, Some(&priorities));

    let sum: usize = fused.blocks.iter().map(|b| b.final_tokens).sum();
    assert_eq!(fused.total_tokens, sum);
    assert!(fused.total_tokens <= budget.get());
    assert_eq!(fused.blocks.len() + fused.dropped.len(), findings.len());
    for block in &fused.blocks {
        assert!(block.final_tokens <= block.original_tokens);
    }
});
