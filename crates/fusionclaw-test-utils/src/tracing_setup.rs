//! Tracing for tests that do not go through `test-log`.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset: fusion decisions and fan-out
/// events from the core crate, warnings from everything else.
pub const DEFAULT_TEST_FILTER: &str = "warn,fusionclaw_core=debug";

/// Install a fmt subscriber on the test writer.
///
/// Only the first call in a process installs anything; later calls return
/// without effect, so every test may call it.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .try_init();
}
