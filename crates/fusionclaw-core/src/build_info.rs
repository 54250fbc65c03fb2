//! Build-time metadata embedded by the build script.

use serde::Serialize;

/// The git commit hash at build time (short form), or `unknown`.
pub const GIT_HASH: &str = env!("FUSIONCLAW_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("FUSIONCLAW_BUILD_TIMESTAMP");

/// The cargo profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("FUSIONCLAW_BUILD_PROFILE");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Snapshot of the constants above, for `fusionclaw version --json`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub profile: &'static str,
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    version: VERSION,
    git_hash: GIT_HASH,
    build_timestamp: BUILD_TIMESTAMP,
    profile: BUILD_PROFILE,
};

/// Version with git hash and profile, e.g. `"0.1.0 (abc1234, debug)"`.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}
