//! Compile-time build metadata exposed to CLI surfaces.

/// Semver package version from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// VCS commit hash captured at build time.
pub const GIT_COMMIT: &str = env!("PLAYGROUND_BUILD_GIT_HASH");

/// Build timestamp captured at compile time.
pub const BUILD_TIMESTAMP: &str = env!("PLAYGROUND_BUILD_TIMESTAMP");

/// Help trailer block that surfaces build metadata in `playground --help`.
pub const HELP_BUILD_METADATA: &str = concat!(
    "Build metadata:\n  commit: ",
    env!("PLAYGROUND_BUILD_GIT_HASH"),
    "\n  built: ",
    env!("PLAYGROUND_BUILD_TIMESTAMP")
);

/// Render CLI version block used by `playground --version`.
pub fn cli_version_text() -> String {
    format!("playground {VERSION}\ncommit: {GIT_COMMIT}\nbuilt: {BUILD_TIMESTAMP}")
}
