//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`PLAYGROUND_API_KEY`, `PLAYGROUND_BASE_URL`,
//!    `PLAYGROUND_TENANT`, `PLAYGROUND_TIMEOUT_SECS`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./playground.toml in the current directory
//! 4. $XDG_CONFIG_HOME/playground/playground.toml (or
//!    ~/.config/playground/playground.toml)
//! 5. Built-in defaults
//!
//! The API key falls back to the env var named by `api.api_key_env`
//! (`WORKFLOWAI_API_KEY` unless set) when the file does not hold one.

mod defaults;
mod env;
mod loader;
mod sources;
mod types;

pub use loader::load_config;
pub use sources::{config_root_dir, ConfigSource};
pub use types::{ApiConfig, Config, LoadedConfig, PlaygroundSettings, PollerSettings};
