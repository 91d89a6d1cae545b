//! Configuration data model.
//!
//! `File*` structs mirror the TOML layout with every field optional; the
//! public structs hold resolved values.

use serde::Deserialize;
use std::time::Duration;

use super::defaults::{DEFAULT_API_BASE_URL, DEFAULT_API_TIMEOUT_SECS, DEFAULT_TENANT};
use super::sources::ConfigSource;
use crate::poller::{PollerConfig, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
use crate::slots::SlotIndex;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api: ApiConfig,
    pub poller: PollerSettings,
    pub playground: PlaygroundSettings,
}

/// Resolved API connection settings used by the HTTP backend.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub tenant: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.into(),
            api_key: String::new(),
            tenant: DEFAULT_TENANT.into(),
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
        }
    }
}

/// Bounds of the wait for freshly created runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
        }
    }
}

impl From<PollerSettings> for PollerConfig {
    fn from(settings: PollerSettings) -> Self {
        PollerConfig {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
        }
    }
}

/// Playground layout preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlaygroundSettings {
    /// Slots left out when no explicit slot is requested.
    pub hidden_slots: Vec<SlotIndex>,
}

/// Resolved configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
}

/// Raw `playground.toml` contents.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(super) struct FileConfig {
    pub api: FileApiConfig,
    pub poller: FilePollerConfig,
    pub playground: PlaygroundSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(super) struct FileApiConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Env var holding the API key.
    pub api_key_env: Option<String>,
    pub tenant: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(super) struct FilePollerConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
}
