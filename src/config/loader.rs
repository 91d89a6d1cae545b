//! Top-level config loading pipeline.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::defaults::DEFAULT_API_KEY_ENV;
use super::env::{apply_runtime_env_overrides, env_value};
use super::sources::{config_root_dir, read_config_text_with_sources};
use super::types::{FileConfig, PollerSettings};
use super::{ApiConfig, Config, LoadedConfig};

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<LoadedConfig, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

pub(super) fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<LoadedConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (config_text, source) =
        read_config_text_with_sources(path_override, &read_file, &config_root)?;
    let parsed: FileConfig = toml::from_str(&config_text)?;
    let mut config = resolve_file_config(parsed, &env_lookup)?;
    apply_runtime_env_overrides(&mut config, &env_lookup)?;
    Ok(LoadedConfig { config, source })
}

fn resolve_file_config<FEnv>(file: FileConfig, env_lookup: &FEnv) -> Result<Config, ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    let defaults = ApiConfig::default();
    let key_env = file
        .api
        .api_key_env
        .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
    let api_key = file
        .api
        .api_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .or_else(|| env_value(env_lookup, &key_env))
        .unwrap_or_default();

    let tenant = file.api.tenant.unwrap_or(defaults.tenant);
    if tenant.trim().is_empty() || tenant.contains('/') {
        return Err(ConfigError::Invalid(format!(
            "api.tenant `{tenant}` must be a non-empty path segment"
        )));
    }

    let poller_defaults = PollerSettings::default();
    let poller = PollerSettings {
        max_attempts: file
            .poller
            .max_attempts
            .unwrap_or(poller_defaults.max_attempts),
        base_delay_ms: file
            .poller
            .base_delay_ms
            .unwrap_or(poller_defaults.base_delay_ms),
    };
    if poller.max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "poller.max_attempts must be at least 1".to_string(),
        ));
    }

    Ok(Config {
        api: ApiConfig {
            base_url: file.api.base_url.unwrap_or(defaults.base_url),
            api_key,
            tenant,
            timeout_secs: file
                .api
                .timeout_secs
                .unwrap_or(defaults.timeout_secs)
                .max(1),
        },
        poller,
        playground: file.playground,
    })
}
