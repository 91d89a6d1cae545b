//! Environment overrides.
//!
//! `PLAYGROUND_*` variables win over the file for the active invocation.

use crate::error::ConfigError;

use super::Config;

pub(super) const ENV_API_KEY: &str = "PLAYGROUND_API_KEY";
pub(super) const ENV_BASE_URL: &str = "PLAYGROUND_BASE_URL";
pub(super) const ENV_TENANT: &str = "PLAYGROUND_TENANT";
pub(super) const ENV_TIMEOUT_SECS: &str = "PLAYGROUND_TIMEOUT_SECS";

/// Non-empty, trimmed value of `name`.
pub(super) fn env_value<FEnv>(env_lookup: &FEnv, name: &str) -> Option<String>
where
    FEnv: Fn(&str) -> Option<String>,
{
    env_lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(super) fn apply_runtime_env_overrides<FEnv>(
    config: &mut Config,
    env_lookup: &FEnv,
) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(key) = env_value(env_lookup, ENV_API_KEY) {
        config.api.api_key = key;
    }
    if let Some(url) = env_value(env_lookup, ENV_BASE_URL) {
        config.api.base_url = url;
    }
    if let Some(tenant) = env_value(env_lookup, ENV_TENANT) {
        config.api.tenant = tenant;
    }
    if let Some(timeout) = env_value(env_lookup, ENV_TIMEOUT_SECS) {
        let parsed = timeout.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!(
                "invalid {ENV_TIMEOUT_SECS} value `{timeout}`: expected positive integer seconds"
            ))
        })?;
        // Zero would disable the timeout entirely.
        config.api.timeout_secs = parsed.max(1);
    }
    Ok(())
}
