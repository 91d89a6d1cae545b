//! Default configuration constants.

/// Default versions/runs API base URL.
pub(super) const DEFAULT_API_BASE_URL: &str = "https://run.workflowai.com";
/// Env var consulted for the API key when the file does not name another one.
pub(super) const DEFAULT_API_KEY_ENV: &str = "WORKFLOWAI_API_KEY";
/// Tenant placeholder resolved server-side from the API key.
pub(super) const DEFAULT_TENANT: &str = "_";
/// Default timeout for API requests, streaming runs included.
pub(super) const DEFAULT_API_TIMEOUT_SECS: u64 = 120;
/// Local config file name, also used under the global config directory.
pub(super) const CONFIG_FILE_NAME: &str = "playground.toml";
pub(super) const CONFIG_DIR_NAME: &str = "playground";
