//! Unified error types for the playground runner.

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Errors from the remote service layer.
#[derive(Debug)]
pub enum ApiError {
    /// Network / reqwest-level error.
    Http(reqwest::Error),
    /// Non-2xx status from the API.
    Status {
        code: u16,
        body: String,
        retry_after_secs: Option<u64>,
    },
    /// The response could not be decoded into the expected shape.
    InvalidResponse(String),
    /// The run stream reported a failure. The run may still exist server-side.
    Stream {
        message: String,
        run_id: Option<String>,
    },
}

impl ApiError {
    pub fn status(code: u16, body: String, retry_after_secs: Option<u64>) -> Self {
        Self::Status {
            code,
            body,
            retry_after_secs,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Http(inner) => inner.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Status {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    /// Run id embedded in a failed run stream, if the server created one.
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::Stream { run_id, .. } => run_id.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Status { code, body, .. } => write!(f, "status {code}: {body}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            Self::Stream { message, .. } => write!(f, "stream: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// TemplateError
// ---------------------------------------------------------------------------

/// Errors raised while scanning message templates for input variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{{`, `{%` or `{#` tag was never closed.
    Unclosed { message_index: usize, offset: usize },
    /// Expressions may only reference variables, not call functions.
    UnsupportedFunction { message_index: usize, expr: String },
    /// `{% endfor %}` without a matching `{% for %}`, or the reverse.
    UnbalancedBlock { message_index: usize, tag: String },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclosed {
                message_index,
                offset,
            } => write!(
                f,
                "message {message_index}: unclosed template tag at offset {offset}"
            ),
            Self::UnsupportedFunction {
                message_index,
                expr,
            } => write!(
                f,
                "message {message_index}: template functions are not supported (`{expr}`)"
            ),
            Self::UnbalancedBlock { message_index, tag } => {
                write!(f, "message {message_index}: unbalanced block tag `{tag}`")
            }
        }
    }
}

impl std::error::Error for TemplateError {}

// ---------------------------------------------------------------------------
// SchemaError
// ---------------------------------------------------------------------------

/// Batch-level failure while reconciling the task's input schema.
#[derive(Debug)]
pub enum SchemaError {
    Template(TemplateError),
    Update(ApiError),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(e) => write!(f, "template: {e}"),
            Self::Update(e) => write!(f, "schema update: {e}"),
        }
    }
}

impl std::error::Error for SchemaError {}

impl From<TemplateError> for SchemaError {
    fn from(e: TemplateError) -> Self {
        Self::Template(e)
    }
}

impl From<ApiError> for SchemaError {
    fn from(e: ApiError) -> Self {
        Self::Update(e)
    }
}

// ---------------------------------------------------------------------------
// OrchestratorError
// ---------------------------------------------------------------------------

/// Errors that abort a whole batch of runs.
///
/// Per-slot failures never surface here; they are recorded on the slot.
#[derive(Debug)]
pub enum OrchestratorError {
    Schema(SchemaError),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema(e) => write!(f, "schema reconciliation failed: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<SchemaError> for OrchestratorError {
    fn from(e: SchemaError) -> Self {
        Self::Schema(e)
    }
}
