//! Caller-visible error envelope and the internal upstream failure type.
//!
//! Every failure that crosses the dispatcher boundary is a [`ToolError`].
//! [`TransportError`] is produced by the upstream clients and converted by the
//! result formatter; it never reaches a caller directly.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum length of upstream text quoted inside an error message.
pub const MAX_QUOTED_BODY: usize = 500;

// ── ErrorKind ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidTool,
    InvalidArgument,
    UnsafeQuery,
    UpstreamRateLimited,
    UpstreamUnavailable,
    UpstreamClientError,
    UpstreamServerError,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidTool => "InvalidTool",
            Self::InvalidArgument => "InvalidArgument",
            Self::UnsafeQuery => "UnsafeQuery",
            Self::UpstreamRateLimited => "UpstreamRateLimited",
            Self::UpstreamUnavailable => "UpstreamUnavailable",
            Self::UpstreamClientError => "UpstreamClientError",
            Self::UpstreamServerError => "UpstreamServerError",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether a caller may reasonably retry the same call later.
    /// The gateway itself never retries.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::UpstreamRateLimited | Self::UpstreamUnavailable | Self::UpstreamServerError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ToolError ───────────────────────────────────────────────────────────────

/// Uniform error envelope returned for a failed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            upstream_status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.upstream_status = Some(status);
        self
    }

    pub fn invalid_tool(name: &str) -> Self {
        Self::new(ErrorKind::InvalidTool, format!("Unknown tool: {name}"))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn unsafe_query(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsafeQuery, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }
}

// ── TransportError ──────────────────────────────────────────────────────────

/// Failure reported by an upstream client before any application-level
/// response was obtained (or, for SQL, when the engine refused the statement).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("upstream request timed out after {0}s")]
    Timeout(u64),
    #[error("could not reach upstream: {0}")]
    Connect(String),
    /// The upstream engine rejected a well-formed request (e.g. SQL syntax error).
    #[error("upstream rejected the query: {0}")]
    Rejected(String),
    /// The database refused a write on its read-only connection.
    #[error("write attempted on read-only database: {0}")]
    ReadOnlyViolation(String),
    #[error("could not decode upstream response: {0}")]
    Decode(String),
    #[error("tool call cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Classify a reqwest failure. `timeout` is the limit the request ran under.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        // Strip the URL: it may carry the API key as a query parameter.
        let err = err.without_url();
        if err.is_timeout() {
            Self::Timeout(timeout.as_secs())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

// ── Registry / config errors ────────────────────────────────────────────────

/// Violation of a catalog invariant, detected when the registry is built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate tool name '{0}'")]
    DuplicateTool(String),
    #[error("tool '{tool}' declares parameter '{param}' more than once")]
    DuplicateParam { tool: String, param: String },
    #[error("tool '{tool}' parameter '{param}' has min {min} greater than max {max}")]
    InvalidBounds {
        tool: String,
        param: String,
        min: f64,
        max: f64,
    },
    #[error("tool '{tool}' parameter '{param}' has a default that violates its own schema: {reason}")]
    InvalidDefault {
        tool: String,
        param: String,
        reason: String,
    },
    #[error("tool '{tool}' parameter '{param}' declares an empty enum")]
    EmptyEnum { tool: String, param: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: unsupported value '{value}' (expected one of: {expected})")]
    Unsupported {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{var}: could not parse '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Failure while constructing the active backend at startup.
#[derive(Debug, thiserror::Error)]
pub enum BackendInitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to open database: {0}")]
    Database(#[from] sqlx::Error),
}

/// Truncate `s` to at most `max_len` bytes on a char boundary, appending `...`.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let boundary = s
            .char_indices()
            .take_while(|(i, _)| *i < max_len)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(max_len);
        format!("{}...", &s[..boundary])
    }
}
