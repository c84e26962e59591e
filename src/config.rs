// Jaskier Shared Pattern -- config
//! Process-wide gateway configuration, read once from the environment.
//!
//! The resulting [`GatewayConfig`] is immutable and handed to the backend
//! constructor explicitly; nothing else reads the environment after startup.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DB_PATH: &str = "data/open_genes.sqlite";

// ── Backend selection ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    OpenFda,
    OpenGenes,
    OpenTargets,
}

impl BackendChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenFda => "openfda",
            Self::OpenGenes => "opengenes",
            Self::OpenTargets => "opentargets",
        }
    }

    /// Default upstream endpoint; the SQL backend has none.
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenFda => Some("https://api.fda.gov"),
            Self::OpenGenes => None,
            Self::OpenTargets => Some("https://api.platform.opentargets.org/api/v4/graphql"),
        }
    }

    pub fn default_tool_prefix(self) -> &'static str {
        match self {
            Self::OpenGenes => "opengenes_",
            _ => "",
        }
    }
}

impl FromStr for BackendChoice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openfda" => Ok(Self::OpenFda),
            "opengenes" => Ok(Self::OpenGenes),
            "opentargets" => Ok(Self::OpenTargets),
            _ => Err(ConfigError::Unsupported {
                var: "GATEWAY_BACKEND",
                value: s.to_string(),
                expected: "openfda, opengenes, opentargets",
            }),
        }
    }
}

impl fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportChoice {
    Http,
    Sse,
    Stdio,
}

impl FromStr for TransportChoice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "streamable-http" => Ok(Self::Http),
            "sse" => Ok(Self::Sse),
            "stdio" => Ok(Self::Stdio),
            _ => Err(ConfigError::Unsupported {
                var: "MCP_TRANSPORT",
                value: s.to_string(),
                expected: "http, sse, stdio",
            }),
        }
    }
}

// ── Upstream client settings ────────────────────────────────────────────────

/// Connection settings shared by the HTTP-based upstream clients.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub base_url: Option<Url>,
    pub api_key: Option<String>,
    /// Query parameter carrying the key (REST backends).
    pub api_key_param: String,
    /// Header carrying the key (GraphQL backend).
    pub api_key_header: String,
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            api_key_param: "api_key".to_string(),
            api_key_header: "x-api-key".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

// Hand-written so the key never reaches a log line.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_param", &self.api_key_param)
            .field("api_key_header", &self.api_key_header)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ── GatewayConfig ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct GatewayConfig {
    pub backend: BackendChoice,
    pub upstream: UpstreamConfig,
    pub db_path: PathBuf,
    pub tool_prefix: String,
    pub transport: TransportChoice,
    pub host: String,
    pub port: u16,
    pub auth_secret: Option<String>,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("backend", &self.backend)
            .field("upstream", &self.upstream)
            .field("db_path", &self.db_path)
            .field("tool_prefix", &self.tool_prefix)
            .field("transport", &self.transport)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_secret", &self.auth_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl GatewayConfig {
    /// Read configuration from the process environment (after `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    /// Empty or whitespace-only values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend = match get("GATEWAY_BACKEND") {
            Some(v) => v.parse()?,
            None => BackendChoice::OpenFda,
        };

        let base_url = match get("UPSTREAM_BASE_URL") {
            Some(v) => Some(parse_url("UPSTREAM_BASE_URL", &v)?),
            None => backend
                .default_base_url()
                .map(|u| parse_url("UPSTREAM_BASE_URL", u))
                .transpose()?,
        };

        let timeout_secs = match get("UPSTREAM_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|e| ConfigError::Invalid {
                    var: "UPSTREAM_TIMEOUT_SECS",
                    value: v.clone(),
                    reason: e.to_string(),
                })?
                .clamp(1, MAX_TIMEOUT_SECS),
            None => DEFAULT_TIMEOUT_SECS,
        };

        let defaults = UpstreamConfig::default();
        let upstream = UpstreamConfig {
            base_url,
            api_key: get("UPSTREAM_API_KEY").or_else(|| get("OPENFDA_API_KEY")),
            api_key_param: get("UPSTREAM_API_KEY_PARAM").unwrap_or(defaults.api_key_param),
            api_key_header: get("UPSTREAM_API_KEY_HEADER").unwrap_or(defaults.api_key_header),
            timeout: Duration::from_secs(timeout_secs),
        };

        let transport = match get("MCP_TRANSPORT") {
            Some(v) => v.parse()?,
            None => TransportChoice::Http,
        };

        let port = match get("MCP_PORT") {
            Some(v) => v.parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: "MCP_PORT",
                value: v.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        // TOOL_PREFIX may legitimately be set to empty, so read it raw.
        let tool_prefix = match lookup("TOOL_PREFIX") {
            Some(v) => v.trim().to_string(),
            None => backend.default_tool_prefix().to_string(),
        };

        Ok(Self {
            backend,
            upstream,
            db_path: get("OPENGENES_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            tool_prefix,
            transport,
            host: get("MCP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            auth_secret: get("AUTH_SECRET"),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}
