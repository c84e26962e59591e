//! Upstream backends.
//!
//! One [`Backend`] implementation per upstream protocol: REST (`rest`), SQL
//! (`sql`) and GraphQL (`graphql`). The active backend is chosen once at
//! startup by [`connect`] and is shared read-only by every call.

pub mod graphql;
pub mod rest;
pub mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::{BackendChoice, GatewayConfig};
use crate::error::{BackendInitError, ConfigError, ToolError, TransportError};
use crate::format::ToolResult;
use crate::schema::ToolSpec;
use crate::validate::ValidatedArguments;

pub use graphql::GraphqlBackend;
pub use rest::RestBackend;
pub use sql::SqlBackend;

// ── Queries and responses ───────────────────────────────────────────────────

/// How a structured SQL filter binds its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    Exact,
    /// `LIKE`; the value is wrapped in `%...%` when bound.
    Contains,
}

/// One positional `?` bind of a structured SQL query.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlBind {
    pub param: String,
    pub value: Value,
    pub mode: BindMode,
}

/// Backend-specific request, built from validated arguments.
/// Never carries credentials.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamQuery {
    Rest {
        path: String,
        params: Vec<(String, String)>,
    },
    Sql {
        statement: String,
        binds: Vec<SqlBind>,
    },
    Graphql {
        document: String,
        variables: Map<String, Value>,
    },
    /// Answered locally without contacting the upstream.
    Static(Value),
}

impl UpstreamQuery {
    /// Short form for logs.
    pub fn summary(&self) -> String {
        match self {
            Self::Rest { path, params } => format!("GET {path} ({} params)", params.len()),
            Self::Sql { statement, binds } => {
                format!("SQL {} chars, {} binds", statement.len(), binds.len())
            }
            Self::Graphql { variables, .. } => format!("GraphQL ({} variables)", variables.len()),
            Self::Static(_) => "static document".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamResponse {
    Http {
        status: u16,
        body: String,
        retry_after: Option<String>,
    },
    Rows(Vec<Value>),
    Static(Value),
}

// ── Resources ───────────────────────────────────────────────────────────────

/// A read-only MCP resource offered by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: &'static str,
}

// ── Backend trait ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Rest,
    Sql,
    Graphql,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Sql => "sql",
            Self::Graphql => "graphql",
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Configured backend name, e.g. `openfda`.
    fn name(&self) -> &str;

    fn protocol(&self) -> Protocol;

    /// Text returned in the MCP `initialize` result.
    fn instructions(&self) -> &str;

    /// Every tool this backend answers, in catalog order.
    fn tools(&self) -> Vec<ToolSpec>;

    /// Translate validated arguments into the upstream request.
    fn build(&self, tool: &ToolSpec, args: &ValidatedArguments) -> Result<UpstreamQuery, ToolError>;

    /// The single suspension point of a call.
    async fn send(&self, query: &UpstreamQuery) -> Result<UpstreamResponse, TransportError>;

    fn format(
        &self,
        tool: &ToolSpec,
        args: &ValidatedArguments,
        query: &UpstreamQuery,
        response: UpstreamResponse,
    ) -> Result<ToolResult, ToolError>;

    fn resources(&self) -> Vec<Resource> {
        Vec::new()
    }

    fn read_resource(&self, _uri: &str) -> Option<String> {
        None
    }
}

/// Catalog entry that lost its route; only reachable through a catalog bug.
pub(crate) fn missing_route(tool: &str) -> ToolError {
    ToolError::unknown(format!("no upstream route registered for tool '{tool}'"))
}

/// Render a scalar argument as a query-string value.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Construct the backend selected by `config`.
pub async fn connect(config: &GatewayConfig) -> Result<Arc<dyn Backend>, BackendInitError> {
    let backend: Arc<dyn Backend> = match config.backend {
        BackendChoice::OpenFda => Arc::new(RestBackend::openfda(
            require_url(config)?,
            &config.upstream,
            &config.tool_prefix,
        )?),
        BackendChoice::OpenTargets => Arc::new(GraphqlBackend::opentargets(
            require_url(config)?,
            &config.upstream,
            &config.tool_prefix,
        )?),
        BackendChoice::OpenGenes => Arc::new(
            SqlBackend::open(&config.db_path, config.upstream.timeout, &config.tool_prefix)
                .await?,
        ),
    };
    Ok(backend)
}

fn require_url(config: &GatewayConfig) -> Result<url::Url, ConfigError> {
    config
        .upstream
        .base_url
        .clone()
        .ok_or_else(|| ConfigError::Invalid {
            var: "UPSTREAM_BASE_URL",
            value: String::new(),
            reason: format!("backend '{}' needs an upstream URL", config.backend),
        })
}
