//! Result envelope and the upstream-failure taxonomy.
//!
//! Backends turn their raw [`UpstreamResponse`](crate::backend::UpstreamResponse)
//! into a [`ToolResult`] with the helpers here so every protocol maps HTTP
//! statuses and transport failures the same way.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{ErrorKind, MAX_QUOTED_BODY, ToolError, TransportError, truncate_str};
use crate::validate::ValidatedArguments;

// ── Success envelope ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A list of records (REST results, SQL rows).
    Records(Vec<Value>),
    /// A single structured document (GraphQL `data`, static documents).
    Document(Value),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Self::Records(rows) => rows.len(),
            Self::Document(Value::Null) => 0,
            Self::Document(Value::Array(items)) => items.len(),
            Self::Document(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Metadata attached to every successful call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMeta {
    pub tool: String,
    pub applied_parameters: Map<String, Value>,
    pub returned: usize,
    /// Upstream-reported total, present only when it differs from `returned`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Executed query text (SQL backend).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub payload: Payload,
    pub meta: CallMeta,
}

impl ToolResult {
    pub fn new(tool: &str, args: &ValidatedArguments, payload: Payload) -> Self {
        let returned = payload.len();
        Self {
            payload,
            meta: CallMeta {
                tool: tool.to_string(),
                applied_parameters: args.to_map(),
                returned,
                total: None,
                warnings: Vec::new(),
                query: None,
            },
        }
    }

    pub fn empty(tool: &str, args: &ValidatedArguments) -> Self {
        Self::new(tool, args, Payload::Records(Vec::new()))
    }

    /// Record an upstream total; ignored when it equals the returned count.
    #[must_use]
    pub fn with_total(mut self, total: Option<u64>) -> Self {
        self.meta.total = total.filter(|&t| t != self.meta.returned as u64);
        self
    }

    #[must_use]
    pub fn with_returned(mut self, returned: usize) -> Self {
        self.meta.returned = returned;
        self
    }

    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.meta.warnings = warnings;
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.meta.query = Some(query.into());
        self
    }

    pub fn structured(&self) -> Value {
        let (key, body) = match &self.payload {
            Payload::Records(rows) => ("results", Value::Array(rows.clone())),
            Payload::Document(doc) => ("data", doc.clone()),
        };
        let mut out = Map::new();
        out.insert(key.to_string(), body);
        out.insert("meta".to_string(), json!(self.meta));
        Value::Object(out)
    }
}

/// MCP `tools/call` result for either outcome.
pub fn call_result(outcome: &Result<ToolResult, ToolError>) -> Value {
    match outcome {
        Ok(result) => {
            let structured = result.structured();
            let text = serde_json::to_string_pretty(&structured)
                .unwrap_or_else(|_| structured.to_string());
            json!({
                "content": [{ "type": "text", "text": text }],
                "isError": false,
                "structuredContent": structured,
            })
        }
        Err(err) => json!({
            "content": [{ "type": "text", "text": format!("Error [{}]: {}", err.kind, err.message) }],
            "isError": true,
            "structuredContent": { "error": err },
        }),
    }
}

// ── Failure mapping ─────────────────────────────────────────────────────────

/// What a non-transport HTTP status means for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Success,
    /// 404: the query matched nothing.
    NoMatches,
}

/// Map an HTTP status to the error taxonomy. `body` is only quoted, never
/// trusted.
pub fn classify_status(
    status: u16,
    body: &str,
    retry_after: Option<&str>,
) -> Result<StatusOutcome, ToolError> {
    let detail = || upstream_message(body);
    match status {
        200..=299 => Ok(StatusOutcome::Success),
        404 => Ok(StatusOutcome::NoMatches),
        400 => Err(ToolError::new(
            ErrorKind::InvalidArgument,
            format!("upstream rejected the request arguments (HTTP 400): {}", detail()),
        )
        .with_status(status)),
        429 => {
            let hint = retry_after
                .map(|s| format!("; retry after {s}s"))
                .unwrap_or_default();
            Err(ToolError::new(
                ErrorKind::UpstreamRateLimited,
                format!("upstream rate limit exceeded (HTTP 429){hint}"),
            )
            .with_status(status))
        }
        500..=599 => Err(ToolError::new(
            ErrorKind::UpstreamServerError,
            format!("upstream server error (HTTP {status}): {}", detail()),
        )
        .with_status(status)),
        401..=499 => Err(ToolError::new(
            ErrorKind::UpstreamClientError,
            format!("upstream refused the request (HTTP {status}): {}", detail()),
        )
        .with_status(status)),
        _ => Err(ToolError::unknown(format!(
            "unexpected upstream status HTTP {status}: {}",
            detail()
        ))
        .with_status(status)),
    }
}

pub fn from_transport(err: TransportError) -> ToolError {
    let kind = match &err {
        TransportError::Timeout(_) | TransportError::Connect(_) => ErrorKind::UpstreamUnavailable,
        TransportError::Rejected(_) => ErrorKind::UpstreamClientError,
        TransportError::ReadOnlyViolation(_) => ErrorKind::UnsafeQuery,
        TransportError::Decode(_) | TransportError::Cancelled | TransportError::Other(_) => {
            ErrorKind::Unknown
        }
    };
    ToolError::new(kind, truncate_str(&err.to_string(), MAX_QUOTED_BODY))
}

/// Best-effort human-readable message from an upstream error body.
pub fn upstream_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        [
            "/error/message",
            "/errors/0/message",
            "/message",
            "/detail",
            "/error",
        ]
        .iter()
        .find_map(|p| v.pointer(p).and_then(Value::as_str))
        .map(str::to_string)
    });
    let text = from_json.unwrap_or_else(|| body.trim().to_string());
    if text.is_empty() {
        "no response body".to_string()
    } else {
        truncate_str(&text, MAX_QUOTED_BODY)
    }
}
