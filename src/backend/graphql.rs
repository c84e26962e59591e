//! GraphQL backend: each tool is a fixed query document and the validated
//! arguments are its `variables` (Open Targets style).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderName, RETRY_AFTER};
use serde_json::{Map, Value, json};
use url::Url;

use super::{Backend, Protocol, UpstreamQuery, UpstreamResponse, missing_route};
use crate::catalog::{self, opentargets};
use crate::config::UpstreamConfig;
use crate::error::{
    BackendInitError, ConfigError, ErrorKind, MAX_QUOTED_BODY, ToolError, TransportError,
    truncate_str,
};
use crate::format::{Payload, StatusOutcome, ToolResult, classify_status};
use crate::schema::ToolSpec;
use crate::validate::ValidatedArguments;

#[derive(Debug, Clone)]
pub struct GraphqlOperation {
    pub document: &'static str,
    pub spec: ToolSpec,
}

impl GraphqlOperation {
    pub fn new(document: &'static str, spec: ToolSpec) -> Self {
        Self { document, spec }
    }
}

pub struct GraphqlBackend {
    name: String,
    instructions: String,
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    api_key_header: HeaderName,
    timeout: Duration,
    operations: Vec<GraphqlOperation>,
}

impl GraphqlBackend {
    pub fn new(
        name: &str,
        instructions: &str,
        operations: Vec<GraphqlOperation>,
        endpoint: Url,
        upstream: &UpstreamConfig,
        prefix: &str,
    ) -> Result<Self, BackendInitError> {
        let api_key_header = HeaderName::from_bytes(upstream.api_key_header.as_bytes()).map_err(|e| {
            ConfigError::Invalid {
                var: "UPSTREAM_API_KEY_HEADER",
                value: upstream.api_key_header.clone(),
                reason: e.to_string(),
            }
        })?;
        let client = Client::builder()
            .timeout(upstream.timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("biomed-mcp-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let operations = operations
            .into_iter()
            .map(|op| GraphqlOperation {
                spec: catalog::prefixed(op.spec, prefix),
                document: op.document,
            })
            .collect();
        Ok(Self {
            name: name.to_string(),
            instructions: instructions.to_string(),
            client,
            endpoint,
            api_key: upstream.api_key.clone(),
            api_key_header,
            timeout: upstream.timeout,
            operations,
        })
    }

    pub fn opentargets(
        endpoint: Url,
        upstream: &UpstreamConfig,
        prefix: &str,
    ) -> Result<Self, BackendInitError> {
        Self::new(
            "opentargets",
            opentargets::INSTRUCTIONS,
            opentargets::operations(),
            endpoint,
            upstream,
            prefix,
        )
    }

    fn operation(&self, tool: &str) -> Option<&GraphqlOperation> {
        self.operations.iter().find(|op| op.spec.name == tool)
    }
}

#[async_trait]
impl Backend for GraphqlBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> Protocol {
        Protocol::Graphql
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn tools(&self) -> Vec<ToolSpec> {
        self.operations.iter().map(|op| op.spec.clone()).collect()
    }

    fn build(&self, tool: &ToolSpec, args: &ValidatedArguments) -> Result<UpstreamQuery, ToolError> {
        let op = self.operation(&tool.name).ok_or_else(|| missing_route(&tool.name))?;
        Ok(UpstreamQuery::Graphql {
            document: op.document.to_string(),
            variables: args.to_map(),
        })
    }

    async fn send(&self, query: &UpstreamQuery) -> Result<UpstreamResponse, TransportError> {
        let UpstreamQuery::Graphql {
            document,
            variables,
        } = query
        else {
            return Err(TransportError::Other(format!(
                "GraphQL backend cannot send {}",
                query.summary()
            )));
        };
        tracing::debug!(variables = variables.len(), "GraphQL upstream request");

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .json(&json!({ "query": document, "variables": variables }));
        if let Some(key) = &self.api_key {
            request = request.header(self.api_key_header.clone(), key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.timeout))?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.timeout))?;

        Ok(UpstreamResponse::Http {
            status,
            body,
            retry_after,
        })
    }

    fn format(
        &self,
        tool: &ToolSpec,
        args: &ValidatedArguments,
        _query: &UpstreamQuery,
        response: UpstreamResponse,
    ) -> Result<ToolResult, ToolError> {
        let UpstreamResponse::Http {
            status,
            body,
            retry_after,
        } = response
        else {
            return Err(ToolError::unknown("GraphQL backend received a non-HTTP response"));
        };

        if classify_status(status, &body, retry_after.as_deref())? == StatusOutcome::NoMatches {
            return Ok(ToolResult::new(&tool.name, args, Payload::Document(Value::Null)));
        }

        let mut doc: Value = serde_json::from_str(&body)
            .map_err(|e| ToolError::unknown(format!("upstream returned a non-JSON body: {e}")))?;
        let warnings = error_messages(&doc);
        let data = doc.get_mut("data").map(Value::take).unwrap_or(Value::Null);

        if !has_usable_data(&data) {
            // Null roots without errors: the id matched nothing.
            let Some(message) = warnings.first() else {
                return Ok(ToolResult::new(&tool.name, args, Payload::Document(Value::Null)));
            };
            return Err(ToolError::new(
                ErrorKind::UpstreamClientError,
                truncate_str(message, MAX_QUOTED_BODY),
            )
            .with_status(status));
        }

        let page = find_page(&data);
        let mut result = ToolResult::new(&tool.name, args, Payload::Document(data)).with_warnings(warnings);
        if let Some((total, returned)) = page {
            result = result.with_returned(returned).with_total(Some(total));
        }
        Ok(result)
    }
}

fn error_messages(doc: &Value) -> Vec<String> {
    doc.get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map_or_else(|| e.to_string(), str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `data` counts as usable when at least one root field is non-null.
fn has_usable_data(data: &Value) -> bool {
    data.as_object()
        .is_some_and(|fields| fields.values().any(|v| !v.is_null()))
}

/// First object carrying a numeric `count`/`total` beside a `rows`/`hits`
/// array, as `(total, rows returned)`.
fn find_page(value: &Value) -> Option<(u64, usize)> {
    match value {
        Value::Object(map) => page_of(map).or_else(|| map.values().find_map(find_page)),
        Value::Array(items) => items.iter().find_map(find_page),
        _ => None,
    }
}

fn page_of(map: &Map<String, Value>) -> Option<(u64, usize)> {
    let total = ["count", "total"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_u64))?;
    let rows = ["rows", "hits"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_array))?;
    Some((total, rows.len()))
}
