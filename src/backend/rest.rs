//! REST backend: validated arguments become query-string pairs on a fixed
//! endpoint path (openFDA style).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use serde_json::Value;
use url::Url;

use super::{Backend, Protocol, UpstreamQuery, UpstreamResponse, missing_route, scalar_text};
use crate::catalog::{self, openfda};
use crate::config::UpstreamConfig;
use crate::error::{ToolError, TransportError};
use crate::format::{Payload, StatusOutcome, ToolResult, classify_status};
use crate::schema::ToolSpec;
use crate::validate::ValidatedArguments;

/// A tool bound to the endpoint path it queries.
#[derive(Debug, Clone)]
pub struct RestEndpoint {
    pub path: &'static str,
    pub spec: ToolSpec,
}

impl RestEndpoint {
    pub fn new(path: &'static str, spec: ToolSpec) -> Self {
        Self { path, spec }
    }
}

pub struct RestBackend {
    name: String,
    instructions: String,
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    api_key_param: String,
    timeout: Duration,
    endpoints: Vec<RestEndpoint>,
}

impl RestBackend {
    pub fn new(
        name: &str,
        instructions: &str,
        endpoints: Vec<RestEndpoint>,
        base_url: Url,
        upstream: &UpstreamConfig,
        prefix: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(upstream.timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("biomed-mcp-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let endpoints = endpoints
            .into_iter()
            .map(|e| RestEndpoint {
                spec: catalog::prefixed(e.spec, prefix),
                ..e
            })
            .collect();
        Ok(Self {
            name: name.to_string(),
            instructions: instructions.to_string(),
            client,
            base_url,
            api_key: upstream.api_key.clone(),
            api_key_param: upstream.api_key_param.clone(),
            timeout: upstream.timeout,
            endpoints,
        })
    }

    pub fn openfda(base_url: Url, upstream: &UpstreamConfig, prefix: &str) -> Result<Self, reqwest::Error> {
        Self::new(
            "openfda",
            openfda::INSTRUCTIONS,
            openfda::endpoints(),
            base_url,
            upstream,
            prefix,
        )
    }

    fn endpoint(&self, tool: &str) -> Option<&RestEndpoint> {
        self.endpoints.iter().find(|e| e.spec.name == tool)
    }

    /// Full request URL. The API key goes last and only exists here.
    pub fn request_url(&self, path: &str, params: &[(String, String)]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| TransportError::Other(format!("base URL {} cannot carry a path", self.base_url)))?;
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        if !params.is_empty() || self.api_key.is_some() {
            let mut query = url.query_pairs_mut();
            query.extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            if let Some(key) = &self.api_key {
                query.append_pair(&self.api_key_param, key);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Backend for RestBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> Protocol {
        Protocol::Rest
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn tools(&self) -> Vec<ToolSpec> {
        self.endpoints.iter().map(|e| e.spec.clone()).collect()
    }

    fn build(&self, tool: &ToolSpec, args: &ValidatedArguments) -> Result<UpstreamQuery, ToolError> {
        let endpoint = self.endpoint(&tool.name).ok_or_else(|| missing_route(&tool.name))?;
        let params = args
            .iter()
            .filter_map(|(k, v)| scalar_text(v).map(|text| (k.to_string(), text)))
            .collect();
        Ok(UpstreamQuery::Rest {
            path: endpoint.path.to_string(),
            params,
        })
    }

    async fn send(&self, query: &UpstreamQuery) -> Result<UpstreamResponse, TransportError> {
        let UpstreamQuery::Rest { path, params } = query else {
            return Err(TransportError::Other(format!(
                "REST backend cannot send {}",
                query.summary()
            )));
        };
        let url = self.request_url(path, params)?;
        tracing::debug!(path = %path, params = params.len(), "REST upstream request");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
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
            return Err(ToolError::unknown("REST backend received a non-HTTP response"));
        };

        match classify_status(status, &body, retry_after.as_deref())? {
            StatusOutcome::NoMatches => Ok(ToolResult::empty(&tool.name, args)),
            StatusOutcome::Success => {
                let mut doc: Value = serde_json::from_str(&body).map_err(|e| {
                    ToolError::unknown(format!("upstream returned a non-JSON body: {e}"))
                })?;
                let total = doc.pointer("/meta/results/total").and_then(Value::as_u64);
                let records = match doc.get_mut("results").map(Value::take) {
                    Some(Value::Array(rows)) => rows,
                    Some(Value::Null) | None => Vec::new(),
                    Some(single) => vec![single],
                };
                Ok(ToolResult::new(&tool.name, args, Payload::Records(records)).with_total(total))
            }
        }
    }
}
