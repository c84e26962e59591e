//! Per-call pipeline.
//!
//! `Received → Validating → Building → (SafetyChecking) → Sending →
//! Formatting → Done`. Any stage may jump to `Done` with a [`ToolError`]; an
//! unknown tool goes straight from `Received` to `Done`. Nothing is retried.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backend::{Backend, UpstreamQuery};
use crate::error::{RegistryError, ToolError, TransportError};
use crate::format::{self, ToolResult};
use crate::safety;
use crate::schema::ToolRegistry;
use crate::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Validating,
    Building,
    SafetyChecking,
    Sending,
    Formatting,
    Done,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Shared entry point for every transport. Cheap to clone; holds only the
/// immutable registry and the backend.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    backend: Arc<dyn Backend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn Backend>) -> Result<Self, RegistryError> {
        let registry = ToolRegistry::new(backend.tools())?;
        tracing::info!(
            backend = backend.name(),
            protocol = backend.protocol().as_str(),
            tools = registry.len(),
            "tool registry built"
        );
        Ok(Self {
            registry: Arc::new(registry),
            backend,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Discovery catalog: `{name, description, inputSchema}` per tool.
    pub fn list_tools(&self) -> Vec<Value> {
        self.registry.descriptors()
    }

    pub async fn dispatch(&self, tool: &str, arguments: &Value) -> Result<ToolResult, ToolError> {
        self.dispatch_with_cancel(tool, arguments, &CancellationToken::new())
            .await
    }

    /// Like [`dispatch`](Self::dispatch), abandoning the upstream call as soon
    /// as `cancel` fires.
    pub async fn dispatch_with_cancel(
        &self,
        tool: &str,
        arguments: &Value,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let mut visited = Vec::new();
        self.run(tool, arguments, cancel, &mut visited).await
    }

    /// Dispatch and also return every state the call passed through.
    pub async fn dispatch_traced(
        &self,
        tool: &str,
        arguments: &Value,
    ) -> (Result<ToolResult, ToolError>, Vec<DispatchState>) {
        let mut visited = Vec::new();
        let outcome = self
            .run(tool, arguments, &CancellationToken::new(), &mut visited)
            .await;
        (outcome, visited)
    }

    async fn run(
        &self,
        tool: &str,
        arguments: &Value,
        cancel: &CancellationToken,
        visited: &mut Vec<DispatchState>,
    ) -> Result<ToolResult, ToolError> {
        let span = tracing::info_span!(
            "tool_call",
            tool = %tool,
            call_id = %uuid::Uuid::new_v4(),
        );
        async move {
            let outcome = self.pipeline(tool, arguments, cancel, visited).await;
            enter(visited, DispatchState::Done);
            match &outcome {
                Ok(result) => tracing::info!(
                    returned = result.meta.returned,
                    total = ?result.meta.total,
                    "tool call succeeded"
                ),
                Err(err) => tracing::warn!(
                    kind = %err.kind,
                    status = ?err.upstream_status,
                    message = %err.message,
                    "tool call failed"
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn pipeline(
        &self,
        tool: &str,
        arguments: &Value,
        cancel: &CancellationToken,
        visited: &mut Vec<DispatchState>,
    ) -> Result<ToolResult, ToolError> {
        enter(visited, DispatchState::Received);
        let spec = self
            .registry
            .get(tool)
            .ok_or_else(|| ToolError::invalid_tool(tool))?;

        enter(visited, DispatchState::Validating);
        let args = validate::validate(spec, arguments)?;

        enter(visited, DispatchState::Building);
        let query = self.backend.build(spec, &args)?;

        if let UpstreamQuery::Sql { statement, .. } = &query {
            enter(visited, DispatchState::SafetyChecking);
            safety::check(statement)?;
        }

        enter(visited, DispatchState::Sending);
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            sent = self.backend.send(&query) => sent,
        }
        .map_err(format::from_transport)?;

        enter(visited, DispatchState::Formatting);
        self.backend.format(spec, &args, &query, response)
    }
}

fn enter(visited: &mut Vec<DispatchState>, state: DispatchState) {
    tracing::debug!(state = %state, "dispatch state");
    visited.push(state);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::backend::{BindMode, Protocol, SqlBind, UpstreamResponse};
    use crate::error::ErrorKind;
    use crate::format::Payload;
    use crate::schema::{ParamSpec, ToolSpec};
    use crate::validate::ValidatedArguments;

    /// Echo backend: `echo` returns its arguments, `raw_sql` sends its `sql`
    /// argument as a SQL query, `hang` never completes.
    #[derive(Default)]
    struct EchoBackend {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Backend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        fn protocol(&self) -> Protocol {
            Protocol::Rest
        }

        fn instructions(&self) -> &str {
            ""
        }

        fn tools(&self) -> Vec<ToolSpec> {
            vec![
                ToolSpec::new("echo", "Echo").param(ParamSpec::integer("n").range(1.0, 10.0).default_value(3)),
                ToolSpec::new("raw_sql", "SQL").param(ParamSpec::string("sql").required()),
                ToolSpec::new("hang", "Never answers"),
            ]
        }

        fn build(&self, tool: &ToolSpec, args: &ValidatedArguments) -> Result<UpstreamQuery, ToolError> {
            Ok(match tool.name.as_str() {
                "raw_sql" => UpstreamQuery::Sql {
                    statement: args.get_str("sql").unwrap_or_default().to_string(),
                    binds: vec![SqlBind {
                        param: "sql".into(),
                        value: Value::Null,
                        mode: BindMode::Exact,
                    }],
                },
                _ => UpstreamQuery::Static(Value::Object(args.to_map())),
            })
        }

        async fn send(&self, query: &UpstreamQuery) -> Result<UpstreamResponse, TransportError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            match query {
                UpstreamQuery::Static(v) if v.as_object().is_some_and(|m| m.is_empty()) => {
                    std::future::pending().await
                }
                UpstreamQuery::Static(v) => Ok(UpstreamResponse::Static(v.clone())),
                _ => Ok(UpstreamResponse::Rows(vec![json!({"x": 1})])),
            }
        }

        fn format(
            &self,
            tool: &ToolSpec,
            args: &ValidatedArguments,
            _query: &UpstreamQuery,
            response: UpstreamResponse,
        ) -> Result<ToolResult, ToolError> {
            let payload = match response {
                UpstreamResponse::Rows(rows) => Payload::Records(rows),
                UpstreamResponse::Static(doc) => Payload::Document(doc),
                UpstreamResponse::Http { .. } => Payload::Records(Vec::new()),
            };
            Ok(ToolResult::new(&tool.name, args, payload))
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<EchoBackend>) {
        let backend = Arc::new(EchoBackend::default());
        (Dispatcher::new(backend.clone()).unwrap(), backend)
    }

    #[tokio::test]
    async fn happy_path_visits_every_non_sql_state() {
        let (d, _) = dispatcher();
        let (outcome, states) = d.dispatch_traced("echo", &json!({"n": 50})).await;
        let result = outcome.unwrap();
        assert_eq!(result.payload, Payload::Document(json!({"n": 10})));
        assert_eq!(
            states,
            [
                DispatchState::Received,
                DispatchState::Validating,
                DispatchState::Building,
                DispatchState::Sending,
                DispatchState::Formatting,
                DispatchState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn sql_queries_pass_the_safety_check() {
        let (d, backend) = dispatcher();
        let (outcome, states) = d.dispatch_traced("raw_sql", &json!({"sql": "SELECT 1"})).await;
        assert!(outcome.is_ok());
        assert!(states.contains(&DispatchState::SafetyChecking));

        let (outcome, states) = d
            .dispatch_traced("raw_sql", &json!({"sql": "DELETE FROM t"}))
            .await;
        assert_eq!(outcome.unwrap_err().kind, ErrorKind::UnsafeQuery);
        assert_eq!(states.last(), Some(&DispatchState::Done));
        assert!(!states.contains(&DispatchState::Sending));
        assert_eq!(backend.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_stops_at_received() {
        let (d, _) = dispatcher();
        let (outcome, states) = d.dispatch_traced("nope", &json!({})).await;
        assert_eq!(outcome.unwrap_err().kind, ErrorKind::InvalidTool);
        assert_eq!(states, [DispatchState::Received, DispatchState::Done]);
    }

    #[tokio::test]
    async fn invalid_arguments_stop_at_validating() {
        let (d, backend) = dispatcher();
        let (outcome, states) = d.dispatch_traced("echo", &json!({"bogus": 1})).await;
        assert_eq!(outcome.unwrap_err().kind, ErrorKind::InvalidArgument);
        assert_eq!(states.last(), Some(&DispatchState::Done));
        assert!(!states.contains(&DispatchState::Building));
        assert_eq!(backend.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_abandons_the_upstream_call() {
        let (d, _) = dispatcher();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = d
            .dispatch_with_cancel("hang", &json!({}), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.message, "tool call cancelled");
    }

    #[test]
    fn duplicate_catalog_is_rejected() {
        struct Twice;
        #[async_trait]
        impl Backend for Twice {
            fn name(&self) -> &str {
                "twice"
            }
            fn protocol(&self) -> Protocol {
                Protocol::Rest
            }
            fn instructions(&self) -> &str {
                ""
            }
            fn tools(&self) -> Vec<ToolSpec> {
                vec![ToolSpec::new("a", ""), ToolSpec::new("a", "")]
            }
            fn build(&self, _: &ToolSpec, _: &ValidatedArguments) -> Result<UpstreamQuery, ToolError> {
                Ok(UpstreamQuery::Static(Value::Null))
            }
            async fn send(&self, _: &UpstreamQuery) -> Result<UpstreamResponse, TransportError> {
                Ok(UpstreamResponse::Static(Value::Null))
            }
            fn format(
                &self,
                tool: &ToolSpec,
                args: &ValidatedArguments,
                _: &UpstreamQuery,
                _: UpstreamResponse,
            ) -> Result<ToolResult, ToolError> {
                Ok(ToolResult::empty(&tool.name, args))
            }
        }
        assert!(matches!(
            Dispatcher::new(Arc::new(Twice)),
            Err(RegistryError::DuplicateTool(name)) if name == "a"
        ));
    }
}
