// biomed-mcp-gateway - End-to-end dispatch scenarios against stub upstreams

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::RawQuery;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use url::Url;

use biomed_mcp_gateway::backend::{
    Backend, GraphqlBackend, Protocol, Resource, RestBackend, SqlBackend, UpstreamQuery,
    UpstreamResponse,
};
use biomed_mcp_gateway::config::UpstreamConfig;
use biomed_mcp_gateway::dispatch::{DispatchState, Dispatcher};
use biomed_mcp_gateway::error::{ErrorKind, ToolError, TransportError};
use biomed_mcp_gateway::format::{Payload, ToolResult};
use biomed_mcp_gateway::schema::ToolSpec;
use biomed_mcp_gateway::validate::ValidatedArguments;

/// Serve `app` on an ephemeral local port and return its base URL.
async fn spawn_stub(app: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

fn upstream(timeout_secs: u64) -> UpstreamConfig {
    UpstreamConfig {
        timeout: Duration::from_secs(timeout_secs),
        ..UpstreamConfig::default()
    }
}

async fn openfda_dispatcher(base: Url, config: &UpstreamConfig) -> Dispatcher {
    let backend = RestBackend::openfda(base, config, "").unwrap();
    Dispatcher::new(Arc::new(backend)).unwrap()
}

// ── Scenario A: REST success ────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_drug_recalls_round_trip() {
    let seen = Arc::new(Mutex::new(None::<String>));
    let captured = seen.clone();
    let app = Router::new().route(
        "/drug/enforcement.json",
        get(move |RawQuery(query): RawQuery| {
            let captured = captured.clone();
            async move {
                *captured.lock().unwrap() = query;
                Json(json!({
                    "meta": {"results": {"skip": 0, "limit": 5, "total": 3}},
                    "results": [
                        {"recall_number": "D-0001-2024", "classification": "Class I"},
                        {"recall_number": "D-0002-2024", "classification": "Class I"},
                        {"recall_number": "D-0003-2024", "classification": "Class I"}
                    ]
                }))
            }
        }),
    );
    let dispatcher = openfda_dispatcher(spawn_stub(app).await, &upstream(5)).await;

    let result = dispatcher
        .dispatch(
            "search_drug_recalls",
            &json!({"classification": "Class I", "limit": 5}),
        )
        .await
        .unwrap();

    let query = seen.lock().unwrap().clone().unwrap();
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    assert_eq!(
        pairs,
        [
            ("classification".to_string(), "Class I".to_string()),
            ("limit".to_string(), "5".to_string()),
        ]
    );
    assert_eq!(result.payload.len(), 3);
    assert_eq!(result.meta.returned, 3);
    // Upstream total equals the page size, so no separate total is reported.
    assert_eq!(result.meta.total, None);
    assert_eq!(result.meta.applied_parameters["limit"], 5);
}

#[tokio::test]
async fn api_key_is_sent_but_never_echoed() {
    let seen = Arc::new(Mutex::new(None::<String>));
    let captured = seen.clone();
    let app = Router::new().route(
        "/drug/label.json",
        get(move |RawQuery(query): RawQuery| {
            let captured = captured.clone();
            async move {
                *captured.lock().unwrap() = query;
                Json(json!({"results": []}))
            }
        }),
    );
    let config = UpstreamConfig {
        api_key: Some("k-123".to_string()),
        ..upstream(5)
    };
    let dispatcher = openfda_dispatcher(spawn_stub(app).await, &config).await;

    let result = dispatcher
        .dispatch("search_drug_labels", &json!({"brand_name": "Tylenol"}))
        .await
        .unwrap();

    let query = seen.lock().unwrap().clone().unwrap();
    assert!(query.ends_with("api_key=k-123"));
    let structured = result.structured().to_string();
    assert!(!structured.contains("k-123"));
}

// ── Scenario B: unsafe SQL never reaches the database ───────────────────────

/// Wraps a backend and counts `send` calls.
struct CountingBackend<B> {
    inner: B,
    sends: AtomicUsize,
}

#[async_trait]
impl<B: Backend> Backend for CountingBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn protocol(&self) -> Protocol {
        self.inner.protocol()
    }

    fn instructions(&self) -> &str {
        self.inner.instructions()
    }

    fn tools(&self) -> Vec<ToolSpec> {
        self.inner.tools()
    }

    fn build(&self, tool: &ToolSpec, args: &ValidatedArguments) -> Result<UpstreamQuery, ToolError> {
        self.inner.build(tool, args)
    }

    async fn send(&self, query: &UpstreamQuery) -> Result<UpstreamResponse, TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.inner.send(query).await
    }

    fn format(
        &self,
        tool: &ToolSpec,
        args: &ValidatedArguments,
        query: &UpstreamQuery,
        response: UpstreamResponse,
    ) -> Result<ToolResult, ToolError> {
        self.inner.format(tool, args, query, response)
    }

    fn resources(&self) -> Vec<Resource> {
        self.inner.resources()
    }

    fn read_resource(&self, uri: &str) -> Option<String> {
        self.inner.read_resource(uri)
    }
}

async fn counting_sql_backend() -> Arc<CountingBackend<SqlBackend>> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query("CREATE TABLE lifespan_change (HGNC TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    Arc::new(CountingBackend {
        inner: SqlBackend::opengenes(pool, Duration::from_secs(5), ""),
        sends: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn scenario_b_drop_table_is_rejected_before_the_database() {
    let backend = counting_sql_backend().await;
    let dispatcher = Dispatcher::new(backend.clone()).unwrap();

    let (outcome, states) = dispatcher
        .dispatch_traced("db_query", &json!({"sql": "DROP TABLE lifespan_change"}))
        .await;

    let err = outcome.unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsafeQuery);
    assert_eq!(backend.sends.load(Ordering::SeqCst), 0);
    assert!(states.contains(&DispatchState::SafetyChecking));
    assert!(!states.contains(&DispatchState::Sending));

    // The table is still there.
    let ok = dispatcher
        .dispatch("db_query", &json!({"sql": "SELECT COUNT(*) AS n FROM lifespan_change"}))
        .await
        .unwrap();
    assert_eq!(ok.payload, Payload::Records(vec![json!({"n": 0})]));
    assert_eq!(backend.sends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stacked_statements_are_rejected() {
    let backend = counting_sql_backend().await;
    let dispatcher = Dispatcher::new(backend.clone()).unwrap();

    let err = dispatcher
        .dispatch(
            "db_query",
            &json!({"sql": "select * from lifespan_change; DROP TABLE lifespan_change"}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsafeQuery);
    assert_eq!(backend.sends.load(Ordering::SeqCst), 0);
}

// ── Scenario C: unknown tool ────────────────────────────────────────────────

#[tokio::test]
async fn scenario_c_unknown_tool_skips_validation() {
    let backend = counting_sql_backend().await;
    let dispatcher = Dispatcher::new(backend.clone()).unwrap();

    let (outcome, states) = dispatcher
        .dispatch_traced("delete_everything", &json!({"anything": true}))
        .await;

    let err = outcome.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTool);
    assert!(err.message.contains("delete_everything"));
    assert_eq!(states, [DispatchState::Received, DispatchState::Done]);
    assert_eq!(backend.sends.load(Ordering::SeqCst), 0);
}

// ── Scenario D: upstream rate limiting ──────────────────────────────────────

#[tokio::test]
async fn scenario_d_rate_limit_preserves_status() {
    let app = Router::new().route(
        "/drug/event.json",
        get(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", "30")],
                Json(json!({"error": {"code": "OVER_RATE_LIMIT", "message": "slow down"}})),
            )
                .into_response()
        }),
    );
    let dispatcher = openfda_dispatcher(spawn_stub(app).await, &upstream(5)).await;

    let err = dispatcher
        .dispatch("search_adverse_events", &json!({"reaction": "nausea"}))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::UpstreamRateLimited);
    assert_eq!(err.upstream_status, Some(429));
    assert!(err.message.contains("retry after 30s"));
    assert!(err.kind.is_retryable());
}

// ── Other upstream failures ─────────────────────────────────────────────────

#[tokio::test]
async fn not_found_is_an_empty_result() {
    let app = Router::new().route(
        "/food/enforcement.json",
        get(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"code": "NOT_FOUND", "message": "No matches found!"}})),
            )
        }),
    );
    let dispatcher = openfda_dispatcher(spawn_stub(app).await, &upstream(5)).await;

    let result = dispatcher
        .dispatch("search_food_recalls", &json!({"recalling_firm": "Nobody Inc"}))
        .await
        .unwrap();
    assert!(result.payload.is_empty());
}

#[tokio::test]
async fn server_errors_and_slow_upstreams_are_classified() {
    let app = Router::new()
        .route(
            "/drug/drugsfda.json",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream exploded") }),
        )
        .route(
            "/device/enforcement.json",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"results": []}))
            }),
        );
    let dispatcher = openfda_dispatcher(spawn_stub(app).await, &upstream(1)).await;

    let err = dispatcher
        .dispatch("search_drug_approvals", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UpstreamServerError);
    assert_eq!(err.upstream_status, Some(502));
    assert!(err.message.contains("upstream exploded"));

    let err = dispatcher
        .dispatch("search_device_recalls", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
async fn refused_connection_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let base = Url::parse(&format!("http://{addr}")).unwrap();
    let dispatcher = openfda_dispatcher(base, &upstream(5)).await;

    let err = dispatcher
        .dispatch("search_drug_recalls", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
}

// ── GraphQL ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn graphql_posts_variables_with_key_header() {
    let seen = Arc::new(Mutex::new(None::<(Option<String>, Value)>));
    let captured = seen.clone();
    let app = Router::new().route(
        "/graphql",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let captured = captured.clone();
            async move {
                let key = headers
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                *captured.lock().unwrap() = Some((key, body));
                Json(json!({"data": {"search": {"total": 120, "hits": [
                    {"id": "ENSG00000157764", "entity": "target"},
                    {"id": "MONDO_0005105", "entity": "disease"}
                ]}}}))
            }
        }),
    );
    let endpoint = spawn_stub(app).await.join("/graphql").unwrap();
    let config = UpstreamConfig {
        api_key: Some("ot-key".to_string()),
        ..upstream(5)
    };
    let backend = GraphqlBackend::opentargets(endpoint, &config, "").unwrap();
    let dispatcher = Dispatcher::new(Arc::new(backend)).unwrap();

    let result = dispatcher
        .dispatch("search_entities", &json!({"queryString": "BRAF", "pageSize": 2}))
        .await
        .unwrap();

    let (key, body) = seen.lock().unwrap().clone().unwrap();
    assert_eq!(key.as_deref(), Some("ot-key"));
    assert_eq!(
        body["variables"],
        json!({"queryString": "BRAF", "pageIndex": 0, "pageSize": 2})
    );
    assert!(body["query"].as_str().unwrap().contains("search("));
    assert_eq!(result.meta.returned, 2);
    assert_eq!(result.meta.total, Some(120));
}
