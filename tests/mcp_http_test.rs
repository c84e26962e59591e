// biomed-mcp-gateway - MCP over HTTP and SSE integration tests

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use biomed_mcp_gateway::backend::SqlBackend;
use biomed_mcp_gateway::create_router;
use biomed_mcp_gateway::dispatch::Dispatcher;
use biomed_mcp_gateway::state::AppState;

async fn test_state() -> AppState {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    for stmt in [
        "CREATE TABLE lifespan_change (HGNC TEXT, model_organism TEXT, \
         lifespan_percent_change_mean REAL)",
        "INSERT INTO lifespan_change VALUES ('FOXO3', 'mouse', 12.5), ('SIRT1', 'mouse', 9.0)",
    ] {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }
    let backend = SqlBackend::opengenes(pool, Duration::from_secs(5), "");
    AppState::new(Dispatcher::new(Arc::new(backend)).unwrap(), None)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn rpc(app: &Router, message: Value) -> Value {
    let response = app.clone().oneshot(post_json("/mcp", &message)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn initialize_reports_server_and_capabilities() {
    let app = create_router(test_state().await);
    let reply = rpc(
        &app,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2024-11-05", "capabilities": {}, "clientInfo": {"name": "t", "version": "0"}
        }}),
    )
    .await;

    assert_eq!(reply["id"], 1);
    let result = &reply["result"];
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "opengenes-mcp");
    assert!(result["capabilities"]["tools"].is_object());
    assert!(result["capabilities"]["resources"].is_object());
    assert!(!result["instructions"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn notifications_are_accepted_without_body() {
    let app = create_router(test_state().await);
    let response = app
        .oneshot(post_json(
            "/mcp",
            &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn tools_list_renders_input_schemas() {
    let app = create_router(test_state().await);
    let reply = rpc(&app, json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"})).await;

    let tools = reply["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 6);
    let lifespan = tools
        .iter()
        .find(|t| t["name"] == "lifespan_by_gene")
        .unwrap();
    let schema = &lifespan["inputSchema"];
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["additionalProperties"], false);
    assert_eq!(schema["required"], json!(["gene"]));
    assert_eq!(schema["properties"]["limit"]["maximum"], 500);
}

#[tokio::test]
async fn tools_call_success_carries_structured_content() {
    let app = create_router(test_state().await);
    let reply = rpc(
        &app,
        json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {
            "name": "db_query",
            "arguments": {"sql": "SELECT HGNC FROM lifespan_change ORDER BY HGNC"}
        }}),
    )
    .await;

    let result = &reply["result"];
    assert_eq!(result["isError"], false);
    assert_eq!(result["content"][0]["type"], "text");
    let structured = &result["structuredContent"];
    assert_eq!(structured["results"], json!([{"HGNC": "FOXO3"}, {"HGNC": "SIRT1"}]));
    assert_eq!(structured["meta"]["returned"], 2);
    assert_eq!(
        structured["meta"]["query"],
        "SELECT HGNC FROM lifespan_change ORDER BY HGNC"
    );
}

#[tokio::test]
async fn tools_call_failure_is_a_result_not_a_protocol_error() {
    let app = create_router(test_state().await);
    let reply = rpc(
        &app,
        json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call", "params": {
            "name": "lifespan_by_gene", "arguments": {}
        }}),
    )
    .await;

    assert!(reply.get("error").is_none());
    let result = &reply["result"];
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["error"]["kind"], "InvalidArgument");
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Error [InvalidArgument]"));
    assert!(text.contains("gene"));
}

#[tokio::test]
async fn protocol_errors_use_json_rpc_codes() {
    let app = create_router(test_state().await);

    let reply = rpc(&app, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/frobnicate"})).await;
    assert_eq!(reply["error"]["code"], -32601);

    let reply = rpc(
        &app,
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"arguments": {}}}),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32602);

    let reply = rpc(&app, json!([1, 2, 3])).await;
    assert_eq!(reply["error"]["code"], -32600);
    assert_eq!(reply["id"], Value::Null);
}

#[tokio::test]
async fn resources_list_and_read() {
    let app = create_router(test_state().await);

    let reply = rpc(&app, json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"})).await;
    let uris: Vec<&str> = reply["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap())
        .collect();
    assert_eq!(uris, ["resource://db-prompt", "resource://schema-summary"]);

    let reply = rpc(
        &app,
        json!({"jsonrpc": "2.0", "id": 2, "method": "resources/read",
               "params": {"uri": "resource://schema-summary"}}),
    )
    .await;
    let contents = &reply["result"]["contents"][0];
    assert_eq!(contents["uri"], "resource://schema-summary");
    assert!(contents["text"].as_str().unwrap().contains("lifespan_change"));

    let reply = rpc(
        &app,
        json!({"jsonrpc": "2.0", "id": 3, "method": "resources/read",
               "params": {"uri": "resource://nope"}}),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32602);
}

// ── SSE ─────────────────────────────────────────────────────────────────────

/// Read SSE frames until one carries `event: <name>`; returns its data line.
async fn next_event(body: &mut Body, name: &str) -> String {
    let mut buffer = String::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("SSE event timed out")
            .expect("SSE stream ended")
            .unwrap();
        if let Ok(chunk) = frame.into_data() {
            buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        while let Some(end) = buffer.find("\n\n") {
            let event: String = buffer.drain(..end + 2).collect();
            let field = |key: &str| {
                event
                    .lines()
                    .find_map(|l| l.strip_prefix(key))
                    .map(|v| v.trim_start().to_string())
            };
            if field("event:").as_deref() == Some(name) {
                return field("data:").unwrap_or_default();
            }
        }
    }
}

#[tokio::test]
async fn sse_session_round_trip_and_cleanup() {
    let state = test_state().await;
    let app = create_router(state.clone());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    let endpoint = next_event(&mut body, "endpoint").await;
    assert!(endpoint.starts_with("/messages?session_id="));
    assert_eq!(state.sessions.len(), 1);

    let response = app
        .clone()
        .oneshot(post_json(
            &endpoint,
            &json!({"jsonrpc": "2.0", "id": 42, "method": "ping"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let message: Value = serde_json::from_str(&next_event(&mut body, "message").await).unwrap();
    assert_eq!(message["id"], 42);
    assert_eq!(message["result"], json!({}));

    drop(body);
    assert!(state.sessions.is_empty());

    let response = app
        .oneshot(post_json(
            &endpoint,
            &json!({"jsonrpc": "2.0", "id": 43, "method": "ping"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_session_is_404() {
    let app = create_router(test_state().await);
    let response = app
        .oneshot(post_json(
            "/messages?session_id=00000000-0000-0000-0000-000000000000",
            &json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
