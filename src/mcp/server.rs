// Jaskier Shared Pattern -- mcp/server
//! MCP Server: exposes the active backend's tool catalog as an MCP endpoint.
//!
//! Every transport (HTTP `/mcp`, SSE, stdio) funnels into [`handle_message`].
//!
//! Supported methods:
//! - `initialize`: server info + capabilities
//! - `notifications/initialized`: client ack (no-op)
//! - `tools/list`: list all available tools
//! - `tools/call`: execute a tool
//! - `resources/list`: list backend resources
//! - `resources/read`: read a resource by URI
//! - `ping`: health check

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::dispatch::Dispatcher;
use crate::format;
use crate::state::AppState;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const PARSE_ERROR: i32 = -32700;

/// MCP JSON-RPC 2.0 endpoint handler.
///
/// Requests get `200` with the JSON-RPC response; notifications get `202`
/// with an empty body.
pub async fn mcp_handler(State(state): State<AppState>, Json(request): Json<Value>) -> Response {
    match handle_message(&state.dispatcher, request).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Handle one JSON-RPC message. `None` for notifications and for responses
/// sent by the client.
pub async fn handle_message(dispatcher: &Dispatcher, message: Value) -> Option<Value> {
    handle_message_with_cancel(dispatcher, message, &CancellationToken::new()).await
}

/// [`handle_message`] whose tool calls stop when `cancel` fires.
pub async fn handle_message_with_cancel(
    dispatcher: &Dispatcher,
    message: Value,
    cancel: &CancellationToken,
) -> Option<Value> {
    let Some(request) = message.as_object() else {
        return Some(json_rpc_error(Value::Null, INVALID_REQUEST, "Invalid Request: expected a JSON object"));
    };
    let id = request.get("id").cloned();
    let Some(method) = request.get("method").and_then(|m| m.as_str()) else {
        // A client response to a server request, or garbage.
        return match id {
            Some(id) if !request.contains_key("result") && !request.contains_key("error") => Some(
                json_rpc_error(id, INVALID_REQUEST, "Invalid Request: missing 'method'"),
            ),
            _ => None,
        };
    };

    tracing::debug!(method = %method, "MCP server: incoming request");

    // Notifications never get a response.
    let id = id?;

    let backend = dispatcher.backend();
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let response = match method {
        "initialize" => handle_initialize(backend, &id),
        "ping" => json_rpc_result(&id, json!({})),
        "tools/list" => json_rpc_result(&id, json!({ "tools": dispatcher.list_tools() })),
        "tools/call" => handle_tools_call(dispatcher, &params, &id, cancel).await,
        "resources/list" => handle_resources_list(backend, &id),
        "resources/read" => handle_resources_read(backend, &params, &id),
        _ => json_rpc_error(id, METHOD_NOT_FOUND, &format!("Method not found: {}", method)),
    };
    Some(response)
}

// ── initialize ──────────────────────────────────────────────────────────────

/// Advertised server name, e.g. `openfda-mcp`.
pub fn server_name(backend: &dyn Backend) -> String {
    format!("{}-mcp", backend.name())
}

fn handle_initialize(backend: &dyn Backend, id: &Value) -> Value {
    json_rpc_result(
        id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false }
            },
            "serverInfo": {
                "name": server_name(backend),
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": backend.instructions()
        }),
    )
}

// ── tools/call ──────────────────────────────────────────────────────────────

async fn handle_tools_call(
    dispatcher: &Dispatcher,
    params: &Value,
    id: &Value,
    cancel: &CancellationToken,
) -> Value {
    let tool_name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
    if tool_name.is_empty() {
        return json_rpc_error(id.clone(), INVALID_PARAMS, "Missing 'name' in params");
    }
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    tracing::info!(tool = %tool_name, "MCP server: tools/call");

    let outcome = dispatcher
        .dispatch_with_cancel(tool_name, &arguments, cancel)
        .await;
    json_rpc_result(id, format::call_result(&outcome))
}

// ── resources ───────────────────────────────────────────────────────────────

fn handle_resources_list(backend: &dyn Backend, id: &Value) -> Value {
    let resources: Vec<Value> = backend
        .resources()
        .into_iter()
        .map(|r| {
            json!({
                "uri": r.uri,
                "name": r.name,
                "description": r.description,
                "mimeType": r.mime_type,
            })
        })
        .collect();
    json_rpc_result(id, json!({ "resources": resources }))
}

fn handle_resources_read(backend: &dyn Backend, params: &Value, id: &Value) -> Value {
    let Some(uri) = params.get("uri").and_then(|u| u.as_str()) else {
        return json_rpc_error(id.clone(), INVALID_PARAMS, "Missing 'uri' in params");
    };
    let Some(text) = backend.read_resource(uri) else {
        return json_rpc_error(id.clone(), INVALID_PARAMS, &format!("Unknown resource URI: {}", uri));
    };
    let mime_type = backend
        .resources()
        .into_iter()
        .find(|r| r.uri == uri)
        .map_or("text/plain", |r| r.mime_type);

    json_rpc_result(
        id,
        json!({
            "contents": [{
                "uri": uri,
                "mimeType": mime_type,
                "text": text
            }]
        }),
    )
}

// ── JSON-RPC helpers ────────────────────────────────────────────────────────

fn json_rpc_result(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn json_rpc_error(id: Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}
