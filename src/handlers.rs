// Plain HTTP endpoints: health, readiness, discovery, catalog, OpenAPI.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::{OpenApi, ToSchema};

use crate::mcp::server::{server_name, PROTOCOL_VERSION};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub app: String,
    pub backend: String,
    pub protocol: String,
    pub uptime_seconds: u64,
    pub tools: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ToolCatalog {
    pub backend: String,
    /// `{name, description, inputSchema}` per tool.
    #[schema(value_type = Vec<Object>)]
    pub tools: Vec<Value>,
}

#[derive(OpenApi)]
#[openapi(
    info(title = "biomed-mcp-gateway", description = "MCP gateway for biomedical APIs"),
    paths(root, health, readiness, discovery, list_tools),
    components(schemas(HealthResponse, ReadinessResponse, ToolCatalog)),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "mcp", description = "MCP discovery and tool catalog")
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// GET /
#[utoipa::path(get, path = "/", tag = "health",
    responses((status = 200, description = "Liveness probe", body = Value))
)]
pub async fn root() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /api/health
#[utoipa::path(get, path = "/api/health", tag = "health",
    responses((status = 200, description = "Gateway status", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = state.dispatcher.backend();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        app: server_name(backend),
        backend: backend.name().to_string(),
        protocol: backend.protocol().as_str().to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        tools: state.dispatcher.registry().len(),
    })
}

/// GET /api/health/ready
#[utoipa::path(get, path = "/api/health/ready", tag = "health",
    responses(
        (status = 200, description = "Ready to serve", body = ReadinessResponse),
        (status = 503, description = "Still starting", body = ReadinessResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadinessResponse { ready }))
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// GET /.well-known/mcp.json
#[utoipa::path(get, path = "/.well-known/mcp.json", tag = "mcp",
    responses((status = 200, description = "MCP discovery document", body = Value))
)]
pub async fn discovery(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let base = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|host| format!("http://{host}"))
        .unwrap_or_default();
    let backend = state.dispatcher.backend();

    Json(json!({
        "protocolVersion": PROTOCOL_VERSION,
        "server": {
            "name": server_name(backend),
            "version": env!("CARGO_PKG_VERSION"),
            "instructions": backend.instructions(),
        },
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false }
        },
        "transports": {
            "sse": {
                "url": format!("{base}/sse"),
                "messageUrl": format!("{base}/messages"),
            },
            "http": { "url": format!("{base}/mcp") },
        },
    }))
}

/// GET /api/tools
#[utoipa::path(get, path = "/api/tools", tag = "mcp",
    responses((status = 200, description = "Tool catalog", body = ToolCatalog))
)]
pub async fn list_tools(State(state): State<AppState>) -> Json<ToolCatalog> {
    Json(ToolCatalog {
        backend: state.dispatcher.backend().name().to_string(),
        tools: state.dispatcher.list_tools(),
    })
}

/// GET /api/openapi.json
pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// POST /sse: some clients POST to the stream URL before opening it.
pub async fn sse_post_fallback() -> StatusCode {
    StatusCode::NO_CONTENT
}
