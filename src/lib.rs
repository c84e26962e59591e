pub mod auth;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod handlers;
pub mod mcp;
pub mod safety;
pub mod schema;
pub mod state;
pub mod validate;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use state::AppState;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        // MCP transports
        .route("/mcp", post(mcp::server::mcp_handler))
        .route("/sse", get(mcp::sse::sse_handler).post(handlers::sse_post_fallback))
        .route("/messages", post(mcp::sse::messages_handler))
        // Catalog
        .route("/api/tools", get(handlers::list_tools))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        // Health
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route("/api/health/ready", get(handlers::readiness))
        // Discovery
        .route("/.well-known/mcp.json", get(handlers::discovery))
        .route("/api/openapi.json", get(handlers::openapi))
        .merge(protected)
        // Shared state
        .with_state(state)
}
