use std::time::Duration;

use anyhow::Context;
use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use biomed_mcp_gateway::backend;
use biomed_mcp_gateway::config::{BackendChoice, GatewayConfig, TransportChoice};
use biomed_mcp_gateway::dispatch::Dispatcher;
use biomed_mcp_gateway::mcp;
use biomed_mcp_gateway::state::AppState;

/// JSON-RPC messages are small; anything larger is refused before parsing.
const MAX_BODY_BYTES: usize = 1024 * 1024;

fn build_app(state: AppState) -> axum::Router {
    // MCP clients run anywhere; the bearer secret guards the protected routes.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(86_400));

    biomed_mcp_gateway::create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
}

async fn build_dispatcher(config: &GatewayConfig) -> anyhow::Result<Dispatcher> {
    let backend = backend::connect(config)
        .await
        .with_context(|| format!("failed to initialise the {} backend", config.backend))?;
    Dispatcher::new(backend).context("invalid tool catalog")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    // stderr only: stdout carries the stdio transport.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        backend = %config.backend,
        base_url = config.upstream.base_url.as_ref().map_or("-", |u| u.as_str()),
        api_key = config.upstream.api_key.is_some(),
        tool_prefix = %config.tool_prefix,
        transport = ?config.transport,
        "starting biomed-mcp-gateway"
    );
    if config.upstream.api_key.is_none() && config.backend != BackendChoice::OpenGenes {
        tracing::info!("no upstream API key configured: upstream rate limits are reduced");
    }

    let dispatcher = build_dispatcher(&config).await?;

    if config.transport == TransportChoice::Stdio {
        tracing::info!("serving MCP over stdio");
        mcp::stdio::serve_stdio(dispatcher).await?;
        return Ok(());
    }

    let state = AppState::new(dispatcher, config.auth_secret.clone());
    let app = build_app(state.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    tracing::info!(
        "biomed-mcp-gateway listening on http://{} (MCP at /mcp, SSE at /sse)",
        listener.local_addr()?
    );
    state.mark_ready();

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
