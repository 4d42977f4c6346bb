//! Gateway HTTP server (single port).

use crate::config::{self, Config};
use crate::gateway::protocol::{DeliveryResult, IncomingParams, OutgoingParams};
use crate::resolver::Resolver;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub resolver: Arc<Resolver>,
    /// When Some, every request must carry `Authorization: Bearer <token>`.
    pub required_token: Option<String>,
}

impl GatewayState {
    pub fn new(config: Config, resolver: Arc<Resolver>) -> Self {
        let required_token = require_token(&config);
        Self {
            config: Arc::new(config),
            resolver,
            required_token,
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.required_token.as_deref() else {
            return true;
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|t| t.trim() == expected)
    }
}

/// When auth mode is token and a token is configured, returns it for request validation.
fn require_token(config: &Config) -> Option<String> {
    if config.gateway.auth.mode == config::GatewayAuthMode::Token {
        config::resolve_gateway_token(config)
    } else {
        None
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/inbox/status", get(inbox_status))
        .route("/messages/incoming", post(incoming_message))
        .route("/messages/outgoing", post(outgoing_message))
        .with_state(state)
}

/// Run the gateway with a resolver built from config.
/// When bind is not loopback, token auth must be configured or startup fails.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let resolver = Arc::new(Resolver::from_config(&config));
    run_gateway_with(config, resolver).await
}

/// Run the gateway around an existing resolver. Starts its cache sweep and stops it on exit.
pub async fn run_gateway_with(config: Config, resolver: Arc<Resolver>) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        let token = config::resolve_gateway_token(&config);
        if token.is_none() || config.gateway.auth.mode != config::GatewayAuthMode::Token {
            anyhow::bail!(
                "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or INBOX_RELAY_GATEWAY_TOKEN)",
                bind
            );
        }
    }
    let port = config.gateway.port;

    resolver.start().await;
    let state = GatewayState::new(config, resolver.clone());
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited");
    resolver.stop().await;
    served?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for liveness checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}

/// GET /inbox/status — checks the remote inbox service.
async fn inbox_status(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !state.authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let ok = state.resolver.test_connection().await;
    Ok(Json(json!({ "ok": ok })))
}

/// POST /messages/incoming — relay a user message into its conversation.
async fn incoming_message(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(params): Json<IncomingParams>,
) -> Result<Json<DeliveryResult>, StatusCode> {
    if !state.authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let delivered = state
        .resolver
        .process_incoming_message(
            &params.phone_number,
            &params.message,
            params.user_name.as_deref(),
        )
        .await;
    Ok(Json(DeliveryResult { delivered }))
}

/// POST /messages/outgoing — relay a bot reply; dropped when the number has no open conversation.
async fn outgoing_message(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(params): Json<OutgoingParams>,
) -> Result<Json<DeliveryResult>, StatusCode> {
    if !state.authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let delivered = state
        .resolver
        .process_bot_response(&params.phone_number, &params.response)
        .await;
    Ok(Json(DeliveryResult { delivered }))
}
