use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

use crate::telegram::Update;

pub const WEBHOOK_PATH: &str = "/telegram/webhook";

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

/// Receives every accepted update; must not block.
pub type UpdateSink = Arc<dyn Fn(Update) + Send + Sync>;

#[derive(Clone)]
struct AppState {
    sink: UpdateSink,
    secret: Arc<str>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Middleware ---

async fn require_secret(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|token| token == &*state.secret);

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid or missing secret token".to_string(),
            }),
        )
            .into_response();
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

/// Always answers 200 once authenticated: Telegram redelivers anything else,
/// and a payload we cannot parse will not parse on retry either.
async fn receive_update(State(state): State<AppState>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => (state.sink)(update),
        Err(e) => warn!("Dropping malformed update: {e}"),
    }
    StatusCode::OK
}

async fn health() -> &'static str {
    "ok"
}

fn build_router(state: AppState) -> Router {
    let webhook = Router::new()
        .route(WEBHOOK_PATH, post(receive_update))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_secret));

    Router::new()
        .route("/health", get(health))
        .merge(webhook)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

pub async fn start_server(
    sink: UpdateSink,
    port: u16,
    bind: &str,
    secret: String,
) -> anyhow::Result<()> {
    let state = AppState {
        sink,
        secret: Arc::from(secret),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    info!("Listening on http://{bind}:{port}{WEBHOOK_PATH}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
