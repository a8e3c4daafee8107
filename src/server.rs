/// HTTP front end for the chat pipeline.
///
/// Handlers never leak internal errors: failures are logged and the client
/// gets a JSON `{"error": ...}` body with a generic message.
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{error, info};

use crate::service::RagService;

const INVALID_QUESTION: &str = "Please provide a valid question.";
const INTERNAL_ERROR: &str = "Internal server error";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

pub fn build_app(service: Arc<RagService>) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/rebuild", post(rebuild_handler))
        .route("/health", get(health_handler))
        .with_state(service)
}

/// Bind to `bind` and serve until Ctrl-C.
pub async fn serve(service: Arc<RagService>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_app(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn chat_handler(
    State(service): State<Arc<RagService>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let question = match payload {
        Ok(Json(req)) if !req.message.trim().is_empty() => req.message.trim().to_string(),
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, INVALID_QUESTION),
        Err(rejection) => {
            info!("Rejected chat request: {rejection}");
            return error_response(StatusCode::BAD_REQUEST, INVALID_QUESTION);
        }
    };

    let result = tokio::task::spawn_blocking(move || service.ask(&question)).await;
    match result {
        Ok(Ok(answer)) => Json(answer).into_response(),
        Ok(Err(e)) => {
            error!("Chat request failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
        Err(e) => {
            error!("Chat task panicked: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

async fn stats_handler(State(service): State<Arc<RagService>>) -> Response {
    Json(service.stats()).into_response()
}

async fn rebuild_handler(State(service): State<Arc<RagService>>) -> Response {
    let result = tokio::task::spawn_blocking(move || service.rebuild_from_corpus()).await;
    match result {
        Ok(Ok(stats)) => Json(stats).into_response(),
        Ok(Err(e)) => {
            error!("Rebuild failed: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
        Err(e) => {
            error!("Rebuild task panicked: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
