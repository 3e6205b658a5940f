//! HTTP surface over the dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;

use crate::dispatch::Dispatcher;
use crate::error::{AppError, Context, Result};

pub const CACHE_HIT_HEADER: &str = "x-cache-hit";
pub const FETCHED_AT_HEADER: &str = "x-fetched-at";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueueStatus {
    /// Tasks waiting for admission.
    pub depth: usize,
    pub active: usize,
    pub tokens: f64,
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/api/proxy/*endpoint", get(proxy))
        .route("/api/queue-status", get(queue_status))
        .with_state(dispatcher)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(dispatcher: Arc<Dispatcher>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Market relay listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
            }
        })
        .await?;

    info!("Market relay stopped");
    Ok(())
}

async fn proxy(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(endpoint): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> std::result::Result<Response, ApiError> {
    let response = dispatcher.handle(&endpoint, &params, false).await?;

    let mut http = Json(response.payload).into_response();
    let headers = http.headers_mut();
    headers.insert(
        HeaderName::from_static(CACHE_HIT_HEADER),
        HeaderValue::from_static(if response.cache.is_hit() { "true" } else { "false" }),
    );
    if let Ok(value) = HeaderValue::from_str(&response.fetched_at.to_rfc3339()) {
        headers.insert(HeaderName::from_static(FETCHED_AT_HEADER), value);
    }
    Ok(http)
}

async fn queue_status(State(dispatcher): State<Arc<Dispatcher>>) -> Json<QueueStatus> {
    let scheduler = dispatcher.scheduler();
    let stats = scheduler.stats();
    Json(QueueStatus {
        depth: scheduler.queue_len(),
        active: stats.active,
        tokens: stats.tokens,
    })
}

/// Maps dispatcher failures onto HTTP statuses with a `{ "error": .. }` body.
struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            err if err.is_upstream() => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed with {status}: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
