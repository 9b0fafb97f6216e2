//! Operational HTTP surface
//!
//! `GET /metrics` serves the engine's Prometheus registry in text format and
//! `GET /health` reports whether the store answers.

use crate::{engine::CreditEngine, store::LedgerStore, Error};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Health check body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: &'static str,
    /// Service name
    pub service: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Whether the store answered
    pub store_connected: bool,
}

/// Engine error rendered as a 500 response
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, kind = self.0.kind(), "Request failed");

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": self.0.to_string(),
                "kind": self.0.kind(),
                "timestamp": Utc::now(),
            })),
        )
            .into_response()
    }
}

/// Routes for a shared engine
pub fn router<S: LedgerStore>(engine: Arc<CreditEngine<S>>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/metrics", get(metrics_handler::<S>))
        .with_state(engine)
}

async fn health_handler<S: LedgerStore>(
    State(engine): State<Arc<CreditEngine<S>>>,
) -> Json<HealthResponse> {
    let store_connected = match engine.store().health_check().await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "Store health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if store_connected { "healthy" } else { "degraded" },
        service: "credit-engine",
        version: env!("CARGO_PKG_VERSION"),
        store_connected,
    })
}

async fn metrics_handler<S: LedgerStore>(
    State(engine): State<Arc<CreditEngine<S>>>,
) -> Result<String, ApiError> {
    Ok(engine.metrics().encode_text()?)
}
