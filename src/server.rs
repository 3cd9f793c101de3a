//! Read-only status endpoint for a running fetcher
//!
//! - `GET /health`: liveness plus queue depth
//! - `GET /resources`: status of every managed resource
//! - `GET /resources/{host}`: status of one resource
//! - `GET /metrics`: worker counters

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::client::WebClient;
use crate::observability::MetricsSnapshot;
use crate::registry::ResourceStatus;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("resource not found: {0}")]
    NotFound(String),
}

impl StatusError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StatusError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            StatusError::NotFound(_) => "NOT_FOUND",
        }
    }
}

impl IntoResponse for StatusError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({ "code": self.code(), "message": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub resources: usize,
    pub pending_jobs: usize,
}

pub fn router(client: WebClient) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/resources", get(list_resources))
        .route("/resources/{host}", get(get_resource))
        .route("/metrics", get(metrics))
        .with_state(client)
}

/// Serve the status API until `shutdown` resolves.
pub async fn serve(
    address: SocketAddr,
    client: WebClient,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AnyError> {
    let listener = TcpListener::bind(address).await?;
    info!(%address, "Status server listening");

    axum::serve(listener, router(client).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health(State(client): State<WebClient>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        resources: client.registry().len(),
        pending_jobs: client.pending_jobs(),
    })
}

async fn list_resources(State(client): State<WebClient>) -> Json<Vec<ResourceStatus>> {
    Json(client.resource_statuses())
}

async fn get_resource(
    State(client): State<WebClient>,
    Path(host): Path<String>,
) -> Result<Json<ResourceStatus>, StatusError> {
    client
        .registry()
        .status_of(&host)
        .map(Json)
        .ok_or(StatusError::NotFound(host))
}

async fn metrics(State(client): State<WebClient>) -> Json<MetricsSnapshot> {
    Json(client.metrics())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
