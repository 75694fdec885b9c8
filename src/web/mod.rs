//! HTTP surface of the orchestrator.
//!
//! Lifecycle commands return 202 Accepted with the record snapshot taken at
//! admission; progress after that is observable through the record's status
//! or the event tap, not through the response.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::{LifecycleError, WorkshopModRecord};
use crate::facade::LifecycleOrchestrator;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    NotFound(String),
    Rejected(String),
    Upstream(String),
    Internal(String),
}

impl From<LifecycleError> for WebError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(message) => Self::NotFound(message),
            LifecycleError::Rejected(message) => Self::Rejected(message),
            err @ LifecycleError::ItemUnavailable(_) => Self::NotFound(err.to_string()),
            err @ (LifecycleError::Steam(_)
            | LifecycleError::Download(_)
            | LifecycleError::HttpError(_)) => Self::Upstream(err.to_string()),
            err => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "not_found".to_string()),
            WebError::Rejected(msg) => (StatusCode::BAD_REQUEST, msg, "rejected".to_string()),
            WebError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg, "upstream_error".to_string()),
            WebError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg,
                "internal_error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

#[derive(Debug, Deserialize)]
pub struct InstallRequest {
    #[serde(default)]
    pub root_mod: bool,
}

#[derive(Debug, Deserialize)]
pub struct InterventionRequest {
    /// Missing or null selection resolves the intervention with no files.
    #[serde(default)]
    pub selected_pbos: Option<Vec<String>>,
}

pub fn router(orchestrator: Arc<LifecycleOrchestrator>) -> Router {
    Router::new()
        .route("/api/mods", get(list_mods))
        .route("/api/mods/:id", get(get_mod).delete(delete_mod))
        .route("/api/mods/:id/install", post(install_mod))
        .route("/api/mods/:id/update", post(update_mod))
        .route("/api/mods/:id/uninstall", post(uninstall_mod))
        .route("/api/mods/:id/intervention", post(resolve_intervention))
        .route("/api/mods/:id/cancel", post(cancel_operation))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

async fn list_mods(
    State(orchestrator): State<Arc<LifecycleOrchestrator>>,
) -> Json<Vec<WorkshopModRecord>> {
    Json(orchestrator.list_mods().await)
}

async fn get_mod(
    State(orchestrator): State<Arc<LifecycleOrchestrator>>,
    Path(id): Path<String>,
) -> Result<Json<WorkshopModRecord>> {
    orchestrator
        .mod_record(&id)
        .await
        .map(Json)
        .ok_or_else(|| WebError::NotFound(format!("Mod {} not found", id)))
}

async fn install_mod(
    State(orchestrator): State<Arc<LifecycleOrchestrator>>,
    Path(id): Path<String>,
    Json(request): Json<InstallRequest>,
) -> Result<(StatusCode, Json<WorkshopModRecord>)> {
    let record = orchestrator.install(&id, request.root_mod).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

async fn update_mod(
    State(orchestrator): State<Arc<LifecycleOrchestrator>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<WorkshopModRecord>)> {
    let record = orchestrator.update(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

async fn uninstall_mod(
    State(orchestrator): State<Arc<LifecycleOrchestrator>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<WorkshopModRecord>)> {
    let record = orchestrator.uninstall(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

async fn resolve_intervention(
    State(orchestrator): State<Arc<LifecycleOrchestrator>>,
    Path(id): Path<String>,
    Json(request): Json<InterventionRequest>,
) -> Result<StatusCode> {
    orchestrator
        .resolve_intervention(&id, request.selected_pbos)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn cancel_operation(
    State(orchestrator): State<Arc<LifecycleOrchestrator>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    orchestrator.cancel(&id)?;
    Ok(StatusCode::ACCEPTED)
}

async fn delete_mod(
    State(orchestrator): State<Arc<LifecycleOrchestrator>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    orchestrator.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
