//! HTTP API for triggering generation and running validation jobs.
//!
//! Generation requests return immediately and run in the background; progress
//! is only visible in the logs. Validation jobs are polled through their status
//! and result endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sitemapper_core::{Generator, SitemapError, SitemapStore};
use sitemapper_validator::{JobState, ValidateError, ValidationService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::handlers::parse_root_url;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn SitemapStore>,
    generator: Generator,
    validations: ValidationService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SitemapStore>,
        generator: Generator,
        validations: ValidationService,
    ) -> Self {
        Self {
            store,
            generator,
            validations,
        }
    }
}

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        error!("Request failed: {}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ValidateError> for ApiError {
    fn from(err: ValidateError) -> Self {
        match err {
            ValidateError::JobNotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "Validation job not found")
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<SitemapError> for ApiError {
    fn from(err: SitemapError) -> Self {
        match err {
            SitemapError::NotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "Sitemap index not found")
            }
            other => ApiError::internal(other),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate_all))
        .route("/api/generate/:id", post(generate_index))
        .route("/api/validation/start", post(start_validation))
        .route("/api/validation/status/:id", get(validation_status))
        .route("/api/validation/results/:id", get(validation_results))
        .with_state(state)
}

/// Serve the API on an already bound listener until the process exits.
pub async fn serve_on(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "Serving sitemapper API");
    axum::serve(listener, router(state)).await
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, state).await
}

async fn generate_all(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.generator.spawn_all();
    Json(json!({ "message": "Sitemap generation started" }))
}

async fn generate_index(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Unknown ids are rejected up front rather than failing in the background
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.sitemap_index(id))
        .await
        .map_err(ApiError::internal)??;
    state.generator.spawn_index(id);
    Ok(Json(json!({
        "message": "Sitemap generation started",
        "index_id": id,
    })))
}

#[derive(Debug, Deserialize)]
struct StartParams {
    index_url: Option<String>,
}

async fn start_validation(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(raw) = params.index_url.filter(|u| !u.trim().is_empty()) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "index_url parameter is required",
        ));
    };
    let Some(root_url) = parse_root_url(&raw) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "index_url is not a valid URL"));
    };

    let job = state.validations.start(&root_url).await?;
    Ok(Json(json!({
        "message": "Validation started",
        "job_id": job.job_id,
        "results_url": format!("/api/validation/results/{}", job.job_id),
    })))
}

async fn validation_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobState>, ApiError> {
    Ok(Json(state.validations.jobs().status(&id).await?))
}

async fn validation_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let body = state.validations.jobs().read_results(&id).await?;
    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}.csv", id),
        ),
    ];
    Ok((headers, body).into_response())
}
