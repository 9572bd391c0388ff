//! Axum Handlers for the REST API
//!
//! This module contains the health check and the topic catalog endpoints.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::{
    models::{ErrorResponse, HealthResponse, TopicSummary},
    state::AppState,
};

pub enum ApiError {
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Builds the presence report for `required`, using `is_set` to probe each name.
pub fn check_keys<F>(required: &[String], is_set: F) -> HealthResponse
where
    F: Fn(&str) -> bool,
{
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !is_set(name))
        .cloned()
        .collect();
    HealthResponse {
        status: if missing.is_empty() { "ok" } else { "missing" }.to_string(),
        missing,
    }
}

/// Report which required credentials are configured, without their values.
#[utoipa::path(
    get,
    path = "/api/health/keys",
    responses(
        (status = 200, description = "All required credentials are set", body = HealthResponse),
        (status = 500, description = "Some credentials are missing", body = HealthResponse)
    )
)]
pub async fn health_keys(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = check_keys(&state.config.health_required_keys, |name| {
        std::env::var(name).is_ok_and(|value| !value.is_empty())
    });
    if health.is_ok() {
        (StatusCode::OK, Json(health))
    } else {
        warn!(missing = ?health.missing, "Required credentials are missing");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(health))
    }
}

/// List the role-play topics in catalog order.
#[utoipa::path(
    get,
    path = "/api/topics",
    responses(
        (status = 200, description = "All topics", body = [TopicSummary])
    )
)]
pub async fn list_topics(State(state): State<Arc<AppState>>) -> Json<Vec<TopicSummary>> {
    Json(state.catalog.topics().iter().map(TopicSummary::from).collect())
}

/// Get one topic by its ID.
#[utoipa::path(
    get,
    path = "/api/topics/{id}",
    responses(
        (status = 200, description = "Topic details", body = TopicSummary),
        (status = 404, description = "Topic not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Topic ID")
    )
)]
pub async fn get_topic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TopicSummary>, ApiError> {
    let topic = state
        .catalog
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Topic with id '{}' not found", id)))?;
    Ok(Json(TopicSummary::from(topic)))
}
