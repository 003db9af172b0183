//! REST API handlers
//!
//! Every JSON response is wrapped in [`ApiResponse`]; failures go through
//! [`ApiError`] so the status code always follows the error kind.

use axum::{
    extract::{MatchedPath, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::error::Error;
use crate::metrics;
use crate::orchestrator::{InFlightRun, RunReport};
use crate::scheduler::RunTrigger;

use super::error::{ApiError, ErrorContext};
use super::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Manual generation request
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    /// Category slug; the largest deficit is used when absent
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub web_search: Option<bool>,
}

/// Manual translation request
///
/// `max_chunks` is kept loose so a wrong type is reported as a chunk count
/// error instead of a generic body rejection.
#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub slug: String,
    pub language: String,
    #[serde(default)]
    pub max_chunks: Option<serde_json::Value>,
}

/// Query string for `POST /api/runs`
#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    /// Block until the run finishes and return its report
    #[serde(default)]
    pub wait: bool,
}

/// Accepted background run
#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub run_id: Uuid,
    pub trigger: RunTrigger,
}

/// Current and most recent runs
#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub in_flight: Vec<InFlightRun>,
    pub last_run: Option<RunReport>,
}

// ============================================================================
// Router
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status/today", get(status_today))
        .route("/api/generate", post(generate))
        .route("/api/translate", post(translate))
        .route("/api/runs", get(list_runs).post(start_run))
        .route("/api/categories", get(list_categories))
        .route("/api/articles/{language}/{slug}", get(get_article))
        .route("/metrics", get(prometheus_metrics))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Record request count and latency per matched route
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| String::from("unmatched"));
    let start = Instant::now();

    let response = next.run(request).await;
    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health
async fn health(State(state): State<AppState>) -> Response {
    let report = state.status.health(Utc::now()).await;
    let status = if report.store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ApiResponse::success(report))).into_response()
}

/// GET /api/status/today
async fn status_today(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report = state.status.today(Utc::now()).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(report))).into_response())
}

/// POST /api/generate
async fn generate(
    State(state): State<AppState>,
    body: Option<Json<GenerateRequest>>,
) -> Result<Response, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let context = ErrorContext {
        category: request.category.clone(),
        ..ErrorContext::default()
    };

    let result = state
        .orchestrator
        .manual_generate(request.category.as_deref(), request.web_search, Utc::now())
        .await
        .map_err(|e| ApiError::new(e).with_context(context))?;

    let status = if result.outcome == "inserted" {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::success(result))).into_response())
}

/// POST /api/translate
async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslateRequest>,
) -> Result<Response, ApiError> {
    let context = ErrorContext {
        slug: Some(request.slug.clone()),
        language: Some(request.language.clone()),
        chunk_count: request.max_chunks.clone(),
        ..ErrorContext::default()
    };

    let max_chunks = parse_max_chunks(request.max_chunks.as_ref())
        .map_err(|e| ApiError::new(e).with_context(context.clone()))?;

    let result = state
        .orchestrator
        .manual_translate(&request.slug, &request.language, max_chunks, Utc::now())
        .await
        .map_err(|e| ApiError::new(e).with_context(context))?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(result))).into_response())
}

/// Integer chunk counts pass through for range checking; anything else is rejected
fn parse_max_chunks(value: Option<&serde_json::Value>) -> Result<Option<i64>, Error> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            Error::validation(format!("max_chunks must be an integer between 0 and 10, got {v}"))
        }),
    }
}

/// POST /api/runs
async fn start_run(State(state): State<AppState>, Query(query): Query<RunQuery>) -> Response {
    let run_id = Uuid::new_v4();
    let trigger = RunTrigger::Manual;

    if query.wait {
        let report = state
            .orchestrator
            .run_with_id(run_id, trigger, Utc::now())
            .await;
        return (StatusCode::OK, Json(ApiResponse::success(report))).into_response();
    }

    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        orchestrator.run_with_id(run_id, trigger, Utc::now()).await;
    });
    tracing::info!(run_id = %run_id, "Manual run accepted");

    (
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(RunAccepted { run_id, trigger })),
    )
        .into_response()
}

/// GET /api/runs
async fn list_runs(State(state): State<AppState>) -> Response {
    let tracker = state.orchestrator.tracker();
    let runs = RunsResponse {
        in_flight: tracker.in_flight().await,
        last_run: tracker.last_report().await,
    };
    (StatusCode::OK, Json(ApiResponse::success(runs))).into_response()
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> Result<Response, ApiError> {
    let categories = state.orchestrator.store().list_categories().await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(categories))).into_response())
}

/// GET /api/articles/{language}/{slug}
async fn get_article(
    State(state): State<AppState>,
    Path((language, slug)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let article = state
        .orchestrator
        .store()
        .find_article(&language, &slug)
        .await?
        .ok_or_else(|| {
            ApiError::new(Error::NotFound(format!("article '{slug}' in '{language}'"))).with_context(
                ErrorContext {
                    slug: Some(slug.clone()),
                    language: Some(language.clone()),
                    ..ErrorContext::default()
                },
            )
        })?;
    Ok((StatusCode::OK, Json(ApiResponse::success(article))).into_response())
}

/// GET /metrics
async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_max_chunks() {
        assert_eq!(parse_max_chunks(None).unwrap(), None);
        assert_eq!(parse_max_chunks(Some(&json!(null))).unwrap(), None);
        assert_eq!(parse_max_chunks(Some(&json!(3))).unwrap(), Some(3));
        // Range is checked later by the chunk count type
        assert_eq!(parse_max_chunks(Some(&json!(15))).unwrap(), Some(15));
        assert_eq!(parse_max_chunks(Some(&json!(-1))).unwrap(), Some(-1));

        assert!(parse_max_chunks(Some(&json!(2.5))).is_err());
        assert!(parse_max_chunks(Some(&json!("3"))).is_err());
        assert!(parse_max_chunks(Some(&json!(true))).is_err());
    }
}
