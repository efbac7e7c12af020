//! Question timestamp validation endpoints (/questions/validation/*)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::AppState;
use crate::services::error::LogErr;
use crate::services::validation::{
    ValidationError, ValidationStats, ValidationSummary, VideoValidation,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/questions/validation/stats", get(get_stats))
        .route("/questions/validation/video/{video_id}", get(validate_video))
        .route("/questions/validation/run-all", post(run_all))
        .route("/questions/validation/test", get(test_connection))
}

/// GET /questions/validation/stats - Counts from the most recent sweep
async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ValidationStats> {
    Json(state.validation.get_validation_stats())
}

/// GET /questions/validation/video/{video_id} - Validate one video's questions
async fn validate_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoValidation>, StatusCode> {
    let report = state.validation.validate_question_timestamps(&video_id).await;
    if let Err(ValidationError::VideoNotFound(_)) = &report {
        return Err(StatusCode::NOT_FOUND);
    }

    report
        .map(Json)
        .log_status("Validate video error", StatusCode::SERVICE_UNAVAILABLE)
}

/// POST /questions/validation/run-all - Full sweep over every video with questions
async fn run_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ValidationSummary>, StatusCode> {
    let summary = state
        .validation
        .validate_all_question_timestamps()
        .await
        .log_status("Validation sweep failed", StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(ValidationSummary::clone(&summary)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeData {
    total_questions: usize,
    videos_without_duration: usize,
    videos_with_questions: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeResponse {
    success: bool,
    service_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<ProbeData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// GET /questions/validation/test - Connectivity probe, always answers 200
async fn test_connection(State(state): State<Arc<AppState>>) -> Json<ProbeResponse> {
    match state.validation.check_connectivity().await {
        Ok(videos_with_questions) => {
            let stats = state.validation.get_validation_stats();
            Json(ProbeResponse {
                success: true,
                service_connected: true,
                data: Some(ProbeData {
                    total_questions: stats.total_questions,
                    videos_without_duration: stats.videos_without_duration,
                    videos_with_questions,
                }),
                error: None,
            })
        }
        Err(e) => {
            error!("Validation service probe failed: {}", e);
            Json(ProbeResponse {
                success: false,
                service_connected: false,
                data: None,
                error: Some(e.to_string()),
            })
        }
    }
}
