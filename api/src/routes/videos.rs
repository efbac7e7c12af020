//! Video endpoints consumed by the player and by administrators

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::AppState;
use crate::domain::{questions, videos};
use crate::models::InteractionPoint;
use crate::services::backfill::{self, BackfillMode, BackfillSummary};
use crate::services::duration_source::{
    self, DurationOrigin, detect_platform, provider_video_id,
};
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/videos/{video_id}/interactions", get(list_interactions))
        .route("/videos/{video_id}/metadata", get(get_metadata))
        .route("/videos/{video_id}/duration/resolve", post(resolve_duration))
        .route("/videos/{video_id}/duration", delete(invalidate_duration))
        .route("/videos/durations/backfill", post(backfill_durations))
}

/// GET /videos/{video_id}/interactions - Active interaction points ordered by start time
async fn list_interactions(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Json<Vec<InteractionPoint>>, StatusCode> {
    let points = questions::list_questions_for_video(&state.db, &video_id, true)
        .await
        .log_500("List interactions error")?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(points))
}

/// GET /videos/{video_id}/metadata - Cached descriptive metadata
async fn get_metadata(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .cache
        .get_metadata(&video_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveDurationResponse {
    video_id: String,
    duration: Option<u64>,
    source: DurationOrigin,
}

/// POST /videos/{video_id}/duration/resolve - Cache-first duration resolution
async fn resolve_duration(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Json<ResolveDurationResponse>, StatusCode> {
    let video = videos::find_by_external_id(&state.db, &video_id)
        .await
        .log_500("Find video error")?
        .ok_or(StatusCode::NOT_FOUND)?;

    let resolved = duration_source::resolve_duration(
        &*state.cache,
        &state.durations,
        &video.external_id,
        &video.content,
    )
    .await;

    if let Some(seconds) = resolved.seconds {
        let stored = video.duration_secs.and_then(|d| u64::try_from(d).ok());
        if stored != Some(seconds) {
            videos::update_duration(&state.db, video.id, seconds)
                .await
                .log_500("Update video duration error")?;
        }

        if resolved.origin == DurationOrigin::External {
            let metadata = json!({
                "platform": detect_platform(&video.content),
                "providerVideoId": provider_video_id(&video.content),
                "duration": seconds,
                "resolvedAt": Utc::now(),
            });
            if !state.cache.set_metadata(&video.external_id, &metadata).await {
                warn!("Metadata for {} was not cached", video.external_id);
            }
        }
    }

    Ok(Json(ResolveDurationResponse {
        video_id: video.external_id,
        duration: resolved.seconds,
        source: resolved.origin,
    }))
}

/// DELETE /videos/{video_id}/duration - Invalidate the cached duration after a source change
async fn invalidate_duration(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> StatusCode {
    if state.cache.delete_duration(&video_id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[derive(Deserialize)]
struct BackfillParams {
    #[serde(default)]
    mode: BackfillMode,
}

/// POST /videos/durations/backfill?mode=missing|all - Resolve durations across the catalog
async fn backfill_durations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BackfillParams>,
) -> Result<Json<BackfillSummary>, StatusCode> {
    let summary = backfill::backfill_durations(
        &state.db,
        &*state.cache,
        &state.durations,
        params.mode,
        state.validation.concurrency(),
    )
    .await
    .log_status("Duration backfill failed", StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(summary))
}
