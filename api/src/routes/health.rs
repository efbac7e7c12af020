//! Health report (/health)

use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use crate::constants::INVALID_QUESTIONS_WARNING_THRESHOLD;
use crate::services::cache::{CacheOperationCounts, CacheStats};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Cache down is critical; a missing provider key or many invalid questions is a warning.
pub fn determine_status(
    cache_healthy: bool,
    source_configured: bool,
    last_invalid_questions: Option<usize>,
) -> HealthStatus {
    if !cache_healthy {
        return HealthStatus::Critical;
    }

    let too_many_invalid =
        last_invalid_questions.is_some_and(|count| count > INVALID_QUESTIONS_WARNING_THRESHOLD);

    if !source_configured || too_many_invalid {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheHealth {
    healthy: bool,
    stats: CacheStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    status: HealthStatus,
    timestamp: DateTime<Utc>,
    cache_health: CacheHealth,
    cache_operations: CacheOperationCounts,
    duration_source_configured: bool,
    last_validation_run: Option<DateTime<Utc>>,
    invalid_questions: usize,
}

/// GET /health - Cache liveness, cache counters and the latest sweep
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let healthy = state.cache.is_healthy().await;
    let stats = state.cache.get_cache_stats().await;
    let latest = state.validation.latest_summary();
    let source_configured = state.durations.has_youtube_key();

    Json(HealthReport {
        status: determine_status(
            healthy,
            source_configured,
            latest.as_ref().map(|s| s.invalid_questions),
        ),
        timestamp: Utc::now(),
        cache_health: CacheHealth { healthy, stats },
        cache_operations: state.cache.metrics().snapshot(),
        duration_source_configured: source_configured,
        last_validation_run: latest.as_ref().map(|s| s.timestamp),
        invalid_questions: latest.map_or(0, |s| s.invalid_questions),
    })
}
