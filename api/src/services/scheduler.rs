//! Background validation sweeps on a fixed interval

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, interval_at};
use tracing::{error, info, warn};

use super::backfill::{BackfillMode, BackfillSummary, VideoCatalog, backfill_durations};
use super::cache::{CacheStore, DurationCache};
use super::duration_source::DurationSource;
use super::validation::{QuestionSource, ValidationEngine};
use crate::AppState;

/// Outcome of one scheduled sweep, reported for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Clean,
    InvalidFound(usize),
    Failed,
}

/// Run one sweep and log its outcome. Never propagates the failure.
pub async fn run_scheduled_sweep<Q, S>(engine: &ValidationEngine<Q, S>) -> SweepOutcome
where
    Q: QuestionSource,
    S: CacheStore,
{
    info!("[scheduler] Starting scheduled question validation");

    match engine.validate_all_question_timestamps().await {
        Ok(summary) if summary.invalid_questions > 0 => {
            warn!(
                "[scheduler] {} invalid questions found across {} videos",
                summary.invalid_questions, summary.videos_checked
            );
            SweepOutcome::InvalidFound(summary.invalid_questions)
        }
        Ok(summary) => {
            info!(
                "[scheduler] {}/{} questions valid",
                summary.valid_questions, summary.total_questions_checked
            );
            SweepOutcome::Clean
        }
        Err(e) => {
            error!("[scheduler] Question validation failed: {}", e);
            SweepOutcome::Failed
        }
    }
}

/// Resolve missing durations ahead of a sweep. Failures are logged only.
pub async fn run_scheduled_backfill<C, S, D>(
    catalog: &C,
    cache: &DurationCache<S>,
    source: &D,
    concurrency: usize,
) -> Option<BackfillSummary>
where
    C: VideoCatalog,
    S: CacheStore,
    D: DurationSource,
{
    match backfill_durations(catalog, cache, source, BackfillMode::Missing, concurrency).await {
        Ok(summary) => {
            if !summary.failed.is_empty() {
                warn!(
                    "[scheduler] {} videos still without duration after backfill",
                    summary.failed.len()
                );
            }
            Some(summary)
        }
        Err(e) => {
            error!("[scheduler] Duration backfill failed: {}", e);
            None
        }
    }
}

/// Backfill then sweep every `interval_secs`, first run one interval after startup.
pub async fn start_validation_scheduler(state: Arc<AppState>, interval_secs: u64) {
    let period = Duration::from_secs(interval_secs.max(1));
    let mut interval = interval_at(Instant::now() + period, period);

    info!("[scheduler] Validation scheduler started ({}s interval)", period.as_secs());

    loop {
        interval.tick().await;
        run_scheduled_backfill(
            &state.db,
            &*state.cache,
            &state.durations,
            state.validation.concurrency(),
        )
        .await;
        run_scheduled_sweep(&state.validation).await;
    }
}
