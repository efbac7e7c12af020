//! Bulk duration backfill for the video catalog
//!
//! `Missing` resolves every video whose stored duration is NULL (cache first,
//! then the provider). `All` asks the provider again for every video and
//! corrects stored durations that drifted. Resolved durations are written to
//! the video row and to the cache. Videos that cannot be resolved are listed
//! in `failed` and never abort the run.

use std::fmt;
use std::future::Future;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::cache::{CacheStore, DurationCache};
use super::duration_source::{DurationSource, refresh_duration, resolve_duration};
use crate::models::VideoMediaItem;

/// Video rows with their stored durations.
pub trait VideoCatalog: Send + Sync {
    fn videos_without_duration(
        &self,
    ) -> impl Future<Output = Result<Vec<VideoMediaItem>, sqlx::Error>> + Send;

    fn all_videos(&self) -> impl Future<Output = Result<Vec<VideoMediaItem>, sqlx::Error>> + Send;

    fn store_duration(
        &self,
        video_id: i64,
        seconds: u64,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackfillMode {
    #[default]
    Missing,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillSummary {
    pub mode: BackfillMode,
    pub total: usize,
    pub updated: usize,
    /// Stored duration already matched the resolved one
    pub verified: usize,
    /// External ids that could not be resolved or stored
    pub failed: Vec<String>,
}

#[derive(Debug)]
pub struct BackfillError(String);

impl fmt::Display for BackfillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "video catalog unavailable: {}", self.0)
    }
}

impl std::error::Error for BackfillError {}

enum Outcome {
    Updated,
    Verified,
    Failed,
}

pub async fn backfill_durations<C, S, D>(
    catalog: &C,
    cache: &DurationCache<S>,
    source: &D,
    mode: BackfillMode,
    concurrency: usize,
) -> Result<BackfillSummary, BackfillError>
where
    C: VideoCatalog,
    S: CacheStore,
    D: DurationSource,
{
    let videos = match mode {
        BackfillMode::Missing => catalog.videos_without_duration().await,
        BackfillMode::All => catalog.all_videos().await,
    }
    .map_err(|e| BackfillError(e.to_string()))?;

    let total = videos.len();
    info!("Duration backfill ({:?}) over {} videos", mode, total);

    let outcomes: Vec<(String, Outcome)> = stream::iter(videos)
        .map(|video| async move {
            let outcome = backfill_one(catalog, cache, source, mode, &video).await;
            (video.external_id, outcome)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut summary = BackfillSummary {
        mode,
        total,
        updated: 0,
        verified: 0,
        failed: Vec::new(),
    };
    for (external_id, outcome) in outcomes {
        match outcome {
            Outcome::Updated => summary.updated += 1,
            Outcome::Verified => summary.verified += 1,
            Outcome::Failed => summary.failed.push(external_id),
        }
    }
    summary.failed.sort();

    info!(
        "Duration backfill done: {} updated, {} verified, {} failed of {}",
        summary.updated,
        summary.verified,
        summary.failed.len(),
        summary.total
    );
    Ok(summary)
}

async fn backfill_one<C, S, D>(
    catalog: &C,
    cache: &DurationCache<S>,
    source: &D,
    mode: BackfillMode,
    video: &VideoMediaItem,
) -> Outcome
where
    C: VideoCatalog,
    S: CacheStore,
    D: DurationSource,
{
    let resolved = match mode {
        BackfillMode::Missing => {
            resolve_duration(cache, source, &video.external_id, &video.content)
                .await
                .seconds
        }
        BackfillMode::All => {
            refresh_duration(cache, source, &video.external_id, &video.content).await
        }
    };

    let Some(seconds) = resolved else {
        return Outcome::Failed;
    };

    let stored = video.duration_secs.and_then(|d| u64::try_from(d).ok());
    if stored == Some(seconds) {
        return Outcome::Verified;
    }

    match catalog.store_duration(video.id, seconds).await {
        Ok(()) => {
            info!(
                "Video {} duration {:?} -> {}s",
                video.external_id, video.duration_secs, seconds
            );
            Outcome::Updated
        }
        Err(e) => {
            warn!("Storing duration for video {} failed: {}", video.external_id, e);
            Outcome::Failed
        }
    }
}
