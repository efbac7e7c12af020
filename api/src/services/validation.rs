//! Question timestamp validation
//!
//! Checks every interaction window of a video against the video's cached
//! duration. The outcome is three-valued: a window is only `invalid` when the
//! duration is known and the window falls outside `[0, duration]`. A video
//! whose duration has not been resolved yields `indeterminate` for all of its
//! questions.
//!
//! A sweep validates every video that owns questions. Per-video lookup
//! failures are recorded in the summary and skipped; only failing to list the
//! videos at all aborts the sweep.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::{CacheStore, DurationCache};
use crate::models::{InteractionPoint, VideoRef};

/// Read-only view of the question store.
pub trait QuestionSource: Send + Sync {
    fn videos_with_questions(
        &self,
    ) -> impl Future<Output = Result<Vec<VideoRef>, sqlx::Error>> + Send;

    /// `Ok(None)` when the video does not exist.
    fn questions_for_video(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<Vec<InteractionPoint>>, sqlx::Error>> + Send;

    /// Canonical duration persisted on the video row, if resolved.
    fn stored_duration(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<u64>, sqlx::Error>> + Send;
}

#[derive(Debug)]
pub enum ValidationError {
    SourceUnavailable(String),
    VideoNotFound(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::SourceUnavailable(e) => write!(f, "question store unavailable: {}", e),
            ValidationError::VideoNotFound(id) => write!(f, "video {} not found", id),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    Valid,
    Invalid,
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidityReason {
    WithinDuration,
    StartBeforeZero,
    EndExceedsDuration,
    InvertedWindow,
    NonFiniteWindow,
    DurationUnknown,
}

/// Classify one window against a video duration.
///
/// Unknown duration is checked before any bound so an unresolved video can
/// never be reported as invalid.
pub fn classify(time_start: f64, time_end: f64, duration: Option<u64>) -> (Validity, ValidityReason) {
    let Some(duration) = duration else {
        return (Validity::Indeterminate, ValidityReason::DurationUnknown);
    };

    if !time_start.is_finite() || !time_end.is_finite() {
        (Validity::Invalid, ValidityReason::NonFiniteWindow)
    } else if time_start < 0.0 {
        (Validity::Invalid, ValidityReason::StartBeforeZero)
    } else if time_start > time_end {
        (Validity::Invalid, ValidityReason::InvertedWindow)
    } else if time_end > duration as f64 {
        (Validity::Invalid, ValidityReason::EndExceedsDuration)
    } else {
        (Validity::Valid, ValidityReason::WithinDuration)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub question_id: i64,
    pub time_start: f64,
    pub time_end: f64,
    pub validity: Validity,
    pub reason: ValidityReason,
}

/// Validation of all questions of one video
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoValidation {
    pub video_id: String,
    pub duration: Option<u64>,
    pub total_questions: usize,
    pub valid_questions: usize,
    pub invalid_questions: usize,
    pub indeterminate_questions: usize,
    pub validation_results: Vec<ValidationResult>,
}

impl VideoValidation {
    fn build(video_id: &str, duration: Option<u64>, questions: &[InteractionPoint]) -> Self {
        let validation_results: Vec<ValidationResult> = questions
            .iter()
            .map(|q| {
                let (validity, reason) = classify(q.time_start, q.time_end, duration);
                ValidationResult {
                    question_id: q.id,
                    time_start: q.time_start,
                    time_end: q.time_end,
                    validity,
                    reason,
                }
            })
            .collect();

        let count = |v: Validity| validation_results.iter().filter(|r| r.validity == v).count();

        Self {
            video_id: video_id.to_string(),
            duration,
            total_questions: validation_results.len(),
            valid_questions: count(Validity::Valid),
            invalid_questions: count(Validity::Invalid),
            indeterminate_questions: count(Validity::Indeterminate),
            validation_results,
        }
    }
}

/// Aggregate of one sweep. Never mutated after it is built.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_questions_checked: usize,
    pub valid_questions: usize,
    pub invalid_questions: usize,
    pub indeterminate_questions: usize,
    pub videos_checked: usize,
    pub videos_without_duration: usize,
    /// External ids whose lookup failed during the sweep
    pub failed_videos: Vec<String>,
    /// When the sweep started
    pub timestamp: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
    pub alerts_sent: bool,
}

/// Cheap view of the most recent summary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub total_questions: usize,
    pub questions_with_valid_timestamps: usize,
    pub questions_with_invalid_timestamps: usize,
    pub videos_without_duration: usize,
    pub last_validation_run: Option<DateTime<Utc>>,
}

pub struct ValidationEngine<Q, S> {
    questions: Q,
    cache: Arc<DurationCache<S>>,
    concurrency: usize,
    latest: RwLock<Option<Arc<ValidationSummary>>>,
}

impl<Q, S> ValidationEngine<Q, S>
where
    Q: QuestionSource,
    S: CacheStore,
{
    pub fn new(questions: Q, cache: Arc<DurationCache<S>>, concurrency: usize) -> Self {
        Self {
            questions,
            cache,
            concurrency: concurrency.max(1),
            latest: RwLock::new(None),
        }
    }

    /// Videos processed in parallel by sweeps
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[cfg(test)]
    pub(crate) fn questions_source(&self) -> &Q {
        &self.questions
    }

    /// Classify every question of one video. Read-only.
    pub async fn validate_question_timestamps(
        &self,
        video_id: &str,
    ) -> Result<VideoValidation, ValidationError> {
        let questions = self
            .questions
            .questions_for_video(video_id)
            .await
            .map_err(|e| ValidationError::SourceUnavailable(e.to_string()))?
            .ok_or_else(|| ValidationError::VideoNotFound(video_id.to_string()))?;

        let duration = match self.cache.get_duration(video_id).await {
            Some(seconds) => Some(seconds),
            None => self.refill_duration(video_id).await,
        };
        if duration.is_none() && !questions.is_empty() {
            info!("Duration unknown for video {video_id}, {} questions indeterminate", questions.len());
        }

        Ok(VideoValidation::build(video_id, duration, &questions))
    }

    /// On a cache miss fall back to the stored duration and write it back.
    async fn refill_duration(&self, video_id: &str) -> Option<u64> {
        match self.questions.stored_duration(video_id).await {
            Ok(Some(seconds)) if seconds > 0 => {
                self.cache.set_duration(video_id, seconds).await;
                debug!("Refilled cached duration for {video_id} from the video row");
                Some(seconds)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Stored duration for {video_id} unavailable: {e}");
                None
            }
        }
    }

    /// Validate every video that owns questions and publish the summary.
    pub async fn validate_all_question_timestamps(
        &self,
    ) -> Result<Arc<ValidationSummary>, ValidationError> {
        let started = Instant::now();
        let timestamp = Utc::now();

        let videos = self
            .questions
            .videos_with_questions()
            .await
            .map_err(|e| ValidationError::SourceUnavailable(e.to_string()))?;

        let outcomes: Vec<(String, Result<VideoValidation, ValidationError>)> = stream::iter(videos)
            .map(|video| async move {
                let result = self.validate_question_timestamps(&video.external_id).await;
                (video.external_id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut total_questions_checked = 0;
        let mut valid_questions = 0;
        let mut invalid_questions = 0;
        let mut indeterminate_questions = 0;
        let mut videos_checked = 0;
        let mut videos_without_duration = 0;
        let mut failed_videos = Vec::new();

        for (video_id, outcome) in outcomes {
            match outcome {
                Ok(validation) => {
                    videos_checked += 1;
                    if validation.duration.is_none() {
                        videos_without_duration += 1;
                    }
                    total_questions_checked += validation.total_questions;
                    valid_questions += validation.valid_questions;
                    invalid_questions += validation.invalid_questions;
                    indeterminate_questions += validation.indeterminate_questions;
                }
                Err(e) => {
                    warn!("Skipping video {video_id} during sweep: {e}");
                    failed_videos.push(video_id);
                }
            }
        }
        failed_videos.sort();

        let summary = Arc::new(ValidationSummary {
            total_questions_checked,
            valid_questions,
            invalid_questions,
            indeterminate_questions,
            videos_checked,
            videos_without_duration,
            failed_videos,
            timestamp,
            completed_at: Utc::now(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            alerts_sent: invalid_questions > 0,
        });

        info!(
            "Question validation completed: {}/{} valid, {} invalid, {} indeterminate, {} videos without duration in {}ms",
            summary.valid_questions,
            summary.total_questions_checked,
            summary.invalid_questions,
            summary.indeterminate_questions,
            summary.videos_without_duration,
            summary.execution_time_ms
        );
        if summary.alerts_sent {
            warn!(
                "Question validation alert: {} questions have timestamps outside their video",
                summary.invalid_questions
            );
        }

        self.publish(Arc::clone(&summary));
        Ok(summary)
    }

    /// Round-trip to the question store. Returns the number of videos with questions.
    pub async fn check_connectivity(&self) -> Result<usize, ValidationError> {
        self.questions
            .videos_with_questions()
            .await
            .map(|videos| videos.len())
            .map_err(|e| ValidationError::SourceUnavailable(e.to_string()))
    }

    pub fn get_validation_stats(&self) -> ValidationStats {
        match self.latest_summary() {
            Some(summary) => ValidationStats {
                total_questions: summary.total_questions_checked,
                questions_with_valid_timestamps: summary.valid_questions,
                questions_with_invalid_timestamps: summary.invalid_questions,
                videos_without_duration: summary.videos_without_duration,
                last_validation_run: Some(summary.timestamp),
            },
            None => ValidationStats {
                total_questions: 0,
                questions_with_valid_timestamps: 0,
                questions_with_invalid_timestamps: 0,
                videos_without_duration: 0,
                last_validation_run: None,
            },
        }
    }

    pub fn latest_summary(&self) -> Option<Arc<ValidationSummary>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Keep whichever summary completed last, regardless of start order.
    fn publish(&self, summary: Arc<ValidationSummary>) {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        let is_newer = latest
            .as_ref()
            .is_none_or(|current| summary.completed_at >= current.completed_at);
        if is_newer {
            *latest = Some(summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Duration;

    use super::*;
    use crate::models::InteractionKind;
    use crate::services::cache::testing::MemoryStore;

    #[derive(Default)]
    struct FakeQuestions {
        videos: Mutex<Vec<VideoRef>>,
        questions: Mutex<HashMap<String, Vec<InteractionPoint>>>,
        listing_down: AtomicBool,
        broken_videos: Mutex<HashSet<String>>,
        stored: Mutex<HashMap<String, u64>>,
    }

    impl FakeQuestions {
        fn add_video(&self, external_id: &str, windows: &[(f64, f64)]) {
            let mut videos = self.videos.lock().unwrap();
            let video_id = videos.len() as i64 + 1;
            videos.push(VideoRef {
                id: video_id,
                external_id: external_id.to_string(),
            });

            let points = windows
                .iter()
                .enumerate()
                .map(|(i, (start, end))| InteractionPoint {
                    id: video_id * 100 + i as i64,
                    video_external_id: external_id.to_string(),
                    time_start: *start,
                    time_end: *end,
                    kind: InteractionKind::MultipleChoice,
                    options: vec![],
                    is_active: true,
                    language: "es".into(),
                })
                .collect();
            self.questions
                .lock()
                .unwrap()
                .insert(external_id.to_string(), points);
        }
    }

    impl QuestionSource for FakeQuestions {
        async fn videos_with_questions(&self) -> Result<Vec<VideoRef>, sqlx::Error> {
            if self.listing_down.load(Ordering::SeqCst) {
                return Err(sqlx::Error::PoolTimedOut);
            }
            Ok(self.videos.lock().unwrap().clone())
        }

        async fn questions_for_video(
            &self,
            external_id: &str,
        ) -> Result<Option<Vec<InteractionPoint>>, sqlx::Error> {
            if self.broken_videos.lock().unwrap().contains(external_id) {
                return Err(sqlx::Error::PoolTimedOut);
            }
            Ok(self.questions.lock().unwrap().get(external_id).cloned())
        }

        async fn stored_duration(&self, external_id: &str) -> Result<Option<u64>, sqlx::Error> {
            if self.broken_videos.lock().unwrap().contains(external_id) {
                return Err(sqlx::Error::PoolTimedOut);
            }
            Ok(self.stored.lock().unwrap().get(external_id).copied())
        }
    }

    fn engine() -> ValidationEngine<FakeQuestions, MemoryStore> {
        let cache = Arc::new(DurationCache::new(MemoryStore::default()));
        ValidationEngine::new(FakeQuestions::default(), cache, 4)
    }

    fn summary_completed_at(completed_at: DateTime<Utc>, invalid: usize) -> Arc<ValidationSummary> {
        Arc::new(ValidationSummary {
            total_questions_checked: invalid,
            valid_questions: 0,
            invalid_questions: invalid,
            indeterminate_questions: 0,
            videos_checked: 1,
            videos_without_duration: 0,
            failed_videos: vec![],
            timestamp: completed_at,
            completed_at,
            execution_time_ms: 0,
            alerts_sent: invalid > 0,
        })
    }

    #[test]
    fn classification_follows_window_and_duration() {
        let windows = [(0.0, 0.0), (0.0, 10.0), (5.0, 5.0), (10.0, 20.0), (100.0, 250.0)];
        for duration in [0_u64, 10, 20, 212] {
            for (start, end) in windows {
                let (validity, _) = classify(start, end, Some(duration));
                let expected = if end <= duration as f64 {
                    Validity::Valid
                } else {
                    Validity::Invalid
                };
                assert_eq!(validity, expected, "window [{start}, {end}] duration {duration}");
            }
        }
        for (start, end) in windows {
            assert_eq!(
                classify(start, end, None),
                (Validity::Indeterminate, ValidityReason::DurationUnknown)
            );
        }
    }

    #[test]
    fn end_past_duration_is_invalid() {
        assert_eq!(
            classify(210.0, 230.0, Some(212)),
            (Validity::Invalid, ValidityReason::EndExceedsDuration)
        );
    }

    #[test]
    fn unknown_duration_wins_over_bad_windows() {
        assert_eq!(classify(-5.0, 1e9, None).0, Validity::Indeterminate);
        assert_eq!(classify(30.0, 10.0, None).0, Validity::Indeterminate);
        assert_eq!(classify(f64::NAN, 1.0, None).0, Validity::Indeterminate);
    }

    #[test]
    fn malformed_windows_are_invalid_when_duration_known() {
        assert_eq!(
            classify(-1.0, 5.0, Some(60)),
            (Validity::Invalid, ValidityReason::StartBeforeZero)
        );
        assert_eq!(
            classify(30.0, 10.0, Some(60)),
            (Validity::Invalid, ValidityReason::InvertedWindow)
        );
        assert_eq!(
            classify(1.0, f64::INFINITY, Some(60)),
            (Validity::Invalid, ValidityReason::NonFiniteWindow)
        );
    }

    #[tokio::test]
    async fn validates_single_video_against_cached_duration() {
        let engine = engine();
        engine.questions.add_video("yt-212", &[(10.0, 20.0), (210.0, 230.0), (212.0, 212.0)]);
        engine.cache.set_duration("yt-212", 212).await;

        let report = engine.validate_question_timestamps("yt-212").await.expect("validate");

        assert_eq!(report.duration, Some(212));
        assert_eq!(report.total_questions, 3);
        assert_eq!(report.valid_questions, 2);
        assert_eq!(report.invalid_questions, 1);
        assert_eq!(report.validation_results[1].reason, ValidityReason::EndExceedsDuration);
    }

    #[tokio::test]
    async fn unknown_video_is_not_found() {
        let engine = engine();
        let err = engine.validate_question_timestamps("nope").await.unwrap_err();
        assert!(matches!(err, ValidationError::VideoNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn sweep_counts_each_unresolved_video_once() {
        let engine = engine();
        engine.questions.add_video("resolved", &[(0.0, 5.0)]);
        engine.questions.add_video("unresolved", &[(10.0, 20.0), (30.0, 40.0), (50.0, 60.0)]);
        engine.cache.set_duration("resolved", 60).await;

        let summary = engine.validate_all_question_timestamps().await.expect("sweep");

        assert_eq!(summary.total_questions_checked, 4);
        assert_eq!(summary.valid_questions, 1);
        assert_eq!(summary.invalid_questions, 0);
        assert_eq!(summary.indeterminate_questions, 3);
        assert_eq!(summary.videos_without_duration, 1);
        assert!(!summary.alerts_sent);
    }

    #[tokio::test]
    async fn sweep_skips_failing_videos() {
        let engine = engine();
        engine.questions.add_video("ok", &[(0.0, 5.0), (0.0, 500.0)]);
        engine.questions.add_video("broken", &[(0.0, 5.0)]);
        engine.questions.broken_videos.lock().unwrap().insert("broken".into());
        engine.cache.set_duration("ok", 60).await;

        let summary = engine.validate_all_question_timestamps().await.expect("sweep");

        assert_eq!(summary.failed_videos, vec!["broken".to_string()]);
        assert_eq!(summary.videos_checked, 1);
        assert_eq!(summary.total_questions_checked, 2);
        assert_eq!(summary.invalid_questions, 1);
        assert!(summary.alerts_sent);
    }

    #[tokio::test]
    async fn cache_outage_makes_questions_indeterminate() {
        let engine = engine();
        engine.questions.add_video("v1", &[(0.0, 5.0), (0.0, 9999.0)]);
        engine.cache.set_duration("v1", 60).await;
        engine.cache_store_offline(true);

        let summary = engine.validate_all_question_timestamps().await.expect("sweep");

        assert_eq!(summary.invalid_questions, 0);
        assert_eq!(summary.indeterminate_questions, 2);
        assert_eq!(summary.videos_without_duration, 1);
        assert!(summary.failed_videos.is_empty());
    }

    #[tokio::test]
    async fn repeated_sweeps_report_identical_counts() {
        let engine = engine();
        engine.questions.add_video("a", &[(0.0, 5.0), (50.0, 70.0)]);
        engine.questions.add_video("b", &[(1.0, 2.0)]);
        engine.cache.set_duration("a", 60).await;

        let first = engine.validate_all_question_timestamps().await.expect("first");
        let second = engine.validate_all_question_timestamps().await.expect("second");

        assert_eq!(first.total_questions_checked, second.total_questions_checked);
        assert_eq!(first.valid_questions, second.valid_questions);
        assert_eq!(first.invalid_questions, second.invalid_questions);
        assert_eq!(first.indeterminate_questions, second.indeterminate_questions);
        assert_eq!(first.videos_without_duration, second.videos_without_duration);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn failed_sweep_keeps_previous_stats() {
        let engine = engine();
        assert_eq!(engine.get_validation_stats().last_validation_run, None);
        assert_eq!(engine.get_validation_stats().total_questions, 0);

        engine.questions.add_video("a", &[(0.0, 5.0)]);
        engine.cache.set_duration("a", 60).await;
        let summary = engine.validate_all_question_timestamps().await.expect("sweep");
        let before = engine.get_validation_stats();

        engine.questions.listing_down.store(true, Ordering::SeqCst);
        let err = engine.validate_all_question_timestamps().await.unwrap_err();

        assert!(matches!(err, ValidationError::SourceUnavailable(_)));
        assert_eq!(engine.get_validation_stats(), before);
        assert_eq!(before.last_validation_run, Some(summary.timestamp));
        assert_eq!(before.questions_with_valid_timestamps, 1);
    }

    #[tokio::test]
    async fn expired_cache_entry_is_refilled_from_stored_duration() {
        let engine = engine();
        engine.questions.add_video("v1", &[(0.0, 5.0), (0.0, 9999.0)]);
        engine.questions.stored.lock().unwrap().insert("v1".into(), 60);
        engine
            .cache
            .store()
            .set_ex("video_duration:v1", "60".into(), 0)
            .await
            .unwrap();

        let first = engine.validate_all_question_timestamps().await.expect("first");
        assert_eq!(first.invalid_questions, 1);
        assert_eq!(first.valid_questions, 1);
        assert_eq!(first.indeterminate_questions, 0);
        assert_eq!(first.videos_without_duration, 0);
        assert_eq!(engine.cache.get_duration("v1").await, Some(60));

        let second = engine.validate_all_question_timestamps().await.expect("second");
        assert_eq!(second.invalid_questions, 1);
        assert_eq!(second.indeterminate_questions, 0);
    }

    #[tokio::test]
    async fn stored_duration_covers_cache_outage() {
        let engine = engine();
        engine.questions.add_video("v1", &[(0.0, 9999.0)]);
        engine.questions.stored.lock().unwrap().insert("v1".into(), 60);
        engine.cache_store_offline(true);

        let report = engine.validate_question_timestamps("v1").await.expect("validate");

        assert_eq!(report.duration, Some(60));
        assert_eq!(report.invalid_questions, 1);
    }

    #[tokio::test]
    async fn zero_stored_duration_stays_indeterminate() {
        let engine = engine();
        engine.questions.add_video("v1", &[(0.0, 5.0)]);
        engine.questions.stored.lock().unwrap().insert("v1".into(), 0);

        let report = engine.validate_question_timestamps("v1").await.expect("validate");

        assert_eq!(report.duration, None);
        assert_eq!(report.indeterminate_questions, 1);
        assert_eq!(engine.cache.get_duration("v1").await, None);
    }

    #[test]
    fn latest_completed_summary_wins() {
        let engine = engine();
        let now = Utc::now();

        engine.publish(summary_completed_at(now, 3));
        engine.publish(summary_completed_at(now - Duration::seconds(30), 7));
        assert_eq!(engine.get_validation_stats().questions_with_invalid_timestamps, 3);

        engine.publish(summary_completed_at(now + Duration::seconds(30), 9));
        assert_eq!(engine.get_validation_stats().questions_with_invalid_timestamps, 9);
    }

    impl ValidationEngine<FakeQuestions, MemoryStore> {
        fn cache_store_offline(&self, offline: bool) {
            self.cache.store().set_offline(offline);
        }
    }
}
