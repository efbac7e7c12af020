//! External duration lookup for registered videos.
//!
//! Durations are resolved cache-first. On a miss the provider is asked
//! (YouTube Data API or Vimeo oEmbed, depending on the content locator) and a
//! positive answer is written back to the cache.

use std::fmt;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::cache::{CacheStore, DurationCache};
use crate::constants::DURATION_SOURCE_TIMEOUT_SECS;

static YOUTUBE_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"youtube\.com/watch\?v=([a-zA-Z0-9_-]+)",
        r"youtu\.be/([a-zA-Z0-9_-]+)",
        r"youtube\.com/embed/([a-zA-Z0-9_-]+)",
        r#""videoId"\s*:\s*"([a-zA-Z0-9_-]+)""#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid youtube id pattern"))
    .collect()
});

static VIMEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"player\.vimeo\.com/video/(\d+)", r"vimeo\.com/(\d+)"]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid vimeo id pattern"))
        .collect()
});

static ISO8601_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("valid ISO-8601 pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoPlatform {
    YouTube,
    Vimeo,
    Unknown,
}

pub fn detect_platform(content: &str) -> VideoPlatform {
    let lowered = content.to_ascii_lowercase();
    if lowered.contains("youtube.com") || lowered.contains("youtu.be") || lowered.contains("\"videoid\"") {
        VideoPlatform::YouTube
    } else if lowered.contains("vimeo.com") {
        VideoPlatform::Vimeo
    } else {
        VideoPlatform::Unknown
    }
}

fn first_capture(patterns: &[Regex], content: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_youtube_id(content: &str) -> Option<String> {
    first_capture(&YOUTUBE_ID_PATTERNS, content)
}

pub fn extract_vimeo_id(content: &str) -> Option<String> {
    first_capture(&VIMEO_ID_PATTERNS, content)
}

/// Platform-specific id of the video behind a content locator
pub fn provider_video_id(content: &str) -> Option<String> {
    match detect_platform(content) {
        VideoPlatform::YouTube => extract_youtube_id(content),
        VideoPlatform::Vimeo => extract_vimeo_id(content),
        VideoPlatform::Unknown => None,
    }
}

/// Convert an ISO-8601 time duration (`PT#H#M#S`) to seconds.
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    let caps = ISO8601_DURATION.captures(value.trim())?;
    if caps.iter().skip(1).all(|group| group.is_none()) {
        return None;
    }

    let part = |index: usize| -> Option<u64> {
        caps.get(index)
            .map_or(Some(0), |m| m.as_str().parse::<u64>().ok())
    };

    Some(part(1)? * 3600 + part(2)? * 60 + part(3)?)
}

#[derive(Debug)]
pub enum SourceError {
    UnsupportedContent,
    MissingApiKey,
    Http(reqwest::Error),
    NotFound(String),
    Malformed(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::UnsupportedContent => write!(f, "no supported video id in content"),
            SourceError::MissingApiKey => write!(f, "YOUTUBE_API_KEY is not configured"),
            SourceError::Http(err) => write!(f, "http error: {err}"),
            SourceError::NotFound(id) => write!(f, "video {id} not found at provider"),
            SourceError::Malformed(detail) => write!(f, "malformed provider response: {detail}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<reqwest::Error> for SourceError {
    fn from(value: reqwest::Error) -> Self {
        SourceError::Http(value)
    }
}

/// Slow, authoritative source of video durations.
pub trait DurationSource: Send + Sync {
    fn fetch_duration(&self, content: &str) -> impl Future<Output = Result<u64, SourceError>> + Send;
}

#[derive(Deserialize)]
struct YouTubeVideosResponse {
    #[serde(default)]
    items: Vec<YouTubeVideo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct YouTubeVideo {
    content_details: YouTubeContentDetails,
}

#[derive(Deserialize)]
struct YouTubeContentDetails {
    duration: String,
}

#[derive(Deserialize)]
struct VimeoOembedResponse {
    duration: Option<u64>,
}

/// Duration lookups against the public YouTube and Vimeo APIs.
#[derive(Clone)]
pub struct HttpDurationSource {
    http: reqwest::Client,
    youtube_api_key: Option<String>,
}

impl HttpDurationSource {
    pub fn new(youtube_api_key: Option<String>) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DURATION_SOURCE_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            youtube_api_key,
        })
    }

    pub fn has_youtube_key(&self) -> bool {
        self.youtube_api_key.is_some()
    }

    async fn youtube_duration(&self, video_id: &str) -> Result<u64, SourceError> {
        let api_key = self.youtube_api_key.as_deref().ok_or(SourceError::MissingApiKey)?;

        let response: YouTubeVideosResponse = self
            .http
            .get("https://www.googleapis.com/youtube/v3/videos")
            .query(&[("id", video_id), ("part", "contentDetails"), ("key", api_key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let video = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NotFound(video_id.to_string()))?;

        parse_iso8601_duration(&video.content_details.duration)
            .ok_or(SourceError::Malformed(video.content_details.duration))
    }

    async fn vimeo_duration(&self, video_id: &str) -> Result<u64, SourceError> {
        let video_url = format!("https://vimeo.com/{video_id}");
        let response: VimeoOembedResponse = self
            .http
            .get("https://vimeo.com/api/oembed.json")
            .query(&[("url", video_url.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .duration
            .ok_or_else(|| SourceError::Malformed("oEmbed response without duration".into()))
    }
}

impl DurationSource for HttpDurationSource {
    async fn fetch_duration(&self, content: &str) -> Result<u64, SourceError> {
        match detect_platform(content) {
            VideoPlatform::YouTube => {
                let id = extract_youtube_id(content).ok_or(SourceError::UnsupportedContent)?;
                self.youtube_duration(&id).await
            }
            VideoPlatform::Vimeo => {
                let id = extract_vimeo_id(content).ok_or(SourceError::UnsupportedContent)?;
                self.vimeo_duration(&id).await
            }
            VideoPlatform::Unknown => Err(SourceError::UnsupportedContent),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationOrigin {
    Cache,
    External,
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDuration {
    pub seconds: Option<u64>,
    pub origin: DurationOrigin,
}

/// Cache-first duration lookup. A positive provider answer populates the cache.
pub async fn resolve_duration<S, D>(
    cache: &DurationCache<S>,
    source: &D,
    external_id: &str,
    content: &str,
) -> ResolvedDuration
where
    S: CacheStore,
    D: DurationSource,
{
    if let Some(seconds) = cache.get_duration(external_id).await {
        return ResolvedDuration {
            seconds: Some(seconds),
            origin: DurationOrigin::Cache,
        };
    }

    match refresh_duration(cache, source, external_id, content).await {
        Some(seconds) => ResolvedDuration {
            seconds: Some(seconds),
            origin: DurationOrigin::External,
        },
        None => ResolvedDuration {
            seconds: None,
            origin: DurationOrigin::Unresolved,
        },
    }
}

/// Ask the provider without consulting the cache, then overwrite the cached value.
pub async fn refresh_duration<S, D>(
    cache: &DurationCache<S>,
    source: &D,
    external_id: &str,
    content: &str,
) -> Option<u64>
where
    S: CacheStore,
    D: DurationSource,
{
    match source.fetch_duration(content).await {
        Ok(seconds) if seconds > 0 => {
            cache.set_duration(external_id, seconds).await;
            info!("Resolved duration for {external_id}: {seconds}s");
            Some(seconds)
        }
        Ok(_) => {
            warn!("Provider returned a zero duration for {external_id}");
            None
        }
        Err(e) => {
            warn!("Could not resolve duration for {external_id}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::services::cache::testing::MemoryStore;
    use super::*;

    struct FixedSource {
        answer: Option<u64>,
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn new(answer: Option<u64>) -> Self {
            Self {
                answer,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DurationSource for FixedSource {
        async fn fetch_duration(&self, _content: &str) -> Result<u64, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.ok_or(SourceError::UnsupportedContent)
        }
    }

    #[test]
    fn extracts_youtube_ids() {
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10"),
            Some("dQw4w9WgXcQ".into())
        );
        assert_eq!(extract_youtube_id("https://youtu.be/abc_DEF-12"), Some("abc_DEF-12".into()));
        assert_eq!(
            extract_youtube_id(r#"<iframe src="https://www.youtube.com/embed/XyZ123"></iframe>"#),
            Some("XyZ123".into())
        );
        assert_eq!(extract_youtube_id(r#"{"videoId": "json_id"}"#), Some("json_id".into()));
        assert_eq!(extract_youtube_id("https://example.com/video.mp4"), None);
    }

    #[test]
    fn extracts_vimeo_ids() {
        assert_eq!(extract_vimeo_id("https://vimeo.com/76979871"), Some("76979871".into()));
        assert_eq!(
            extract_vimeo_id("https://player.vimeo.com/video/12345?h=abc"),
            Some("12345".into())
        );
        assert_eq!(extract_vimeo_id("https://vimeo.com/channels/staff"), None);
    }

    #[test]
    fn detects_platforms() {
        assert_eq!(detect_platform("https://youtu.be/x"), VideoPlatform::YouTube);
        assert_eq!(detect_platform("https://vimeo.com/1"), VideoPlatform::Vimeo);
        assert_eq!(detect_platform("/media/local.mp4"), VideoPlatform::Unknown);
        assert_eq!(provider_video_id("https://vimeo.com/42"), Some("42".into()));
        assert_eq!(provider_video_id("/media/local.mp4"), None);
    }

    #[test]
    fn parses_iso8601_durations() {
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("PT3M32S"), Some(212));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("PT2H"), Some(7200));
        assert_eq!(parse_iso8601_duration("PT"), None);
        assert_eq!(parse_iso8601_duration("3 minutes"), None);
    }

    #[tokio::test]
    async fn cache_hit_skips_provider() {
        let cache = DurationCache::new(MemoryStore::default());
        cache.set_duration("v1", 212).await;
        let source = FixedSource::new(Some(999));

        let resolved = resolve_duration(&cache, &source, "v1", "https://youtu.be/v1").await;

        assert_eq!(resolved.seconds, Some(212));
        assert_eq!(resolved.origin, DurationOrigin::Cache);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn miss_populates_cache_from_provider() {
        let cache = DurationCache::new(MemoryStore::default());
        let source = FixedSource::new(Some(300));

        let resolved = resolve_duration(&cache, &source, "v1", "https://youtu.be/v1").await;

        assert_eq!(resolved.origin, DurationOrigin::External);
        assert_eq!(cache.get_duration("v1").await, Some(300));
    }

    #[tokio::test]
    async fn provider_failure_is_unresolved() {
        let cache = DurationCache::new(MemoryStore::default());

        let failed = resolve_duration(&cache, &FixedSource::new(None), "v1", "x").await;
        assert_eq!(failed.origin, DurationOrigin::Unresolved);
        assert_eq!(failed.seconds, None);

        let zero = resolve_duration(&cache, &FixedSource::new(Some(0)), "v1", "x").await;
        assert_eq!(zero.origin, DurationOrigin::Unresolved);
        assert_eq!(cache.get_duration("v1").await, None);
    }

    #[tokio::test]
    async fn refresh_bypasses_and_overwrites_cache() {
        let cache = DurationCache::new(MemoryStore::default());
        cache.set_duration("v1", 100).await;
        let source = FixedSource::new(Some(130));

        assert_eq!(refresh_duration(&cache, &source, "v1", "https://youtu.be/v1").await, Some(130));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get_duration("v1").await, Some(130));

        assert_eq!(refresh_duration(&cache, &FixedSource::new(None), "v1", "x").await, None);
        assert_eq!(cache.get_duration("v1").await, Some(130));
    }
}
