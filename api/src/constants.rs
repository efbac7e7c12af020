//! Application constants

/// Cache key prefix for video durations (integer seconds)
pub const DURATION_KEY_PREFIX: &str = "video_duration";

/// Cache key prefix for video metadata (JSON)
pub const METADATA_KEY_PREFIX: &str = "video_metadata";

/// Expiry applied to every cache write (7 days)
pub const CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default interval between scheduled validation sweeps (24 hours)
pub const DEFAULT_VALIDATION_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Default number of videos validated concurrently during a sweep
pub const DEFAULT_VALIDATION_CONCURRENCY: usize = 8;

/// Timeout for requests to external duration providers
pub const DURATION_SOURCE_TIMEOUT_SECS: u64 = 5;

/// Invalid question count above which the health report degrades to warning
pub const INVALID_QUESTIONS_WARNING_THRESHOLD: usize = 10;
