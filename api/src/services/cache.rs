//! Duration and metadata cache
//!
//! Memoizes video durations (integer seconds) and descriptive metadata (JSON)
//! keyed by the external video id. The cache is advisory: store failures are
//! logged, counted, and reported to callers as a miss, never as an error.
//!
//! Layout in the store:
//! - `video_duration:{externalId}` -> integer seconds
//! - `video_metadata:{externalId}` -> JSON document
//!
//! Every write resets the expiry to [`CACHE_TTL_SECS`].

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{CACHE_TTL_SECS, DURATION_KEY_PREFIX, METADATA_KEY_PREFIX};

#[derive(Debug)]
pub struct CacheError(String);

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache store error: {}", self.0)
    }
}

impl std::error::Error for CacheError {}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        CacheError(value.to_string())
    }
}

/// Key-value store with per-key expiry backing [`DurationCache`].
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;

    /// Overwrite `key` and reset its expiry.
    fn set_ex(
        &self,
        key: &str,
        value: String,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), CacheError>> + Send;

    fn ping(&self) -> impl Future<Output = Result<(), CacheError>> + Send;

    fn key_count(&self) -> impl Future<Output = Result<u64, CacheError>> + Send;

    /// Human readable memory usage as reported by the store.
    fn memory_usage(&self) -> impl Future<Output = Result<String, CacheError>> + Send;
}

/// Redis-backed store sharing one multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect once at process start. The manager reconnects on its own afterwards.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));

        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager_with_config(config).await?;

        Ok(Self { conn })
    }
}

impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(CacheError(format!("unexpected PING reply: {reply}")))
        }
    }

    async fn key_count(&self) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(count)
    }

    async fn memory_usage(&self) -> Result<String, CacheError> {
        let mut conn = self.conn.clone();
        let info: String = redis::cmd("INFO").arg("memory").query_async(&mut conn).await?;
        parse_used_memory(&info)
            .map(str::to_string)
            .ok_or_else(|| CacheError("used_memory_human missing from INFO".into()))
    }
}

fn parse_used_memory(info: &str) -> Option<&str> {
    info.lines()
        .find_map(|line| line.strip_prefix("used_memory_human:"))
        .map(str::trim)
}

/// Best-effort store introspection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_keys: u64,
    pub memory_usage: String,
}

/// Operation outcome counters
#[derive(Debug, Default)]
pub struct CacheMetrics {
    get_hit: AtomicU64,
    get_miss: AtomicU64,
    get_error: AtomicU64,
    set_success: AtomicU64,
    set_failure: AtomicU64,
    delete_success: AtomicU64,
    delete_failure: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOperationCounts {
    pub hits: u64,
    pub misses: u64,
    /// Misses caused by store failures (included in `misses`)
    pub errors: u64,
    pub set_success: u64,
    pub set_failure: u64,
    pub delete_success: u64,
    pub delete_failure: u64,
    pub hit_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Hit,
    Miss,
    Error,
    SetSuccess,
    SetFailure,
    DeleteSuccess,
    DeleteFailure,
}

impl CacheMetrics {
    fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Hit => &self.get_hit,
            Outcome::Miss => &self.get_miss,
            Outcome::Error => {
                self.get_miss.fetch_add(1, Ordering::Relaxed);
                &self.get_error
            }
            Outcome::SetSuccess => &self.set_success,
            Outcome::SetFailure => &self.set_failure,
            Outcome::DeleteSuccess => &self.delete_success,
            Outcome::DeleteFailure => &self.delete_failure,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheOperationCounts {
        let hits = self.get_hit.load(Ordering::Relaxed);
        let misses = self.get_miss.load(Ordering::Relaxed);
        let reads = hits + misses;

        CacheOperationCounts {
            hits,
            misses,
            errors: self.get_error.load(Ordering::Relaxed),
            set_success: self.set_success.load(Ordering::Relaxed),
            set_failure: self.set_failure.load(Ordering::Relaxed),
            delete_success: self.delete_success.load(Ordering::Relaxed),
            delete_failure: self.delete_failure.load(Ordering::Relaxed),
            hit_ratio: (reads > 0).then(|| hits as f64 / reads as f64),
        }
    }
}

pub fn duration_key(video_id: &str) -> String {
    format!("{DURATION_KEY_PREFIX}:{video_id}")
}

pub fn metadata_key(video_id: &str) -> String {
    format!("{METADATA_KEY_PREFIX}:{video_id}")
}

/// Advisory cache of video durations and metadata
pub struct DurationCache<S> {
    store: S,
    metrics: CacheMetrics,
}

impl<S: CacheStore> DurationCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            metrics: CacheMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Cached duration in seconds, `None` on a miss or any store failure.
    pub async fn get_duration(&self, video_id: &str) -> Option<u64> {
        self.read(&duration_key(video_id), |raw| raw.trim().parse::<u64>().ok())
            .await
    }

    pub async fn set_duration(&self, video_id: &str, seconds: u64) -> bool {
        self.write(&duration_key(video_id), seconds.to_string()).await
    }

    pub async fn get_metadata(&self, video_id: &str) -> Option<serde_json::Value> {
        self.read(&metadata_key(video_id), |raw| serde_json::from_str(raw).ok())
            .await
    }

    pub async fn set_metadata(&self, video_id: &str, value: &serde_json::Value) -> bool {
        self.write(&metadata_key(video_id), value.to_string()).await
    }

    /// Invalidate a cached duration, e.g. after the video's source changed.
    pub async fn delete_duration(&self, video_id: &str) -> bool {
        let key = duration_key(video_id);
        match self.store.delete(&key).await {
            Ok(()) => {
                self.metrics.record(Outcome::DeleteSuccess);
                debug!(key = %key, "cache delete");
                true
            }
            Err(e) => {
                self.metrics.record(Outcome::DeleteFailure);
                warn!(key = %key, "cache delete failed: {e}");
                false
            }
        }
    }

    pub async fn is_healthy(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Cache health check failed: {e}");
                false
            }
        }
    }

    pub async fn get_cache_stats(&self) -> CacheStats {
        let total_keys = self.store.key_count().await.unwrap_or_else(|e| {
            warn!("Cache key count unavailable: {e}");
            0
        });
        let memory_usage = self.store.memory_usage().await.unwrap_or_else(|e| {
            warn!("Cache memory usage unavailable: {e}");
            String::new()
        });

        CacheStats {
            total_keys,
            memory_usage,
        }
    }

    /// A value that fails to decode counts as a miss and is evicted.
    async fn read<T>(&self, key: &str, decode: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.metrics.record(Outcome::Miss);
                debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                self.metrics.record(Outcome::Error);
                warn!(key = %key, "cache read failed, treating as miss: {e}");
                return None;
            }
        };

        match decode(&raw) {
            Some(value) => {
                self.metrics.record(Outcome::Hit);
                debug!(key = %key, "cache hit");
                Some(value)
            }
            None => {
                self.metrics.record(Outcome::Miss);
                warn!(key = %key, "discarding undecodable cached value");
                if let Err(e) = self.store.delete(key).await {
                    warn!(key = %key, "evicting undecodable value failed: {e}");
                }
                None
            }
        }
    }

    async fn write(&self, key: &str, value: String) -> bool {
        match self.store.set_ex(key, value, CACHE_TTL_SECS).await {
            Ok(()) => {
                self.metrics.record(Outcome::SetSuccess);
                debug!(key = %key, "cache set");
                true
            }
            Err(e) => {
                self.metrics.record(Outcome::SetFailure);
                warn!(key = %key, "cache write failed: {e}");
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;

    use super::testing::MemoryStore;
    use super::*;

    #[tokio::test]
    async fn duration_round_trip_and_delete() {
        let cache = DurationCache::new(MemoryStore::default());

        assert!(cache.set_duration("abc123", 212).await);
        assert_eq!(cache.get_duration("abc123").await, Some(212));

        assert!(cache.delete_duration("abc123").await);
        assert_eq!(cache.get_duration("abc123").await, None);
    }

    #[tokio::test]
    async fn writes_overwrite_and_reset_expiry() {
        let cache = DurationCache::new(MemoryStore::default());

        cache.set_duration("v1", 100).await;
        let first = cache.store.expiry_of("video_duration:v1").expect("expiry");
        cache.set_duration("v1", 120).await;
        let second = cache.store.expiry_of("video_duration:v1").expect("expiry");

        assert_eq!(cache.get_duration("v1").await, Some(120));
        assert!(second >= first);
        let remaining = second - Instant::now();
        assert!(remaining > Duration::from_secs(CACHE_TTL_SECS - 60));
    }

    #[tokio::test]
    async fn metadata_uses_its_own_namespace() {
        let cache = DurationCache::new(MemoryStore::default());
        let meta = json!({ "title": "Intro", "platform": "youtube" });

        cache.set_duration("v1", 90).await;
        assert_eq!(cache.get_metadata("v1").await, None);

        assert!(cache.set_metadata("v1", &meta).await);
        assert_eq!(cache.get_metadata("v1").await, Some(meta));
        assert_eq!(cache.get_duration("v1").await, Some(90));
    }

    #[tokio::test]
    async fn store_failure_reads_as_miss() {
        let cache = DurationCache::new(MemoryStore::default());
        cache.set_duration("v1", 90).await;
        cache.store.set_offline(true);

        assert_eq!(cache.get_duration("v1").await, None);
        assert!(!cache.set_duration("v1", 91).await);
        assert!(!cache.is_healthy().await);

        let counts = cache.metrics().snapshot();
        assert_eq!(counts.misses, 1);
        assert_eq!(counts.errors, 1);
        assert_eq!(counts.set_failure, 1);
        assert_eq!(counts.set_success, 1);
    }

    #[tokio::test]
    async fn stats_degrade_to_empty_values() {
        let cache = DurationCache::new(MemoryStore::default());
        cache.set_duration("v1", 1).await;
        cache.set_duration("v2", 2).await;

        let stats = cache.get_cache_stats().await;
        assert_eq!(stats.total_keys, 2);
        assert_eq!(stats.memory_usage, "1.00K");

        cache.store.set_offline(true);
        assert_eq!(cache.get_cache_stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn hit_ratio_tracks_reads() {
        let cache = DurationCache::new(MemoryStore::default());
        assert_eq!(cache.metrics().snapshot().hit_ratio, None);

        cache.set_duration("v1", 10).await;
        cache.get_duration("v1").await;
        cache.get_duration("missing").await;

        let counts = cache.metrics().snapshot();
        assert_eq!(counts.hits, 1);
        assert_eq!(counts.misses, 1);
        assert_eq!(counts.hit_ratio, Some(0.5));
    }

    #[tokio::test]
    async fn undecodable_value_is_a_miss_and_evicted() {
        let cache = DurationCache::new(MemoryStore::default());
        cache
            .store
            .set_ex("video_duration:v1", "three minutes".into(), 60)
            .await
            .unwrap();

        assert_eq!(cache.get_duration("v1").await, None);
        assert_eq!(cache.store.expiry_of("video_duration:v1"), None);

        let counts = cache.metrics().snapshot();
        assert_eq!(counts.hits, 0);
        assert_eq!(counts.misses, 1);
        assert_eq!(counts.hit_ratio, Some(0.0));
    }

    #[test]
    fn parses_used_memory_from_info() {
        let info = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n";
        assert_eq!(parse_used_memory(info), Some("1.00M"));
        assert_eq!(parse_used_memory("# Memory\r\n"), None);
    }
}
