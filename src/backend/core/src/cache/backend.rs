//! Cache backend implementations.
//!
//! - **InMemoryBackend**: process-local map with per-entry expiry
//! - **RedisBackend**: shared cache for multi-instance deployments
//!
//! Backends store opaque bytes under fully-qualified keys; naming and
//! serialization live in [`super::PermissionCache`].

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::RedisConfig;
use crate::error::{ErrorCode, GatehouseError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Backend Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for cache backends.
///
/// Every method may fail transiently; callers decide whether a failure matters.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache. Missing or expired keys are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Delete a value. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every key starting with `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// Get the backend name.
    fn name(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Backend
// ═══════════════════════════════════════════════════════════════════════════════

struct InMemoryEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl InMemoryEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Writes between two sweeps of expired entries.
const SWEEP_EVERY: u64 = 1024;

/// In-memory cache backend.
///
/// Expiry is checked on read against `tokio::time::Instant`, so a paused
/// test clock controls TTLs. Entries that are never read again are dropped
/// by a sweep every [`SWEEP_EVERY`] writes.
#[derive(Default)]
pub struct InMemoryBackend {
    entries: DashMap<String, InMemoryEntry>,
    writes: AtomicU64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let expired = before.saturating_sub(self.entries.len());
        if expired > 0 {
            debug!("Cleaned up {} expired cache entries", expired);
        }
        expired
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };

        if entry.is_expired() {
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired());
            return Ok(None);
        }

        Ok(Some(entry.data.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            InMemoryEntry {
                data: value,
                expires_at: Instant::now() + ttl,
            },
        );
        counter!("cache_sets_total", "backend" => "in_memory").increment(1);

        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.cleanup_expired();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                counter!("cache_deletes_total", "backend" => "in_memory").increment(1);
                Ok(!entry.is_expired())
            }
            None => Ok(false),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let deleted = before.saturating_sub(self.entries.len()) as u64;
        counter!("cache_deletes_total", "backend" => "in_memory").increment(deleted);
        Ok(deleted)
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Redis cache backend.
///
/// Holds one auto-reconnecting multiplexed connection; every operation runs
/// on a clone of it and is bounded by `op_timeout`.
pub struct RedisBackend {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisBackend {
    /// Create a new Redis backend and verify the connection.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            GatehouseError::with_internal(
                ErrorCode::CacheConnectionFailed,
                "Failed to create Redis client",
                e.to_string(),
            )
        })?;

        let mut conn = ConnectionManager::new(client).await.map_err(|e| {
            GatehouseError::with_internal(
                ErrorCode::CacheConnectionFailed,
                "Failed to connect to Redis",
                e.to_string(),
            )
        })?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                GatehouseError::with_internal(
                    ErrorCode::CacheConnectionFailed,
                    "Redis ping failed",
                    e.to_string(),
                )
            })?;

        info!("Redis cache backend connected to {}", config.url);

        Ok(Self {
            conn,
            op_timeout: config.op_timeout,
        })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>> + Send,
    {
        with_timeout(op, self.op_timeout, fut).await
    }
}

/// Run one Redis call, turning an elapsed `limit` into a `CacheError`.
async fn with_timeout<T, F>(op: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(GatehouseError::with_internal(
            ErrorCode::CacheError,
            "Cache operation timed out",
            format!("redis {} exceeded {:?}", op, limit),
        )),
    }
}

/// Escape glob metacharacters so a literal prefix can be used with `MATCH`.
fn glob_escape(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        self.bounded("get", async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        // SET EX rejects a zero expiry.
        let ttl_secs = ttl.as_secs().max(1);
        self.bounded("set", async move {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await
        })
        .await?;
        counter!("cache_sets_total", "backend" => "redis").increment(1);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self.bounded("del", async move { conn.del(key).await }).await?;
        if deleted > 0 {
            counter!("cache_deletes_total", "backend" => "redis").increment(1);
        }
        Ok(deleted > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let pattern = format!("{}*", glob_escape(prefix));
        let pattern = pattern.as_str();
        let mut cursor: u64 = 0;
        let mut total_deleted = 0;

        // Each SCAN page and its DEL are bounded separately.
        loop {
            let mut conn = self.conn.clone();
            let (new_cursor, keys): (u64, Vec<String>) = self
                .bounded("scan", async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                let mut conn = self.conn.clone();
                let deleted: i64 = self
                    .bounded("del", async move { conn.del(&keys).await })
                    .await?;
                total_deleted += deleted as u64;
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        counter!("cache_deletes_total", "backend" => "redis").increment(total_deleted);
        Ok(total_deleted)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_expiry() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_delete_prefix() {
        let backend = InMemoryBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set("p:perm:1:a", vec![1], ttl).await.unwrap();
        backend.set("p:perm:1:b", vec![1], ttl).await.unwrap();
        backend.set("p:perm:12:a", vec![1], ttl).await.unwrap();
        backend.set("p:prop_org:5", vec![1], ttl).await.unwrap();

        let deleted = backend.delete_prefix("p:perm:1:").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(backend.len(), 2);
        assert!(backend.get("p:perm:12:a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_in_memory_delete() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", vec![1], Duration::from_secs(60))
            .await
            .unwrap();
        assert!(backend.delete("k").await.unwrap());
        assert!(!backend.delete("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_unread_expired_entries() {
        let backend = InMemoryBackend::new();
        backend
            .set("stale", vec![1], Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        for i in 1..SWEEP_EVERY - 1 {
            backend
                .set(&format!("live:{}", i), vec![1], Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(backend.len() as u64, SWEEP_EVERY - 1);

        backend
            .set("last", vec![1], Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(backend.len() as u64, SWEEP_EVERY - 1);
        assert!(backend.get("last").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_redis_call_becomes_cache_error() {
        let err = with_timeout(
            "get",
            Duration::from_millis(250),
            std::future::pending::<redis::RedisResult<Option<Vec<u8>>>>(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::CacheError);
        assert!(!err.is_denial());
    }

    #[tokio::test]
    async fn test_redis_error_passes_through_timeout() {
        let failed: redis::RedisResult<()> = Err(redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "WRONGTYPE",
        )));
        let err = with_timeout("set", Duration::from_secs(1), async { failed })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::CacheError);
    }

    #[test]
    fn test_glob_escape() {
        assert_eq!(glob_escape("gatehouse:perm:1:"), "gatehouse:perm:1:");
        assert_eq!(glob_escape("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }
}
