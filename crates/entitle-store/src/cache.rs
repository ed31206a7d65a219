//! Fast-path result cache contract.
//!
//! The cache maps a key to opaque bytes with an expiry. It is a latency
//! optimization for replays of already-committed operations and nothing
//! more: an absent entry is always acceptable, and callers treat every
//! [`CacheError`] as a miss (on read) or a no-op (on write).

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{CacheError, CacheResult};

/// Key → bytes store with per-entry expiry.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;
}

/// A cache that never holds anything. Every replay goes to the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl ResultCache for NoCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Process-local expiring cache.
///
/// Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Make subsequent reads and/or writes fail, as a disconnected cache
    /// server would.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn set_unavailable(&self, reads: bool, writes: bool) {
        self.fail_reads.store(reads, Ordering::SeqCst);
        self.fail_writes.store(writes, Ordering::SeqCst);
    }

    /// Overwrite an entry with arbitrary bytes.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn poison(&self, key: &str, value: Vec<u8>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + Duration::from_secs(3600),
            },
        );
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("read refused".into()));
        }
        let now = Instant::now();
        let hit = self.entries.get(key).map(|e| {
            if e.expires_at > now {
                Some(e.value.clone())
            } else {
                None
            }
        });
        match hit {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries.remove_if(key, |_, e| e.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("write refused".into()));
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let cache = MemoryCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_miss_and_are_evicted() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn unavailable_cache_errors() {
        let cache = MemoryCache::new();
        cache.set_unavailable(true, true);
        assert!(cache.get("k").await.is_err());
        assert!(cache.set("k", vec![], Duration::from_secs(1)).await.is_err());
        cache.set_unavailable(false, false);
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_cache_never_hits() {
        let cache = NoCache;
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
