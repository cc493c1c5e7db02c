//! Expiring key → JSON value store shared by the geocode and forecast layers.
//!
//! Reads and writes are independent per key; the last writer on a key wins.
//! Concurrent misses for the same key are not coalesced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

/// Key/value store with per-entry time-to-live.
pub trait CacheStore: Send + Sync {
    /// Value stored under `key`, if present and not expired.
    fn read(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key` for `ttl`. A zero TTL stores nothing.
    fn write(&self, key: &str, value: Value, ttl: Duration);

    fn delete(&self, key: &str);
}

/// Read and decode a cached value. Undecodable entries count as misses.
pub fn read_json<T: DeserializeOwned>(cache: &dyn CacheStore, key: &str) -> Option<T> {
    let value = cache.read(key)?;
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
            cache.delete(key);
            None
        }
    }
}

/// Encode and store a value. Encoding failures are logged and skipped.
pub fn write_json<T: Serialize>(cache: &dyn CacheStore, key: &str, value: &T, ttl: Duration) {
    match serde_json::to_value(value) {
        Ok(encoded) => cache.write(key, encoded, ttl),
        Err(e) => tracing::warn!("Skipping cache write for {}: {}", key, e),
    }
}

/// Namespaced key for a free-text address: `<namespace><sha256(lowercase(trim(address)))>`.
pub fn address_key(namespace: &str, address: &str) -> String {
    let normalized = address.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{}{}", namespace, hex::encode(digest))
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// Writes between sweeps of expired entries.
const PURGE_EVERY_WRITES: usize = 64;

/// In-process cache guarded by a mutex.
///
/// Expired entries are dropped when read and swept on every
/// `PURGE_EVERY_WRITES`th write, so keys that are never read again do not
/// accumulate.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        sweep(&mut self.entries.lock())
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn read(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn write(&self, key: &str, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut entries = self.entries.lock();
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY_WRITES == 0 {
            let removed = sweep(&mut entries);
            if removed > 0 {
                tracing::debug!("Purged {} expired cache entries", removed);
            }
        }
        entries.insert(key.to_owned(), entry);
    }

    fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

fn sweep(entries: &mut HashMap<String, Entry>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_after_write() {
        let cache = MemoryCache::new();
        cache.write("a", json!({"x": 1}), Duration::from_secs(60));
        assert_eq!(cache.read("a"), Some(json!({"x": 1})));
        assert_eq!(cache.read("b"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache.write("a", json!(1), Duration::from_secs(30 * 60));

        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        assert_eq!(cache.read("a"), Some(json!(1)));

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert_eq!(cache.read("a"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.write("short", json!(1), Duration::from_secs(1));
        cache.write("long", json!(2), Duration::from_secs(100));
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_expired_entries() {
        let cache = MemoryCache::new();
        for i in 0..10 {
            cache.write(&format!("stale-{}", i), json!(i), Duration::from_secs(1));
        }
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.len(), 10);

        for i in 10..PURGE_EVERY_WRITES {
            cache.write(&format!("fresh-{}", i), json!(i), Duration::from_secs(60));
        }
        assert_eq!(cache.len(), PURGE_EVERY_WRITES - 10);
        assert_eq!(cache.read("stale-0"), None);
        assert_eq!(cache.read(&format!("fresh-{}", PURGE_EVERY_WRITES - 1)), Some(json!(63)));
    }

    #[tokio::test]
    async fn test_zero_ttl_stores_nothing() {
        let cache = MemoryCache::new();
        cache.write("a", json!(1), Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let cache = MemoryCache::new();
        cache.write("a", json!(1), Duration::from_secs(60));
        cache.write("a", json!(2), Duration::from_secs(60));
        assert_eq!(cache.read("a"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let cache = MemoryCache::new();
        cache.write("a", json!("not a number"), Duration::from_secs(60));
        assert_eq!(read_json::<u32>(&cache, "a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_address_key_normalizes() {
        let a = address_key("geocode/google/", "  1 Main St ");
        let b = address_key("geocode/google/", "1 MAIN ST");
        assert_eq!(a, b);
        assert!(a.starts_with("geocode/google/"));
        assert_eq!(a.len(), "geocode/google/".len() + 64);
        assert_ne!(a, address_key("geocode/census/", "1 main st"));
    }
}
