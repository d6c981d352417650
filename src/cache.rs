//! In-process response caching with TTL-based expiry.
//!
//! The [`CacheStore`] trait is the seam: alternative backing stores can be
//! substituted at client construction, but the in-memory [`MemoryCache`] is
//! the only implementation shipped. Entries expire lazily on read; the
//! client core additionally runs a periodic [`CacheStore::sweep`] to drop
//! expired entries that are never read again.

use http::{HeaderMap, StatusCode};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// One cached response snapshot.
///
/// Owned exclusively by the store; reads hand out clones.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The raw response body.
    pub body: Vec<u8>,

    /// The instant at which this entry stops being served.
    pub expires_at: Instant,

    /// The HTTP status code of the cached response.
    pub status: StatusCode,

    /// The response headers of the cached response.
    pub headers: HeaderMap,
}

impl CacheEntry {
    /// Creates an entry that expires `ttl` from now.
    pub fn new(body: Vec<u8>, ttl: Duration, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            body,
            expires_at: Instant::now() + ttl,
            status,
            headers,
        }
    }

    /// Returns `true` once the entry's expiration has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Backing store for cached responses.
///
/// All operations must be safe under concurrent use; readers may run
/// concurrently while writers are exclusive.
pub trait CacheStore: Send + Sync {
    /// Returns the entry for `key` if present and not expired.
    ///
    /// Expiry is checked lazily; an expired entry is reported absent without
    /// being removed (the sweep handles removal).
    fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Stores `entry` under `key`, overwriting any previous value.
    fn set(&self, key: &str, entry: CacheEntry);

    /// Removes the entry for `key`, if any.
    fn remove(&self, key: &str);

    /// Removes all entries.
    fn clear(&self);

    /// Returns all keys currently in the store, in no particular order.
    fn keys(&self) -> Vec<String>;

    /// Removes every entry whose expiration has passed.
    fn sweep(&self);
}

/// The default in-memory cache: a `HashMap` behind a read/write lock.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().expect("cache lock poisoned");
        let entry = entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        Some(entry.clone())
    }

    fn set(&self, key: &str, entry: CacheEntry) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(key.to_string(), entry);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.remove(key);
    }

    fn clear(&self) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.clear();
    }

    fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().expect("cache lock poisoned");
        entries.keys().cloned().collect()
    }

    fn sweep(&self) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.retain(|_, entry| !entry.is_expired());
    }
}

/// Caching configuration, set at client construction and overridable
/// per call.
///
/// TTL and cleanup interval are independent: TTL governs entry lifetime,
/// the cleanup interval governs how often the passive sweep runs. Entries
/// past their TTL are invisible to readers either way.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether responses are cached at all.
    pub enabled: bool,

    /// Default time-to-live for entries.
    pub ttl: Duration,

    /// How often the background sweep runs; zero disables the sweep task.
    pub cleanup_interval: Duration,

    /// Maximum number of stored entries; zero means unbounded. At capacity,
    /// writes for new keys are skipped until expiry or invalidation frees a
    /// slot (overwrites of existing keys always go through).
    pub max_entries: usize,

    /// Whether terminal error responses are cached too.
    pub cache_error_responses: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(10 * 60),
            max_entries: 0,
            cache_error_responses: false,
        }
    }
}

impl CacheConfig {
    /// A configuration with caching turned on and default lifetimes.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Sets the default entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the background sweep interval; zero disables the sweep.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Caps the number of stored entries; zero means unbounded.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets whether terminal error responses are cached.
    pub fn with_cache_error_responses(mut self, cache_errors: bool) -> Self {
        self.cache_error_responses = cache_errors;
        self
    }
}

/// A snapshot of the cache state, for diagnostics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of entries currently stored (expired ones included until swept).
    pub entry_count: usize,

    /// The stored keys.
    pub keys: Vec<String>,
}
