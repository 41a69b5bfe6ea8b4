//! Response caching.
//!
//! The manager consults a [`ResponseCache`] before dispatching GET and HEAD
//! requests and stores successful responses afterwards, as directed by the
//! call's [`CachePolicy`]. [`MemoryCache`] is the bundled implementation:
//! TTL expiry plus least-recently-used eviction.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::Method;
use http::header::CACHE_CONTROL;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use turbofetch_transport_traits::{BuiltRequest, ResponseMeta};

/// How a single call interacts with the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Read and write the cache, honouring `cache-control: no-cache` /
    /// `no-store` on the request and `no-store` on the response.
    #[default]
    UseProtocol,
    /// Always go to the transport, still storing the fresh response.
    ReloadIgnoringCache,
    /// Use any cached response regardless of request directives.
    ReturnCacheElseLoad,
    /// Never touch the transport; a miss fails with `Error::CacheMiss`.
    ReturnCacheOnly,
}

impl CachePolicy {
    /// Whether a lookup should happen for `request`.
    pub fn allows_lookup(self, request: &BuiltRequest) -> bool {
        match self {
            Self::UseProtocol => !has_directive(
                request.header(CACHE_CONTROL.as_str()),
                &["no-cache", "no-store"],
            ),
            Self::ReloadIgnoringCache => false,
            Self::ReturnCacheElseLoad | Self::ReturnCacheOnly => true,
        }
    }

    /// Whether a successful `response` to `request` should be stored.
    pub fn allows_store(self, request: &BuiltRequest, response: &ResponseMeta) -> bool {
        match self {
            Self::ReturnCacheOnly => false,
            Self::UseProtocol => {
                !has_directive(request.header(CACHE_CONTROL.as_str()), &["no-store"])
                    && !has_directive(response.header(CACHE_CONTROL.as_str()), &["no-store"])
            }
            Self::ReloadIgnoringCache | Self::ReturnCacheElseLoad => true,
        }
    }
}

fn has_directive(header: Option<&str>, directives: &[&str]) -> bool {
    header.is_some_and(|value| {
        value
            .split(',')
            .map(|d| d.trim().to_ascii_lowercase())
            .any(|d| directives.contains(&d.as_str()))
    })
}

/// Cache key for `request`, or `None` if the method is not cacheable.
pub fn cache_key(request: &BuiltRequest) -> Option<String> {
    (request.method == Method::GET || request.method == Method::HEAD)
        .then(|| format!("{} {}", request.method, request.url))
}

/// A stored response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// Response metadata.
    pub response: ResponseMeta,
    /// Response body.
    pub body: Bytes,
}

/// Storage backend for cached responses.
pub trait ResponseCache: Send + Sync + fmt::Debug {
    /// Returns the entry under `key`, if present and fresh.
    fn get(&self, key: &str) -> Option<CachedResponse>;

    /// Stores `response` under `key`.
    fn put(&self, key: String, response: CachedResponse);

    /// Removes the entry under `key`.
    fn remove(&self, key: &str);

    /// Removes every entry.
    fn clear(&self);
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached entries
    pub max_entries: usize,
    /// Time-to-live for cached entries
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(300), // 5 minutes
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    created: Instant,
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(response: CachedResponse) -> Self {
        let now = Instant::now();
        Self {
            response,
            created: now,
            last_accessed: now,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created.elapsed() > ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Entries evicted due to size limit
    pub evictions: u64,
    /// Entries expired
    pub expirations: u64,
    /// Current entry count
    pub current_entries: usize,
}

/// Thread-safe in-memory response cache.
#[derive(Debug)]
pub struct MemoryCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl MemoryCache {
    /// Create a new cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Evict least recently used entries.
    fn evict_lru(&self, entries: &mut HashMap<String, CacheEntry>) {
        let mut by_access: Vec<_> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.last_accessed))
            .collect();
        by_access.sort_by_key(|(_, accessed)| *accessed);

        // Evict 10% of entries or at least 1
        let evict_count = (entries.len() / 10).max(1);
        for (key, _) in by_access.into_iter().take(evict_count) {
            entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            current_entries: self.entries.read().len(),
        }
    }

    /// Remove expired entries.
    pub fn cleanup(&self) {
        let mut entries = self.entries.write();
        let ttl = self.config.ttl;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(ttl));
        let expired = (before - entries.len()) as u64;
        self.expirations.fetch_add(expired, Ordering::Relaxed);
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.entries.write();

        if let Some(entry) = entries.get_mut(key) {
            if entry.is_expired(self.config.ttl) {
                entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }

            entry.last_accessed = Instant::now();
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.response.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn put(&self, key: String, response: CachedResponse) {
        let mut entries = self.entries.write();

        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            self.evict_lru(&mut entries);
        }

        entries.insert(key, CacheEntry::new(response));
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, StatusCode};
    use url::Url;

    fn request(method: Method, path: &str) -> BuiltRequest {
        let url = Url::parse("https://example.com/").unwrap().join(path).unwrap();
        BuiltRequest::new(method, url)
    }

    fn cached(body: &'static str) -> CachedResponse {
        CachedResponse {
            response: ResponseMeta::new(StatusCode::OK, Url::parse("https://example.com/").unwrap()),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_cache_key_only_for_safe_methods() {
        assert_eq!(
            cache_key(&request(Method::GET, "/a")).as_deref(),
            Some("GET https://example.com/a")
        );
        assert!(cache_key(&request(Method::HEAD, "/a")).is_some());
        assert!(cache_key(&request(Method::POST, "/a")).is_none());
    }

    #[test]
    fn test_hits_misses_and_expiry() {
        let cache = MemoryCache::new(CacheConfig {
            max_entries: 10,
            ttl: Duration::from_millis(20),
        });

        assert!(cache.get("k").is_none());
        cache.put("k".into(), cached("v"));
        assert_eq!(&cache.get("k").unwrap().body[..], b"v");

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("k").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.current_entries, 0);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoryCache::new(CacheConfig {
            max_entries: 2,
            ttl: Duration::from_secs(60),
        });
        cache.put("a".into(), cached("a"));
        std::thread::sleep(Duration::from_millis(2));
        cache.put("b".into(), cached("b"));
        std::thread::sleep(Duration::from_millis(2));
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("a").is_some());
        cache.put("c".into(), cached("c"));

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_policy_directives() {
        let plain = request(Method::GET, "/a");
        let mut no_cache = request(Method::GET, "/a");
        no_cache.set_header(CACHE_CONTROL, HeaderValue::from_static("max-age=0, No-Cache"));

        assert!(CachePolicy::UseProtocol.allows_lookup(&plain));
        assert!(!CachePolicy::UseProtocol.allows_lookup(&no_cache));
        assert!(CachePolicy::ReturnCacheElseLoad.allows_lookup(&no_cache));
        assert!(!CachePolicy::ReloadIgnoringCache.allows_lookup(&plain));

        let stored = ResponseMeta::new(StatusCode::OK, plain.url.clone());
        let no_store = stored
            .clone()
            .with_header(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        assert!(CachePolicy::UseProtocol.allows_store(&plain, &stored));
        assert!(!CachePolicy::UseProtocol.allows_store(&plain, &no_store));
        assert!(CachePolicy::ReloadIgnoringCache.allows_store(&plain, &no_store));
        assert!(!CachePolicy::ReturnCacheOnly.allows_store(&plain, &stored));
    }
}
