//! Versioned asset cache.
//!
//! `CacheStorage` maps generation tags to `Cache`s; each `Cache` maps an
//! absolute request URL (fragment stripped) to a captured response.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fetch::FetchResponse;

/// Key under which a request URL is cached.
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

// ==================== Cache Entry ====================

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Capture a network response for `url`.
    pub fn capture(url: &Url, response: &FetchResponse, cached_at: u64) -> Self {
        Self {
            url: cache_key(url),
            method: "GET".to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at,
        }
    }
}

// ==================== Cache ====================

/// One cache generation.
#[derive(Debug, Default)]
pub struct Cache {
    /// Generation tag.
    pub name: String,

    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Exact-key lookup. Only an entry stored for the same method matches,
    /// so anything but GET misses a populated generation.
    pub fn match_request(&self, method: &str, key: &str) -> Option<&CacheEntry> {
        self.entries
            .get(key)
            .filter(|entry| entry.method.eq_ignore_ascii_case(method))
    }

    /// Insert or overwrite one entry.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Bulk insert. Duplicate keys overwrite, so repeating a population is safe.
    pub fn put_all(&mut self, entries: impl IntoIterator<Item = CacheEntry>) {
        for entry in entries {
            self.put(entry);
        }
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// All cache generations visible to the worker's origin.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache, creating it if it doesn't exist.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All generation tags, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up `key` in the named generation only.
    pub fn match_in(&self, name: &str, method: &str, key: &str) -> Option<&CacheEntry> {
        self.get(name).and_then(|cache| cache.match_request(method, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            headers: HashMap::new(),
            body: body.as_bytes().to_vec(),
            cached_at: 0,
        }
    }

    #[test]
    fn test_cache_key_strips_fragment() {
        let url = Url::parse("https://example.com/menu.html?x=1#top").unwrap();
        assert_eq!(cache_key(&url), "https://example.com/menu.html?x=1");
    }

    #[test]
    fn test_cache_put_overwrites() {
        let mut cache = Cache::new("v1");
        cache.put(entry("https://example.com/app.js", "old"));
        cache.put_all(vec![entry("https://example.com/app.js", "new")]);

        assert_eq!(cache.len(), 1);
        let hit = cache.match_request("GET", "https://example.com/app.js").unwrap();
        assert_eq!(hit.body, b"new");
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new("v1");
        cache.put(entry("https://example.com/styles.css", ""));

        assert!(cache.delete("https://example.com/styles.css"));
        assert!(cache.match_request("GET", "https://example.com/styles.css").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("v1"));

        storage.open("v1").put(entry("https://example.com/", "root"));
        storage.open("v2");
        assert_eq!(storage.keys(), vec!["v1".to_string(), "v2".to_string()]);

        assert!(storage.match_in("v1", "GET", "https://example.com/").is_some());
        assert!(storage.match_in("v2", "GET", "https://example.com/").is_none());
        assert!(storage.match_in("v3", "GET", "https://example.com/").is_none());

        assert!(storage.delete("v1"));
        assert!(!storage.has("v1"));
    }

    #[test]
    fn test_match_requires_same_method() {
        let mut cache = Cache::new("v1");
        cache.put(entry("https://example.com/index.html", "page"));

        assert!(cache.match_request("get", "https://example.com/index.html").is_some());
        assert!(cache.match_request("POST", "https://example.com/index.html").is_none());
        assert!(cache.match_request("DELETE", "https://example.com/index.html").is_none());
    }
}
