//! Cache generations and the storage that holds them.

use async_trait::async_trait;
use bytes::Bytes;
use folio_net::{Request, Response};
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use url::Url;

use crate::WorkerError;

// ==================== Keys ====================

/// Identity of a cached request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: Url,
}

impl RequestKey {
    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }

    /// Key for the given request.
    pub fn from_request(request: &Request) -> Self {
        Self::new(&request.method, &request.url)
    }

    fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url,
        }
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

// ==================== Entries ====================

/// A captured response, stored whole and replaced whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request that produced the response.
    pub key: RequestKey,

    /// Response status.
    pub status: u16,

    /// Response status text.
    pub status_text: String,

    /// Response headers in received order, values kept as raw bytes.
    pub headers: Vec<CachedHeader>,

    #[serde(with = "bytes_base64")]
    pub body: Bytes,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Capture a response.
    pub fn from_response(key: RequestKey, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| CachedHeader {
                name: name.as_str().to_string(),
                value: Bytes::copy_from_slice(value.as_bytes()),
            })
            .collect();

        Self {
            key,
            status: response.status.as_u16(),
            status_text: response.status_text().to_string(),
            headers,
            body: response.body.clone(),
            cached_at: crate::now_millis(),
        }
    }

    /// Rebuild a response from the captured parts.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            match (
                HeaderName::from_bytes(header.name.as_bytes()),
                HeaderValue::from_bytes(&header.value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!(header = %header.name, key = %self.key, "Unreadable cached header skipped"),
            }
        }

        Response {
            url: self.key.url.clone(),
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: self.body.clone(),
        }
    }
}

/// One stored header. Values may hold obs-text bytes that are not UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedHeader {
    pub name: String,
    #[serde(with = "bytes_base64")]
    pub value: Bytes,
}

mod bytes_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

// ==================== Cache ====================

/// One cache generation.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    /// Generation name (the version string).
    pub name: String,

    entries: HashMap<RequestKey, CacheEntry>,
}

impl Cache {
    /// Create an empty generation.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, key: &RequestKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry, replacing any previous one for the same key.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    /// All entries.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Backend ====================

/// Storage holding named cache generations.
///
/// Every method may fail; the worker treats failures as best effort.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Create the named generation if it does not exist.
    async fn open(&self, name: &str) -> Result<(), WorkerError>;

    /// Look up a key in one generation.
    async fn match_request(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<CacheEntry>, WorkerError>;

    /// Store an entry in one generation, creating it if needed.
    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), WorkerError>;

    /// Names of all generations.
    async fn keys(&self) -> Result<Vec<String>, WorkerError>;

    /// Delete a whole generation. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, WorkerError>;

    /// Number of entries in one generation, zero if absent.
    async fn len(&self, name: &str) -> Result<usize, WorkerError>;
}

/// In-process cache storage.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
}

impl MemoryCacheStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build storage from already populated generations.
    pub fn with_caches(caches: impl IntoIterator<Item = Cache>) -> Self {
        Self {
            caches: RwLock::new(
                caches
                    .into_iter()
                    .map(|cache| (cache.name.clone(), cache))
                    .collect(),
            ),
        }
    }

    /// Copy of every generation, sorted by name.
    pub async fn caches(&self) -> Vec<Cache> {
        let mut caches: Vec<Cache> = self.caches.read().await.values().cloned().collect();
        caches.sort_by(|a, b| a.name.cmp(&b.name));
        caches
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), WorkerError> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        Ok(())
    }

    async fn match_request(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<CacheEntry>, WorkerError> {
        Ok(self
            .caches
            .read()
            .await
            .get(name)
            .and_then(|cache| cache.match_request(key))
            .cloned())
    }

    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), WorkerError> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
            .put(entry);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, WorkerError> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, WorkerError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn len(&self, name: &str) -> Result<usize, WorkerError> {
        Ok(self
            .caches
            .read()
            .await
            .get(name)
            .map(Cache::len)
            .unwrap_or(0))
    }
}
