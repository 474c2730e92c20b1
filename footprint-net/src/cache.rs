//! Response cache
//!
//! Avoids refetching unchanged content within a TTL window. Two layers:
//! - memory: `DashMap` keyed by request URL
//! - disk (optional): content-addressed by SHA-256 of the URL, one `.meta`
//!   JSON file plus one `.body` file per entry. Both are renamed into place
//!   from temp files, and the meta carries the body digest so a meta never
//!   serves a body from a different write.
//!
//! Writes are best-effort. `set_async` returns immediately; disk writes run on
//! the tokio runtime and failures are logged, never surfaced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A cached HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub body: Vec<u8>,
    pub etag: String,
    pub headers: BTreeMap<String, String>,
}

impl CachedResponse {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            etag: String::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = etag.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }
}

/// Cache contract consumed by the fetch path
#[async_trait]
pub trait HttpCache: Send + Sync {
    /// Look up a URL. A miss (or an expired entry) is `None`, never an error.
    async fn get(&self, url: &str) -> Option<CachedResponse>;

    /// Store with the cache's default TTL. Returns immediately.
    fn set_async(&self, url: &str, response: CachedResponse);

    /// Store with an explicit TTL. Returns immediately.
    fn set_async_with_ttl(&self, url: &str, response: CachedResponse, ttl: Duration);
}

/// Thread-safe reference to a cache
pub type SharedCache = Arc<dyn HttpCache>;

/// Disk persistence failures (logged only)
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskMeta {
    url: String,
    etag: String,
    headers: BTreeMap<String, String>,
    expires_at: DateTime<Utc>,
    /// SHA-256 of the matching `.body` file
    #[serde(default)]
    body_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Content address of a URL
pub fn cache_key(url: &str) -> String {
    sha256_hex(url.as_bytes())
}

/// Write to a uniquely named sibling, then rename over `path`
async fn replace_file(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{:016x}.tmp", rand::random::<u64>()));
    let tmp = PathBuf::from(tmp);

    if let Err(e) = tokio::fs::write(&tmp, contents).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// TTLs are capped at ten years
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl.min(MAX_TTL)).unwrap_or_else(|_| chrono::Duration::days(3650));
    Utc::now() + ttl
}

/// Two-layer TTL cache
pub struct ResponseCache {
    memory: DashMap<String, CacheEntry>,
    dir: Option<PathBuf>,
    default_ttl: Duration,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl ResponseCache {
    /// Memory-only cache
    pub fn in_memory(default_ttl: Duration) -> Self {
        Self {
            memory: DashMap::new(),
            dir: None,
            default_ttl,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Cache persisted under `dir` (created if missing)
    pub fn with_dir<P: AsRef<Path>>(dir: P, default_ttl: Duration) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: Some(dir.as_ref().to_path_buf()),
            ..Self::in_memory(default_ttl)
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Entries in the memory layer
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Drop expired memory entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.memory.len();
        self.memory.retain(|_, entry| !entry.is_expired(now));
        before - self.memory.len()
    }

    /// Wait for in-flight disk writes. Only needed before reading the same
    /// directory from another cache instance.
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Cache write task failed: {}", e);
            }
        }
    }

    fn paths(dir: &Path, url: &str) -> (PathBuf, PathBuf) {
        let key = cache_key(url);
        (
            dir.join(format!("{}.meta", key)),
            dir.join(format!("{}.body", key)),
        )
    }

    async fn read_disk(dir: &Path, url: &str) -> Result<Option<CacheEntry>, CacheError> {
        let (meta_path, body_path) = Self::paths(dir, url);

        let meta_raw = match tokio::fs::read(&meta_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: DiskMeta = serde_json::from_slice(&meta_raw)?;

        // Hash collisions are not expected, but never serve another URL's body
        if meta.url != url {
            return Ok(None);
        }

        if Utc::now() >= meta.expires_at {
            let _ = tokio::fs::remove_file(&meta_path).await;
            let _ = tokio::fs::remove_file(&body_path).await;
            return Ok(None);
        }

        let body = match tokio::fs::read(&body_path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if sha256_hex(&body) != meta.body_sha256 {
            debug!("Cache body for {} does not match its meta", url);
            return Ok(None);
        }

        Ok(Some(CacheEntry {
            response: CachedResponse {
                body,
                etag: meta.etag,
                headers: meta.headers,
            },
            expires_at: meta.expires_at,
        }))
    }

    async fn write_disk(dir: PathBuf, url: String, entry: CacheEntry) -> Result<(), CacheError> {
        let (meta_path, body_path) = Self::paths(&dir, &url);
        let meta = DiskMeta {
            url,
            etag: entry.response.etag,
            headers: entry.response.headers,
            expires_at: entry.expires_at,
            body_sha256: sha256_hex(&entry.response.body),
        };

        replace_file(&body_path, &entry.response.body).await?;
        replace_file(&meta_path, &serde_json::to_vec(&meta)?).await?;
        Ok(())
    }

    fn spawn_disk_write(&self, url: &str, entry: CacheEntry) {
        let Some(dir) = self.dir.clone() else {
            return;
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime; skipping disk cache write for {}", url);
                return;
            }
        };

        let url = url.to_string();
        let task = handle.spawn(async move {
            let label = url.clone();
            if let Err(e) = Self::write_disk(dir, url, entry).await {
                warn!("Cache write for {} failed: {}", label, e);
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(task);
    }
}

#[async_trait]
impl HttpCache for ResponseCache {
    async fn get(&self, url: &str) -> Option<CachedResponse> {
        let now = Utc::now();

        if let Some(entry) = self.memory.get(url).map(|e| e.clone()) {
            if !entry.is_expired(now) {
                debug!("Cache hit (memory): {}", url);
                return Some(entry.response);
            }
            self.memory.remove(url);
        }

        let dir = self.dir.as_ref()?;
        match Self::read_disk(dir, url).await {
            Ok(Some(entry)) => {
                debug!("Cache hit (disk): {}", url);
                let response = entry.response.clone();
                self.memory.insert(url.to_string(), entry);
                Some(response)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read for {} failed: {}", url, e);
                None
            }
        }
    }

    fn set_async(&self, url: &str, response: CachedResponse) {
        self.set_async_with_ttl(url, response, self.default_ttl);
    }

    fn set_async_with_ttl(&self, url: &str, response: CachedResponse, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let entry = CacheEntry {
            response,
            expires_at: expiry_after(ttl),
        };
        self.memory.insert(url.to_string(), entry.clone());
        self.spawn_disk_write(url, entry);
    }
}

/// Cache that never stores anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl HttpCache for NoCache {
    async fn get(&self, _url: &str) -> Option<CachedResponse> {
        None
    }

    fn set_async(&self, _url: &str, _response: CachedResponse) {}

    fn set_async_with_ttl(&self, _url: &str, _response: CachedResponse, _ttl: Duration) {}
}
