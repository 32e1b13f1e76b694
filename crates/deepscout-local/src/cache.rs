use deepscout_core::{Error, PageContent, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub content: PageContent,
    pub fetched_at_ms: u64,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.fetched_at_ms) < ttl.as_millis() as u64
    }
}

/// Optional persistent tier: one JSON file per URL, keyed by sha256.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn key_for(url: &str) -> String {
        let mut h = Sha256::new();
        h.update(b"url:");
        h.update(url.as_bytes());
        hex::encode(h.finalize())
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root
            .join(&key[0..2])
            .join(&key[2..4])
            .join(format!("{key}.json"))
    }

    pub async fn get(&self, url: &str) -> Result<Option<CacheEntry>> {
        let p = self.path(&Self::key_for(url));
        let bytes = match tokio::fs::read(&p).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Cache(e.to_string())),
        };
        let entry = serde_json::from_slice(&bytes).map_err(|e| Error::Cache(e.to_string()))?;
        Ok(Some(entry))
    }

    pub async fn put(&self, url: &str, entry: &CacheEntry) -> Result<()> {
        let p = self.path(&Self::key_for(url));
        if let Some(parent) = p.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Cache(e.to_string()))?;
        }
        let bytes = serde_json::to_vec(entry).map_err(|e| Error::Cache(e.to_string()))?;
        tokio::fs::write(&p, bytes)
            .await
            .map_err(|e| Error::Cache(e.to_string()))
    }

    pub async fn remove(&self, url: &str) -> Result<()> {
        let p = self.path(&Self::key_for(url));
        match tokio::fs::remove_file(&p).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Cache(e.to_string())),
        }
    }
}

/// TTL cache for fetched pages, keyed by URL.
///
/// Expired entries are removed lazily when looked up. Safe to share across tasks.
#[derive(Debug)]
pub struct PageCache {
    enabled: bool,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    disk: Option<DiskCache>,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            enabled: true,
            ttl,
            entries: Mutex::new(HashMap::new()),
            disk: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn with_disk(mut self, disk: DiskCache) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn get(&self, url: &str) -> Option<PageContent> {
        self.get_at(url, now_ms()).await
    }

    pub async fn get_at(&self, url: &str, now_ms: u64) -> Option<PageContent> {
        if !self.enabled {
            return None;
        }
        {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = entries.get(url) {
                if entry.is_fresh(self.ttl, now_ms) {
                    tracing::info!(url, "using cached content");
                    return Some(entry.content.clone());
                }
                tracing::info!(url, "cache expired");
                entries.remove(url);
            }
        }
        self.get_from_disk(url, now_ms).await
    }

    async fn get_from_disk(&self, url: &str, now_ms: u64) -> Option<PageContent> {
        let disk = self.disk.as_ref()?;
        let entry = match disk.get(url).await {
            Ok(Some(e)) => e,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(url, error = %e, "disk cache read failed");
                return None;
            }
        };
        if !entry.is_fresh(self.ttl, now_ms) {
            if let Err(e) = disk.remove(url).await {
                tracing::warn!(url, error = %e, "disk cache eviction failed");
            }
            return None;
        }
        let content = entry.content.clone();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(url.to_string(), entry);
        Some(content)
    }

    /// Store a successful fetch. Empty content is never cached.
    pub async fn put(&self, url: &str, content: &PageContent) {
        self.put_at(url, content, now_ms()).await;
    }

    pub async fn put_at(&self, url: &str, content: &PageContent, fetched_at_ms: u64) {
        if !self.enabled || content.is_empty() {
            return;
        }
        let entry = CacheEntry {
            content: content.clone(),
            fetched_at_ms,
        };
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.put(url, &entry).await {
                tracing::warn!(url, error = %e, "disk cache write failed");
            }
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(url.to_string(), entry);
    }
}
