//! On-disk token cache
//!
//! A single JSON document holds every entry. Token values are sealed with
//! AES-256-GCM before they touch the disk; keys and expiry stay readable so
//! the file can be inspected without the secret.
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "svc::read:write": { "value": "<hex>", "expires_at": "<rfc3339>" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::CacheBackend;
use crate::common::{AppError, AppResult};
use crate::crypto::{self, SealingKey};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Document {
    version: u32,
    entries: BTreeMap<String, StoredEntry>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Encrypted JSON-file cache.
pub struct FileCache {
    path: PathBuf,
    key: SealingKey,
    /// Serialises read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileCache {
    /// Open the cache at `path`. The sealing secret lives next to it with a
    /// `.key` extension and is created on first use.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let key_path = path.with_extension("key");
        let key = crypto::load_or_create_key(&key_path)?;
        Ok(Self::with_key(path, key))
    }

    pub fn with_key(path: impl Into<PathBuf>, key: SealingKey) -> Self {
        Self {
            path: path.into(),
            key,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> AppResult<Document> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => return Err(AppError::cache(format!("Failed to read token cache: {}", e))),
        };

        let doc: Document = match serde_json::from_str(&data) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Ignoring unreadable token cache {:?}: {}", self.path, e);
                return Ok(Document::default());
            }
        };
        if doc.version != FORMAT_VERSION {
            warn!(
                "Ignoring token cache {:?} with unknown version {}",
                self.path, doc.version
            );
            return Ok(Document::default());
        }
        Ok(doc)
    }

    async fn store(&self, doc: &Document) -> AppResult<()> {
        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| AppError::cache(format!("Failed to serialize token cache: {}", e)))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, json.as_bytes()))
            .await
            .map_err(|e| AppError::cache(format!("Token cache writer failed: {}", e)))?
    }
}

/// Write to a uniquely named sibling temp file, then rename over `path`.
/// Concurrent writers each get their own temp file; the last rename wins.
fn write_atomic(path: &Path, contents: &[u8]) -> AppResult<()> {
    use std::io::Write;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| AppError::cache(format!("Failed to create temp cache file: {}", e)))?;
    tmp.write_all(contents)
        .map_err(|e| AppError::cache(format!("Failed to write token cache: {}", e)))?;
    tmp.persist(path)
        .map_err(|e| AppError::cache(format!("Failed to replace token cache: {}", e.error)))?;
    Ok(())
}

#[async_trait]
impl CacheBackend for FileCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;

        let Some(entry) = doc.entries.get(key) else {
            return Ok(None);
        };
        if entry.expires_at <= Utc::now() {
            debug!("Token cache entry {} expired at {}", key, entry.expires_at);
            return Ok(None);
        }

        match crypto::open_hex(&self.key, &entry.value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Unreadable token cache entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &str, lifetime: Duration) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;

        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| AppError::cache("cache lifetime out of range"))?;

        doc.entries.retain(|_, entry| entry.expires_at > now);
        doc.entries.insert(
            key.to_string(),
            StoredEntry {
                value: crypto::seal_hex(&self.key, value)?,
                expires_at,
            },
        );
        self.store(&doc).await
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let removed = doc.entries.remove(key).is_some();
        if removed {
            self.store(&doc).await?;
        }
        Ok(removed)
    }

    async fn clear(&self) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        self.store(&Document::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path().join("tokens.json")).unwrap();

        assert_eq!(cache.get("read").await.unwrap(), None);
        cache.set("read", "ya29.abc", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("read").await.unwrap().as_deref(), Some("ya29.abc"));
    }

    #[tokio::test]
    async fn test_survives_reopen_without_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        {
            let cache = FileCache::open(&path).unwrap();
            cache.set("svc::read", "ya29.secret", Duration::from_secs(60)).await.unwrap();
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("svc::read"));
        assert!(!raw.contains("ya29.secret"));

        let reopened = FileCache::open(&path).unwrap();
        assert_eq!(
            reopened.get("svc::read").await.unwrap().as_deref(),
            Some("ya29.secret")
        );
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path().join("tokens.json")).unwrap();

        cache.set("read", "old", Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("read").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_foreign_key_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let cache = FileCache::open(&path).unwrap();
        cache.set("read", "token", Duration::from_secs(60)).await.unwrap();

        std::fs::remove_file(path.with_extension("key")).unwrap();
        let rekeyed = FileCache::open(&path).unwrap();
        assert_eq!(rekeyed.get("read").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_huge_lifetime_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path().join("tokens.json")).unwrap();

        let err = cache
            .set("read", "token", Duration::from_secs(10_000_000_000_000))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::common::ErrorCode::Cache);
        assert_eq!(cache.get("read").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_garbage_document_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let cache = FileCache::open(&path).unwrap();
        std::fs::write(&path, b"{\"version\": 1, \"entries\": {\"re").unwrap();

        assert_eq!(cache.get("read").await.unwrap(), None);

        cache.set("read", "fresh", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("read").await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_writes_leave_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path().join("tokens.json")).unwrap();
        cache.set("a", "1", Duration::from_secs(60)).await.unwrap();
        cache.set("b", "2", Duration::from_secs(60)).await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["tokens.json", "tokens.key"]);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path().join("tokens.json")).unwrap();

        cache.set("a", "1", Duration::from_secs(60)).await.unwrap();
        cache.set("b", "2", Duration::from_secs(60)).await.unwrap();
        assert!(cache.delete("a").await.unwrap());
        assert_eq!(cache.get("a").await.unwrap(), None);

        cache.clear().await.unwrap();
        assert_eq!(cache.get("b").await.unwrap(), None);
    }
}
