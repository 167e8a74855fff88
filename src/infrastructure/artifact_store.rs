use crate::domain::cache_key::{ArtifactCacheEntry, ArtifactNamespace, CacheKey};
use crate::domain::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

fn io_err(msg: impl Into<String>) -> AppError {
    AppError::IoError(msg.into())
}

/// Keyed artifact storage fronting every generation stage.
///
/// Backends never evict. `put` replaces any previous entry for the key.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<ArtifactCacheEntry>>;
    async fn put(&self, key: &CacheKey, payload: serde_json::Value) -> Result<ArtifactCacheEntry>;
}

pub(crate) fn new_entry(key: &CacheKey, payload: serde_json::Value) -> ArtifactCacheEntry {
    ArtifactCacheEntry {
        key: key.to_string(),
        namespace: key.namespace(),
        payload,
        created_at: chrono::Utc::now(),
    }
}

/// Reject an entry that was stored under a different key.
pub(crate) fn verify_entry(key: &CacheKey, entry: ArtifactCacheEntry) -> Result<ArtifactCacheEntry> {
    let expected = key.to_string();
    if entry.key != expected || entry.namespace != key.namespace() {
        return Err(AppError::CacheCorruption(format!(
            "entry for {} holds key {}",
            expected, entry.key
        )));
    }
    Ok(entry)
}

#[derive(Default)]
pub struct MemoryArtifactCache {
    entries: RwLock<HashMap<String, ArtifactCacheEntry>>,
}

impl MemoryArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn count_in(&self, namespace: ArtifactNamespace) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.namespace == namespace)
            .count()
    }
}

#[async_trait]
impl ArtifactCache for MemoryArtifactCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<ArtifactCacheEntry>> {
        Ok(self.entries.read().await.get(&key.to_string()).cloned())
    }

    async fn put(&self, key: &CacheKey, payload: serde_json::Value) -> Result<ArtifactCacheEntry> {
        let entry = new_entry(key, payload);
        self.entries
            .write()
            .await
            .insert(entry.key.clone(), entry.clone());
        Ok(entry)
    }
}

/// One JSON document per key under `<root>/<namespace>/<sha256(key)>.json`.
#[derive(Debug, Clone)]
pub struct FileArtifactCache {
    root: PathBuf,
}

impl FileArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn ensure(&self) -> Result<()> {
        for namespace in ArtifactNamespace::ALL {
            ensure_dir(&self.root.join(namespace.as_str()))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(key.namespace().as_str())
            .join(format!("{}.json", key.digest()))
    }
}

#[async_trait]
impl ArtifactCache for FileArtifactCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<ArtifactCacheEntry>> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AppError::CacheCorruption(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        let entry = serde_json::from_slice::<ArtifactCacheEntry>(&bytes).map_err(|err| {
            AppError::CacheCorruption(format!("unreadable entry {}: {err}", path.display()))
        })?;
        verify_entry(key, entry).map(Some)
    }

    async fn put(&self, key: &CacheKey, payload: serde_json::Value) -> Result<ArtifactCacheEntry> {
        let entry = new_entry(key, payload);
        let bytes = serde_json::to_vec_pretty(&entry)
            .map_err(|e| AppError::Internal(format!("Failed to encode cache entry: {e}")))?;
        let path = self.entry_path(key);
        tokio::task::spawn_blocking(move || atomic_write_bytes(&path, &bytes))
            .await
            .map_err(|e| AppError::Internal(format!("Cache write task failed: {e}")))??;
        Ok(entry)
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| io_err(format!("Failed to create dir {}: {e}", path.display())))?;
    Ok(())
}

/// Write through a temp file and rename so readers never see a partial entry.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let tmp_path = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
    {
        let mut file = fs::File::create(&tmp_path).map_err(|e| {
            io_err(format!(
                "Failed to create temp file {}: {e}",
                tmp_path.display()
            ))
        })?;
        file.write_all(bytes).map_err(|e| {
            io_err(format!(
                "Failed to write temp file {}: {e}",
                tmp_path.display()
            ))
        })?;
        file.sync_all().ok();
    }

    // Rename cannot replace an existing file on Windows; move the old one aside first.
    if path.exists() {
        let backup = path.with_extension(format!("bak-{}", Uuid::new_v4()));
        fs::rename(path, &backup).map_err(|e| {
            io_err(format!(
                "Failed to move existing file {} to {}: {e}",
                path.display(),
                backup.display()
            ))
        })?;
        fs::rename(&tmp_path, path).map_err(|e| {
            io_err(format!(
                "Failed to rename temp file {} to {}: {e}",
                tmp_path.display(),
                path.display()
            ))
        })?;
        let _ = fs::remove_file(&backup);
    } else {
        fs::rename(&tmp_path, path).map_err(|e| {
            io_err(format!(
                "Failed to rename temp file {} to {}: {e}",
                tmp_path.display(),
                path.display()
            ))
        })?;
    }
    Ok(())
}
