//! Directory-backed blob storage with an in-memory key index
//!
//! Every blob lives in `<sha256(key)>.blob` next to a `<sha256(key)>.json`
//! sidecar describing it. The sidecars are the source of truth for which
//! keys exist, so the index can be rebuilt after a restart.

use crate::error::{BlobStoreError, Result};
use crate::types::{BlobEntry, BlobStats};
use chrono::Utc;
use pqdif_file_key::{FileKey, KeyEntry, DEFAULT_MAX_ATTEMPTS};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

const BLOB_EXT: &str = "blob";
const META_EXT: &str = "json";

/// Persistent blob store
pub struct BlobStore {
    /// Metadata of every persisted blob, by key
    entries: RwLock<HashMap<FileKey, BlobEntry>>,
    dir: PathBuf,
    ready: AtomicBool,
    current_size: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlobStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dir,
            ready: AtomicBool::new(false),
            current_size: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create the store directory, rebuild the index and mark the store ready
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let mut loaded = HashMap::new();
        let mut total = 0u64;
        let mut dir = fs::read_dir(&self.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }

            match load_sidecar(&path).await {
                Some(entry) if fs::metadata(self.blob_path(&entry.key)).await.is_ok() => {
                    total += entry.size;
                    loaded.insert(entry.key.clone(), entry);
                }
                Some(entry) => {
                    warn!(key = %entry.key, "Sidecar without blob, skipping");
                }
                None => {
                    warn!(path = ?path, "Unreadable sidecar, skipping");
                }
            }
        }

        let count = loaded.len();
        *self.entries.write().await = loaded;
        self.current_size.store(total, Ordering::Relaxed);
        self.ready.store(true, Ordering::Release);

        info!(dir = ?self.dir, entries = count, "Blob store initialized");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// On-disk file stem for a key
    pub fn file_stem(key: &FileKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn blob_path(&self, key: &FileKey) -> PathBuf {
        self.dir.join(format!("{}.{}", Self::file_stem(key), BLOB_EXT))
    }

    fn meta_path(&self, key: &FileKey) -> PathBuf {
        self.dir.join(format!("{}.{}", Self::file_stem(key), META_EXT))
    }

    /// All persisted blobs in the order they were first stored
    pub async fn list(&self) -> Vec<KeyEntry> {
        let entries = self.entries.read().await;
        let mut listed: Vec<&BlobEntry> = entries.values().collect();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));

        listed
            .into_iter()
            .map(|e| KeyEntry {
                key: e.key.clone(),
                name: e.name.clone(),
            })
            .collect()
    }

    pub async fn contains(&self, key: &FileKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Read a blob and its metadata; `None` if the key is not stored
    ///
    /// A failed read is surfaced and leaves the entry in place.
    pub async fn get(&self, key: &FileKey) -> Result<Option<(BlobEntry, Vec<u8>)>> {
        let entry = {
            let entries = self.entries.read().await;
            entries.get(key).cloned()
        };

        let Some(entry) = entry else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        match fs::read(self.blob_path(key)).await {
            Ok(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, size = data.len(), "Blob hit");
                Ok(Some((entry, data)))
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to read blob");
                Err(e.into())
            }
        }
    }

    /// Store a blob under a freshly generated key
    ///
    /// Candidates are regenerated until one is not already in the index.
    /// The index stays write-locked from key generation until the blob is
    /// on disk, so two concurrent uploads cannot claim the same key.
    pub async fn insert_new(
        &self,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<KeyEntry> {
        let mut entries = self.entries.write().await;
        let key = pqdif_file_key::generate_unique(name, DEFAULT_MAX_ATTEMPTS, |candidate| {
            entries.contains_key(candidate)
        })?;

        let entry = BlobEntry {
            key: key.clone(),
            name: name.to_string(),
            content_type: content_type.to_string(),
            size: data.len() as u64,
            created_at: Utc::now(),
        };
        self.persist(&entry, data).await?;

        self.current_size.fetch_add(entry.size, Ordering::Relaxed);
        entries.insert(key.clone(), entry);
        debug!(key = %key, name, size = data.len(), "Stored new blob");

        Ok(KeyEntry {
            key,
            name: name.to_string(),
        })
    }

    /// Store a blob under an explicit key, replacing whatever was there
    pub async fn overwrite(
        &self,
        key: &FileKey,
        content_type: &str,
        data: &[u8],
    ) -> Result<KeyEntry> {
        let name = key.name()?;
        let mut entries = self.entries.write().await;

        let created_at = entries
            .get(key)
            .map(|existing| existing.created_at)
            .unwrap_or_else(Utc::now);
        let entry = BlobEntry {
            key: key.clone(),
            name: name.clone(),
            content_type: content_type.to_string(),
            size: data.len() as u64,
            created_at,
        };
        self.persist(&entry, data).await?;

        if let Some(previous) = entries.insert(key.clone(), entry) {
            self.current_size.fetch_sub(previous.size, Ordering::Relaxed);
        }
        self.current_size.fetch_add(data.len() as u64, Ordering::Relaxed);
        debug!(key = %key, size = data.len(), "Overwrote blob");

        Ok(KeyEntry {
            key: key.clone(),
            name,
        })
    }

    /// Write blob then sidecar, each through a temp file and a rename
    async fn persist(&self, entry: &BlobEntry, data: &[u8]) -> Result<()> {
        let meta = serde_json::to_vec(entry)
            .map_err(|e| BlobStoreError::Io(Box::new(std::io::Error::other(e))))?;

        replace_file(&self.blob_path(&entry.key), data).await?;
        replace_file(&self.meta_path(&entry.key), &meta).await?;
        Ok(())
    }

    /// Remove a blob; `false` if the key was not stored
    pub async fn remove(&self, key: &FileKey) -> Result<bool> {
        let entry = {
            let mut entries = self.entries.write().await;
            entries.remove(key)
        };

        let Some(entry) = entry else {
            return Ok(false);
        };

        self.current_size.fetch_sub(entry.size, Ordering::Relaxed);

        // Sidecar first: a blob without a sidecar is invisible after restart
        remove_if_exists(&self.meta_path(key)).await?;
        remove_if_exists(&self.blob_path(key)).await?;
        debug!(key = %key, "Removed blob");
        Ok(true)
    }

    pub async fn stats(&self) -> BlobStats {
        let entries = self.entries.read().await;
        BlobStats {
            entries: entries.len(),
            total_size: self.current_size.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

async fn load_sidecar(path: &Path) -> Option<BlobEntry> {
    let raw = fs::read(path).await.ok()?;
    let entry: BlobEntry = serde_json::from_slice(&raw).ok()?;
    // Keys that no longer decode are foreign to this store
    entry.key.decode().ok()?;
    Some(entry)
}

async fn replace_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
