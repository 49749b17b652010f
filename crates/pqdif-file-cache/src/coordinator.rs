//! Orchestration of the persistent and decoded tiers
//!
//! Per key a file moves through `Unknown -> PersistedOnly -> DecodedClean
//! -> DecodedDirty`; `flush` drops back to `PersistedOnly` and `purge` to
//! `Unknown`. Commits encode a snapshot of the records taken when the
//! commit starts, and only clear the dirty flag if no edit was signalled
//! while the commit was in flight.

use crate::client::BlobStoreClient;
use crate::codec::{encode_records, RecordCodec, RecordStream};
use crate::config::FileCacheConfig;
use crate::decoded::{DecodedFile, DecodedFileCache};
use crate::error::{FileCacheError, Result};
use crate::events::{CacheEvent, EventPublisher};
use crate::readiness::{wait_until_ready, HttpReadiness, ReadinessProbe};
use crate::source::{FileSource, NamedBlob};
use pqdif_file_key::FileKey;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A persisted file with its unsaved-changes state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyListEntry {
    pub key: FileKey,
    pub name: String,
    pub has_unsaved_changes: bool,
}

pub struct FileCacheCoordinator<C: RecordCodec> {
    client: BlobStoreClient,
    codec: C,
    readiness: Arc<dyn ReadinessProbe>,
    config: FileCacheConfig,
    decoded: Mutex<DecodedFileCache<C::Record>>,
    events: EventPublisher,
}

impl<C: RecordCodec> FileCacheCoordinator<C> {
    /// Coordinator talking to `config.base_url`, gated on its /health
    pub fn new(config: FileCacheConfig, codec: C) -> Self {
        let client = BlobStoreClient::new(&config.base_url);
        let readiness = Arc::new(HttpReadiness::new(client.clone(), config.ready_poll_interval));
        Self::with_parts(client, codec, readiness, config)
    }

    pub fn with_parts(
        client: BlobStoreClient,
        codec: C,
        readiness: Arc<dyn ReadinessProbe>,
        config: FileCacheConfig,
    ) -> Self {
        let events = EventPublisher::new();
        Self {
            client,
            codec,
            readiness,
            config,
            decoded: Mutex::new(DecodedFileCache::new(events.clone())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &FileCacheConfig {
        &self.config
    }

    /// Never held across an `.await`
    fn decoded(&self) -> MutexGuard<'_, DecodedFileCache<C::Record>> {
        self.decoded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn ready(&self, cancel: &CancellationToken) -> Result<()> {
        wait_until_ready(self.readiness.as_ref(), self.config.ready_timeout, cancel).await
    }

    /// Persisted files, overlaid with unsaved-changes state
    ///
    /// Order is whatever the persistent tier enumerates.
    pub async fn list_keys(&self, cancel: &CancellationToken) -> Result<Vec<KeyListEntry>> {
        self.ready(cancel).await?;
        let entries = self.client.list(cancel).await?;

        let decoded = self.decoded();
        Ok(entries
            .into_iter()
            .map(|entry| KeyListEntry {
                has_unsaved_changes: decoded.is_dirty(&entry.key),
                key: entry.key,
                name: entry.name,
            })
            .collect())
    }

    /// [`list_keys`](Self::list_keys) ordered by display name
    pub async fn list_keys_sorted(&self, cancel: &CancellationToken) -> Result<Vec<KeyListEntry>> {
        let mut entries = self.list_keys(cancel).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.key.cmp(&b.key)));
        Ok(entries)
    }

    /// Keys that currently have decoded state
    pub fn cached_keys(&self) -> Vec<FileKey> {
        self.decoded().keys()
    }

    /// Decoded file for `key`, decoding it on first access
    ///
    /// Returns `None` when the persistent tier does not have the key. A
    /// cached file is returned as is, even if the blob changed since.
    pub async fn retrieve(
        &self,
        key: &FileKey,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<DecodedFile<C::Record>>>> {
        self.ready(cancel).await?;

        if let Some(file) = self.decoded().get(key) {
            return Ok(Some(file));
        }

        let Some(data) = self.client.fetch(key, cancel).await? else {
            return Ok(None);
        };
        let name = key.name()?;

        let stream =
            RecordStream::open(&self.codec, data, self.config.yield_strategy, cancel.clone())?;
        let records = stream.collect().await?;
        debug!(key = %key, records = records.len(), "Decoded PQDIF file");

        let mut decoded = self.decoded();
        // A concurrent retrieve may have won while we were decoding
        if let Some(existing) = decoded.get(key) {
            return Ok(Some(existing));
        }

        let file = Arc::new(DecodedFile::new(key.clone(), name, records));
        decoded.put(file.clone());
        Ok(Some(file))
    }

    /// Upload the files a byte source yields
    pub async fn save(
        &self,
        source: &dyn FileSource,
        cancel: &CancellationToken,
    ) -> Result<Vec<KeyListEntry>> {
        self.ready(cancel).await?;

        let files = source.read_files().await?;
        let entries = self.client.store(files, None, cancel).await?;
        info!(count = entries.len(), "Saved PQDIF files");

        self.events.publish(CacheEvent::Saved {
            entries: entries.clone(),
        });

        Ok(entries
            .into_iter()
            .map(|entry| KeyListEntry {
                key: entry.key,
                name: entry.name,
                has_unsaved_changes: false,
            })
            .collect())
    }

    /// Remove `key` from both tiers
    ///
    /// Returns whether the persistent tier held it; an absent key is not an
    /// error. Only a real removal notifies.
    pub async fn purge(&self, key: &FileKey, cancel: &CancellationToken) -> Result<bool> {
        self.ready(cancel).await?;

        let removed = self.client.delete(key, cancel).await?;
        self.decoded().remove(key);

        if removed {
            info!(key = %key, "Purged PQDIF file");
            self.events.publish(CacheEvent::Purged { key: key.clone() });
        }
        Ok(removed)
    }

    /// Drop decoded state for `key`, keeping the persisted blob
    ///
    /// Always notifies, whether or not anything was decoded.
    pub fn flush(&self, key: &FileKey) {
        let removed = self.decoded().remove(key);
        debug!(key = %key, removed, "Flushed decoded PQDIF file");
        self.events.publish(CacheEvent::Flushed { key: key.clone() });
    }

    /// Signal that a decoded file's records were changed
    pub fn mark_dirty(&self, key: &FileKey) -> Result<()> {
        if self.decoded().mark_dirty(key) {
            Ok(())
        } else {
            Err(FileCacheError::NotFound(key.clone()))
        }
    }

    /// Apply an edit to a decoded file's records and mark it dirty
    pub fn edit<T, F>(&self, key: &FileKey, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<C::Record>) -> T,
    {
        let file = self
            .decoded()
            .get(key)
            .ok_or_else(|| FileCacheError::NotFound(key.clone()))?;

        let result = f(&mut *file.records_mut());
        self.mark_dirty(key)?;
        Ok(result)
    }

    /// Re-encode the decoded records of `key` and overwrite its blob
    ///
    /// A key without decoded state is a no-op. Cancellation before the
    /// upload completes leaves the dirty flag set.
    pub async fn commit_edits(&self, key: &FileKey, cancel: &CancellationToken) -> Result<()> {
        let Some(file) = self.decoded().get(key) else {
            debug!(key = %key, "Nothing decoded to commit");
            return Ok(());
        };

        self.ready(cancel).await?;
        if cancel.is_cancelled() {
            return Err(FileCacheError::Cancelled);
        }

        let (records, revision) = file.snapshot();
        let data = encode_records(&self.codec, &records, self.config.yield_strategy, cancel).await?;
        let size = data.len();

        self.client
            .store(
                vec![NamedBlob::new(file.name(), data)],
                Some(key),
                cancel,
            )
            .await?;

        self.decoded().clear_dirty_at(key, Some(revision));
        info!(key = %key, records = records.len(), size, "Committed PQDIF edits");
        self.events.publish(CacheEvent::Committed { key: key.clone() });
        Ok(())
    }
}
