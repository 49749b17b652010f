//! In-memory tier: decoded files by key
//!
//! Entries live until purged or flushed; there is no eviction. The map is
//! only touched between suspension points, so callers wrap it in a plain
//! mutex that is never held across an `.await`.

use crate::events::{CacheEvent, EventPublisher};
use pqdif_file_key::FileKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A fully decoded file shared with editors
#[derive(Debug)]
pub struct DecodedFile<R> {
    key: FileKey,
    name: String,
    records: RwLock<Vec<R>>,
    dirty: AtomicBool,
    /// Bumped on every mutation signal
    revision: AtomicU64,
}

impl<R: Clone> DecodedFile<R> {
    pub fn new(key: FileKey, name: String, records: Vec<R>) -> Self {
        Self {
            key,
            name,
            records: RwLock::new(records),
            dirty: AtomicBool::new(false),
            revision: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &FileKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> RwLockReadGuard<'_, Vec<R>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutable access for editors; signal the change with `mark_dirty`
    pub fn records_mut(&self) -> RwLockWriteGuard<'_, Vec<R>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current records together with the revision they belong to
    pub fn snapshot(&self) -> (Vec<R>, u64) {
        let records = self.records();
        (records.clone(), self.revision.load(Ordering::Acquire))
    }

    fn set_dirty(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
        self.dirty.store(true, Ordering::Release);
    }

    /// Clear the flag unless a newer mutation arrived after `revision`
    fn clear_dirty(&self, revision: Option<u64>) -> bool {
        match revision {
            Some(seen) if self.revision.load(Ordering::Acquire) != seen => false,
            _ => {
                self.dirty.store(false, Ordering::Release);
                true
            }
        }
    }
}

/// Decoded files by key
pub struct DecodedFileCache<R> {
    files: HashMap<FileKey, Arc<DecodedFile<R>>>,
    events: EventPublisher,
}

impl<R: Clone> DecodedFileCache<R> {
    pub fn new(events: EventPublisher) -> Self {
        Self {
            files: HashMap::new(),
            events,
        }
    }

    pub fn get(&self, key: &FileKey) -> Option<Arc<DecodedFile<R>>> {
        self.files.get(key).cloned()
    }

    /// Insert or replace by key
    pub fn put(&mut self, file: Arc<DecodedFile<R>>) {
        self.files.insert(file.key().clone(), file);
    }

    pub fn remove(&mut self, key: &FileKey) -> bool {
        self.files.remove(key).is_some()
    }

    pub fn contains(&self, key: &FileKey) -> bool {
        self.files.contains_key(key)
    }

    pub fn is_dirty(&self, key: &FileKey) -> bool {
        self.files.get(key).is_some_and(|file| file.is_dirty())
    }

    pub fn keys(&self) -> Vec<FileKey> {
        self.files.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Flag unsaved changes and notify; `false` if the key is not decoded
    pub fn mark_dirty(&self, key: &FileKey) -> bool {
        let Some(file) = self.files.get(key) else {
            return false;
        };

        file.set_dirty();
        self.events.publish(CacheEvent::DirtyChanged {
            key: key.clone(),
            dirty: true,
        });
        true
    }

    /// Clear unsaved changes and notify; `false` if the key is not decoded
    pub fn clear_dirty(&self, key: &FileKey) -> bool {
        self.clear_dirty_at(key, None)
    }

    /// Clear unsaved changes only if nothing was marked since `revision`
    pub fn clear_dirty_at(&self, key: &FileKey, revision: Option<u64>) -> bool {
        let Some(file) = self.files.get(key) else {
            return false;
        };

        if !file.clear_dirty(revision) {
            return false;
        }

        self.events.publish(CacheEvent::DirtyChanged {
            key: key.clone(),
            dirty: false,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, records: Vec<u32>) -> Arc<DecodedFile<u32>> {
        let key = pqdif_file_key::generate(name);
        Arc::new(DecodedFile::new(key, name.to_string(), records))
    }

    #[test]
    fn test_put_get_remove() {
        let mut cache = DecodedFileCache::new(EventPublisher::new());
        let f = file("a.pqd", vec![1, 2, 3]);
        let key = f.key().clone();

        assert!(cache.get(&key).is_none());
        cache.put(f);
        assert_eq!(cache.get(&key).unwrap().len(), 3);
        assert_eq!(cache.len(), 1);

        assert!(cache.remove(&key));
        assert!(!cache.remove(&key));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let mut cache = DecodedFileCache::new(EventPublisher::new());
        let f = file("a.pqd", vec![1]);
        let key = f.key().clone();
        cache.put(f);
        cache.put(Arc::new(DecodedFile::new(key.clone(), "a.pqd".to_string(), vec![9, 9])));
        assert_eq!(*cache.get(&key).unwrap().records(), vec![9, 9]);
    }

    #[tokio::test]
    async fn test_dirty_flag_notifies() {
        let events = EventPublisher::new();
        let mut rx = events.subscribe();
        let mut cache = DecodedFileCache::new(events);
        let f = file("a.pqd", vec![1]);
        let key = f.key().clone();
        cache.put(f);

        assert!(cache.mark_dirty(&key));
        assert!(cache.is_dirty(&key));
        assert_eq!(
            rx.recv().await.unwrap(),
            CacheEvent::DirtyChanged {
                key: key.clone(),
                dirty: true
            }
        );

        assert!(cache.clear_dirty(&key));
        assert!(!cache.is_dirty(&key));
        assert_eq!(
            rx.recv().await.unwrap(),
            CacheEvent::DirtyChanged { key, dirty: false }
        );
    }

    #[test]
    fn test_dirty_on_unknown_key() {
        let cache: DecodedFileCache<u32> = DecodedFileCache::new(EventPublisher::new());
        let key = pqdif_file_key::generate("x.pqd");
        assert!(!cache.mark_dirty(&key));
        assert!(!cache.clear_dirty(&key));
    }

    #[test]
    fn test_clear_dirty_at_stale_revision() {
        let mut cache = DecodedFileCache::new(EventPublisher::new());
        let f = file("a.pqd", vec![1]);
        let key = f.key().clone();
        cache.put(f.clone());

        cache.mark_dirty(&key);
        let (_, revision) = f.snapshot();

        // An edit lands after the snapshot was taken
        f.records_mut().push(2);
        cache.mark_dirty(&key);

        assert!(!cache.clear_dirty_at(&key, Some(revision)));
        assert!(f.is_dirty());

        let (_, latest) = f.snapshot();
        assert!(cache.clear_dirty_at(&key, Some(latest)));
        assert!(!f.is_dirty());
    }
}
