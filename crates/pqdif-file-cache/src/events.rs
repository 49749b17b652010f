//! Change notifications published by the coordinator

use pqdif_file_key::{FileKey, KeyEntry};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Something in the cache changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// New files landed in the persistent tier
    Saved { entries: Vec<KeyEntry> },
    /// A decoded file gained or lost unsaved changes
    DirtyChanged { key: FileKey, dirty: bool },
    /// Edits were written back to the persistent tier
    Committed { key: FileKey },
    /// Decoded state was dropped; the persisted blob remains
    Flushed { key: FileKey },
    /// A file was removed from the persistent tier
    Purged { key: FileKey },
}

impl CacheEvent {
    /// Key the event is about, if it concerns a single file
    pub fn key(&self) -> Option<&FileKey> {
        match self {
            CacheEvent::Saved { .. } => None,
            CacheEvent::DirtyChanged { key, .. }
            | CacheEvent::Committed { key }
            | CacheEvent::Flushed { key }
            | CacheEvent::Purged { key } => Some(key),
        }
    }
}

/// Sending half shared by everything that publishes cache events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<CacheEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers; having none is fine
    pub fn publish(&self, event: CacheEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
