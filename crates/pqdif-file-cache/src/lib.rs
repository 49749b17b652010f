//! PQDIF File Cache
//!
//! Client side of the two-tier PQDIF cache. Raw files persist in a blob
//! store reached over HTTP; decoded records are kept in memory per key,
//! edited in place, and committed back by re-encoding them.
//!
//! ```no_run
//! use pqdif_file_cache::{FileCacheConfig, FileCacheCoordinator, FramedCodec};
//! use pqdif_file_cache::CancellationToken;
//!
//! # async fn run() -> pqdif_file_cache::Result<()> {
//! let cache = FileCacheCoordinator::new(FileCacheConfig::from_env(), FramedCodec);
//! for entry in cache.list_keys(&CancellationToken::new()).await? {
//!     println!("{} {}", entry.name, entry.has_unsaved_changes);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod decoded;
pub mod error;
pub mod events;
pub mod readiness;
pub mod source;

pub use client::BlobStoreClient;
pub use codec::{
    encode_records, CodecError, CompressionAlgorithm, CompressionSettings, CompressionStyle,
    FramedCodec, FramedRecord, RecordCodec, RecordKind, RecordParser, RecordStream, RecordWriter,
};
pub use config::{FileCacheConfig, YieldStrategy};
pub use coordinator::{FileCacheCoordinator, KeyListEntry};
pub use decoded::{DecodedFile, DecodedFileCache};
pub use error::{FileCacheError, Result};
pub use events::{CacheEvent, EventPublisher};
pub use pqdif_file_key::{FileKey, KeyEntry};
pub use readiness::{wait_until_ready, HttpReadiness, ReadinessProbe, ReadySignal};
pub use source::{FileSource, NamedBlob, NamedBlobs, PathSource};
pub use tokio_util::sync::CancellationToken;
