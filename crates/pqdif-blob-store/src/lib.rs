//! PQDIF Blob Store
//!
//! The persistent tier of the PQDIF file cache: a directory-backed blob
//! store keyed by [`pqdif_file_key::FileKey`], exposed over the `/PQDIF`
//! HTTP surface that clients list, fetch, upload and purge through.

pub mod error;
pub mod proxy;
pub mod server;
pub mod store;
pub mod types;

pub use error::{BlobStoreError, Result};
pub use proxy::UpstreamFetcher;
pub use server::{create_router, serve, start_server, ServerState, SharedState};
pub use store::BlobStore;
pub use types::{BlobEntry, BlobStats, BlobStoreConfig, HealthResponse};
