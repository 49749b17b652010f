//! Core types for the PQDIF blob store

use chrono::{DateTime, Utc};
use pqdif_file_key::FileKey;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Request body limit for uploads (150MB)
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 150 * 1024 * 1024;

/// Sidecar metadata for a persisted blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobEntry {
    pub key: FileKey,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Statistics about the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlobStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Configuration for the blob store server
#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    pub port: u16,
    pub cache_dir: PathBuf,
    /// Origin that requests outside /PQDIF are passed through to
    pub upstream_url: Option<String>,
    /// Largest accepted /PQDIF/Cache request body, in bytes
    pub max_upload_size: usize,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            port: 3005,
            cache_dir: PathBuf::from("./cache/pqdif"),
            upstream_url: None,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

impl BlobStoreConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let cache_dir = std::env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let upstream_url = std::env::var("UPSTREAM_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let max_upload_size = std::env::var("MAX_UPLOAD_MB")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .map(|mb| mb * 1024 * 1024)
            .unwrap_or(defaults.max_upload_size);

        Self {
            port,
            cache_dir,
            upstream_url,
            max_upload_size,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: BlobStats,
}
