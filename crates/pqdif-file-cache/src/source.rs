//! Byte sources that turn a user gesture into named buffers for `save`

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// One file to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlob {
    pub name: String,
    pub data: Vec<u8>,
}

impl NamedBlob {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
pub trait FileSource: Send + Sync {
    async fn read_files(&self) -> Result<Vec<NamedBlob>>;
}

/// Buffers already in memory (a drop that has been read)
#[derive(Debug, Clone, Default)]
pub struct NamedBlobs(pub Vec<NamedBlob>);

#[async_trait]
impl FileSource for NamedBlobs {
    async fn read_files(&self) -> Result<Vec<NamedBlob>> {
        Ok(self.0.clone())
    }
}

/// Files picked from disk, named after their file names
#[derive(Debug, Clone, Default)]
pub struct PathSource {
    paths: Vec<PathBuf>,
}

impl PathSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl FileSource for PathSource {
    async fn read_files(&self) -> Result<Vec<NamedBlob>> {
        let mut files = Vec::with_capacity(self.paths.len());

        for path in &self.paths {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("no usable file name in {:?}", path),
                    )
                })?
                .to_string();

            let data = fs::read(path).await?;
            debug!(path = ?path, size = data.len(), "Read file for upload");
            files.push(NamedBlob { name, data });
        }

        Ok(files)
    }
}
