//! HTTP client for the persistent tier's /PQDIF endpoints
//!
//! Every call takes a cancellation token; a cancelled call returns
//! [`FileCacheError::Cancelled`] without touching any local state.

use crate::error::{FileCacheError, Result};
use crate::source::NamedBlob;
use pqdif_file_key::{FileKey, KeyEntry};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const FILE_FIELD: &str = "pqdifFile";
const KEY_FIELD: &str = "pqdifKey";
const BLOB_CONTENT_TYPE: &str = "application/octet-stream";

/// Client for the PQDIF blob store protocol
#[derive(Debug, Clone)]
pub struct BlobStoreClient {
    client: Client,
    base_url: String,
}

impl BlobStoreClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Whether /health reports the persistent tier ready
    pub async fn health(&self) -> Result<bool> {
        let response = self.client.get(self.url("/health")).send().await?;
        Ok(response.status().is_success())
    }

    /// GET /PQDIF/List
    ///
    /// An empty body means an empty store. Entries whose key does not
    /// decode are skipped.
    pub async fn list(&self, cancel: &CancellationToken) -> Result<Vec<KeyEntry>> {
        let body = cancellable(cancel, async {
            let response = self.client.get(self.url("/PQDIF/List")).send().await?;
            expect_status(response.status(), StatusCode::OK, "listing PQDIF files")?;
            Ok(response.bytes().await?)
        })
        .await?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let entries: Vec<KeyEntry> = serde_json::from_slice(&body)
            .map_err(|e| FileCacheError::InvalidResponse(format!("PQDIF file list: {}", e)))?;

        Ok(entries
            .into_iter()
            .filter(|entry| match entry.key.decode() {
                Ok(_) => true,
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "Skipping unusable key in listing");
                    false
                }
            })
            .collect())
    }

    /// GET /PQDIF/Retrieve/{key}; `None` when the key is not stored
    pub async fn fetch(
        &self,
        key: &FileKey,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        let url = self.url(&format!("/PQDIF/Retrieve/{}", urlencoding::encode(key.as_str())));

        cancellable(cancel, async {
            let response = self.client.get(&url).send().await?;

            if response.status() == StatusCode::NOT_FOUND {
                debug!(key = %key, "PQDIF file not in persistent tier");
                return Ok(None);
            }

            expect_status(response.status(), StatusCode::OK, "retrieving PQDIF file")?;
            let data = response.bytes().await?;
            debug!(key = %key, size = data.len(), "Fetched PQDIF file");
            Ok(Some(data.to_vec()))
        })
        .await
    }

    /// POST /PQDIF/Cache
    ///
    /// Without `explicit_key` every file gets a fresh key. With one, exactly
    /// one file must be given and it overwrites whatever that key holds.
    pub async fn store(
        &self,
        files: Vec<NamedBlob>,
        explicit_key: Option<&FileKey>,
        cancel: &CancellationToken,
    ) -> Result<Vec<KeyEntry>> {
        if explicit_key.is_some() && files.len() != 1 {
            return Err(FileCacheError::InvalidCommitBatch { files: files.len() });
        }

        let count = files.len();
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.data)
                .file_name(file.name)
                .mime_str(BLOB_CONTENT_TYPE)?;
            form = form.part(FILE_FIELD, part);
        }
        if let Some(key) = explicit_key {
            form = form.text(KEY_FIELD, key.to_string());
        }

        let body = cancellable(cancel, async {
            let response = self
                .client
                .post(self.url("/PQDIF/Cache"))
                .multipart(form)
                .send()
                .await?;
            expect_status(response.status(), StatusCode::OK, "caching PQDIF files")?;
            Ok(response.bytes().await?)
        })
        .await?;

        let entries: Vec<KeyEntry> = serde_json::from_slice(&body)
            .map_err(|e| FileCacheError::InvalidResponse(format!("PQDIF cache result: {}", e)))?;
        debug!(sent = count, stored = entries.len(), "Stored PQDIF files");
        Ok(entries)
    }

    /// DELETE /PQDIF/Purge; `false` when nothing was stored under the key
    pub async fn delete(&self, key: &FileKey, cancel: &CancellationToken) -> Result<bool> {
        cancellable(cancel, async {
            let response = self
                .client
                .delete(self.url("/PQDIF/Purge"))
                .body(key.to_string())
                .send()
                .await?;

            match response.status() {
                StatusCode::OK => Ok(true),
                StatusCode::NOT_FOUND => Ok(false),
                status => Err(transport_error(status, "purging PQDIF file")),
            }
        })
        .await
    }
}

async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FileCacheError::Cancelled),
        result = fut => result,
    }
}

fn expect_status(status: StatusCode, expected: StatusCode, context: &str) -> Result<()> {
    if status == expected {
        Ok(())
    } else {
        Err(transport_error(status, context))
    }
}

fn transport_error(status: StatusCode, context: &str) -> FileCacheError {
    warn!(status = %status, context, "Unexpected response from persistent tier");
    FileCacheError::Transport {
        status: status.as_u16(),
        context: context.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_store;
    use axum::routing::get;
    use axum::Router;

    /// Serve a fixed /PQDIF/List body, returning the base URL
    async fn serve_listing(body: String) -> String {
        let router = Router::new().route("/PQDIF/List", get(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, router).await });
        base_url
    }

    fn local_client(base_url: &str) -> BlobStoreClient {
        let client = Client::builder().no_proxy().build().unwrap();
        BlobStoreClient::with_client(client, base_url)
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = BlobStoreClient::new("http://localhost:3005/");
        assert_eq!(client.base_url(), "http://localhost:3005");
        assert_eq!(client.url("/PQDIF/List"), "http://localhost:3005/PQDIF/List");
    }

    #[tokio::test]
    async fn test_store_fetch_delete() {
        let store = spawn_store(true).await;
        let client = store.client();
        let cancel = CancellationToken::new();

        assert!(client.list(&cancel).await.unwrap().is_empty());

        let stored = client
            .store(vec![NamedBlob::new("trace.pqd", b"bytes".to_vec())], None, &cancel)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "trace.pqd");

        let key = &stored[0].key;
        assert_eq!(client.fetch(key, &cancel).await.unwrap().unwrap(), b"bytes");
        assert_eq!(client.list(&cancel).await.unwrap(), stored);

        assert!(client.delete(key, &cancel).await.unwrap());
        assert!(!client.delete(key, &cancel).await.unwrap());
        assert!(client.fetch(key, &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_name_stored_twice() {
        let store = spawn_store(true).await;
        let client = store.client();
        let cancel = CancellationToken::new();

        let stored = client
            .store(
                vec![
                    NamedBlob::new("trace.pqd", b"one".to_vec()),
                    NamedBlob::new("trace.pqd", b"two".to_vec()),
                ],
                None,
                &cancel,
            )
            .await
            .unwrap();
        assert_ne!(stored[0].key, stored[1].key);
        assert_eq!(client.fetch(&stored[0].key, &cancel).await.unwrap().unwrap(), b"one");
        assert_eq!(client.fetch(&stored[1].key, &cancel).await.unwrap().unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_explicit_key_with_two_files() {
        let store = spawn_store(true).await;
        let client = store.client();
        let key = pqdif_file_key::generate("trace.pqd");

        let result = client
            .store(
                vec![
                    NamedBlob::new("a.pqd", b"a".to_vec()),
                    NamedBlob::new("b.pqd", b"b".to_vec()),
                ],
                Some(&key),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(FileCacheError::InvalidCommitBatch { files: 2 })
        ));
        assert!(store.state.store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_key_overwrites() {
        let store = spawn_store(true).await;
        let client = store.client();
        let cancel = CancellationToken::new();

        let stored = client
            .store(vec![NamedBlob::new("trace.pqd", b"old".to_vec())], None, &cancel)
            .await
            .unwrap();
        let key = stored[0].key.clone();

        let replaced = client
            .store(vec![NamedBlob::new("trace.pqd", b"new".to_vec())], Some(&key), &cancel)
            .await
            .unwrap();
        assert_eq!(replaced, stored);
        assert_eq!(client.fetch(&key, &cancel).await.unwrap().unwrap(), b"new");
        assert_eq!(client.list(&cancel).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_not_ready_is_transport_error() {
        let store = spawn_store(false).await;
        let result = store.client().list(&CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(FileCacheError::Transport { status: 503, .. })
        ));
        assert!(!store.client().health().await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_call() {
        let store = spawn_store(true).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = store
            .client()
            .store(vec![NamedBlob::new("a.pqd", b"a".to_vec())], None, &cancel)
            .await;
        assert!(matches!(result, Err(FileCacheError::Cancelled)));
        assert!(store.state.store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_empty_body() {
        let client = local_client(&serve_listing(String::new()).await);
        let listed = client.list(&CancellationToken::new()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_undecodable_keys() {
        let good = pqdif_file_key::generate("good.pqd");
        let body = serde_json::json!([
            { "key": "%%%not-a-key", "name": "bad.pqd" },
            { "key": good.as_str(), "name": "good.pqd" },
        ])
        .to_string();

        let client = local_client(&serve_listing(body).await);
        let listed = client.list(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            listed,
            vec![KeyEntry {
                key: good,
                name: "good.pqd".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_list_rejects_non_json_body() {
        let client = local_client(&serve_listing("not json".to_string()).await);
        let result = client.list(&CancellationToken::new()).await;
        assert!(matches!(result, Err(FileCacheError::InvalidResponse(_))));
    }
}
