//! HTTP surface of the persistent tier
//!
//! Provides /health plus the /PQDIF endpoints: List, Retrieve/{key},
//! Cache (multipart upload) and Purge. Anything else is passed through to
//! the upstream origin when one is configured.

use crate::error::{BlobStoreError, Result};
use crate::proxy::UpstreamFetcher;
use crate::store::BlobStore;
use crate::types::{BlobEntry, HealthResponse, DEFAULT_CONTENT_TYPE, DEFAULT_MAX_UPLOAD_SIZE};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use pqdif_file_key::{FileKey, KeyEntry};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

/// Multipart field carrying one file
pub const FILE_FIELD: &str = "pqdifFile";
/// Multipart field carrying an explicit key to overwrite
pub const KEY_FIELD: &str = "pqdifKey";

/// Shared state for the HTTP server
pub struct ServerState {
    pub store: BlobStore,
    pub upstream: Option<UpstreamFetcher>,
    pub started_at: DateTime<Utc>,
    /// Request body limit applied to every route
    pub max_upload_size: usize,
}

impl ServerState {
    pub fn new(store: BlobStore, upstream: Option<UpstreamFetcher>) -> Self {
        Self {
            store,
            upstream,
            started_at: Utc::now(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }

    pub fn with_max_upload_size(mut self, bytes: usize) -> Self {
        self.max_upload_size = bytes;
        self
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.store.is_ready() {
            Ok(())
        } else {
            Err(BlobStoreError::NotReady)
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// One uploaded file part
struct UploadedFile {
    name: String,
    content_type: String,
    data: Bytes,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    let body_limit = state.max_upload_size;

    Router::new()
        .route("/health", get(health))
        .route("/PQDIF/List", get(list_files))
        .route("/PQDIF/Retrieve/{key}", get(retrieve_file))
        .route("/PQDIF/Cache", post(cache_files))
        .route("/PQDIF/Purge", delete(purge_file))
        .fallback(pass_through)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}

/// Serve on an already bound listener
pub async fn serve(listener: tokio::net::TcpListener, state: SharedState) -> std::io::Result<()> {
    info!("Starting HTTP server on {}", listener.local_addr()?);
    axum::serve(listener, create_router(state)).await
}

/// Health check endpoint, doubling as the readiness signal
async fn health(State(state): State<SharedState>) -> Response {
    let cache = state.store.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;
    let ready = state.store.is_ready();

    let body = Json(HealthResponse {
        status: if ready { "ok" } else { "starting" }.to_string(),
        uptime_secs,
        cache,
    });

    if ready {
        body.into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

/// GET /PQDIF/List
async fn list_files(State(state): State<SharedState>) -> Result<Json<Vec<KeyEntry>>> {
    state.ensure_ready()?;
    Ok(Json(state.store.list().await))
}

/// GET /PQDIF/Retrieve/{key}
async fn retrieve_file(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<Response> {
    state.ensure_ready()?;
    let key = FileKey::from(key);

    match state.store.get(&key).await? {
        Some((entry, data)) => Ok(blob_response(&entry, data)),
        None => {
            debug!(key = %key, "Blob not found");
            Ok((
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Blob not found" })),
            )
                .into_response())
        }
    }
}

/// POST /PQDIF/Cache
async fn cache_files(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<KeyEntry>>> {
    state.ensure_ready()?;

    let mut files = Vec::new();
    let mut explicit_key: Option<FileKey> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some(FILE_FIELD) => {
                let name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let data = field.bytes().await?;
                files.push(UploadedFile {
                    name,
                    content_type,
                    data,
                });
            }
            Some(KEY_FIELD) => {
                let text = field.text().await?;
                explicit_key = Some(text.trim().parse::<FileKey>()?);
            }
            other => {
                debug!(field = ?other, "Ignoring unknown multipart field");
            }
        }
    }

    let stored = match explicit_key {
        Some(key) => {
            if files.len() != 1 {
                return Err(BlobStoreError::InvalidCommitBatch { files: files.len() });
            }
            let file = &files[0];
            vec![
                state
                    .store
                    .overwrite(&key, &file.content_type, &file.data)
                    .await?,
            ]
        }
        None => {
            let mut stored = Vec::with_capacity(files.len());
            for file in &files {
                stored.push(
                    state
                        .store
                        .insert_new(&file.name, &file.content_type, &file.data)
                        .await?,
                );
            }
            stored
        }
    };

    info!(count = stored.len(), "Cached PQDIF files");
    Ok(Json(stored))
}

/// DELETE /PQDIF/Purge with the key as a plain-text body
async fn purge_file(State(state): State<SharedState>, body: String) -> Result<StatusCode> {
    state.ensure_ready()?;
    let key = FileKey::from(body.trim());

    if state.store.remove(&key).await? {
        info!(key = %key, "Purged PQDIF file");
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

/// Everything outside the store's routes goes to the origin
async fn pass_through(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
) -> Result<Response> {
    let Some(upstream) = state.upstream.as_ref().filter(|_| method == Method::GET) else {
        return Ok((StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response());
    };

    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let relayed = upstream.fetch(path).await?;

    Ok(Response::builder()
        .status(relayed.status)
        .header(header::CONTENT_TYPE, relayed.content_type)
        .body(Body::from(relayed.body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response()))
}

/// Blob response carrying enough headers for a plain download
fn blob_response(entry: &BlobEntry, data: Vec<u8>) -> Response {
    let disposition = content_disposition(&entry.name);
    let content_type = HeaderValue::from_str(&entry.content_type)
        .unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::CONTENT_DISPOSITION, disposition)
        .header("X-Cache", "HIT")
        .body(Body::from(data))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}
