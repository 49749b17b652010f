//! Pass-through to the upstream origin for requests the store does not own

use crate::error::Result;
use crate::types::DEFAULT_CONTENT_TYPE;
use axum::body::Bytes;
use axum::http::StatusCode;
use reqwest::Client;
use tracing::{debug, warn};

/// HTTP client forwarding GET requests to the origin
pub struct UpstreamFetcher {
    client: Client,
    base_url: String,
}

/// A response relayed from upstream
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

impl UpstreamFetcher {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the upstream URL for a request path (with query)
    pub fn url_for(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base_url, path_and_query)
        } else {
            format!("{}/{}", self.base_url, path_and_query)
        }
    }

    /// Fetch a path from upstream, relaying its status and body
    pub async fn fetch(&self, path_and_query: &str) -> Result<UpstreamResponse> {
        let url = self.url_for(path_and_query);
        debug!(url = %url, "Forwarding request upstream");

        let response = self.client.get(&url).send().await?;
        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);

        if !status.is_success() {
            warn!(status = %status, url = %url, "Upstream returned non-success");
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for() {
        let fetcher = UpstreamFetcher::new("http://origin.example/");
        assert_eq!(fetcher.base_url(), "http://origin.example");
        assert_eq!(
            fetcher.url_for("/index.html?v=2"),
            "http://origin.example/index.html?v=2"
        );
        assert_eq!(fetcher.url_for("app.js"), "http://origin.example/app.js");
    }

    #[tokio::test]
    async fn test_fetch_unreachable_upstream() {
        // Port 9 (discard) on localhost is not listening
        let fetcher = UpstreamFetcher::new("http://127.0.0.1:9");
        assert!(fetcher.fetch("/").await.is_err());
    }
}
