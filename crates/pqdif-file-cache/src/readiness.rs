//! Readiness gate for the persistent tier
//!
//! No request may reach the persistent tier before it reports ready. The
//! probes here only wait; bounding the wait is up to the caller.

use crate::client::BlobStoreClient;
use crate::error::{FileCacheError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Resolve once the persistent tier is ready
    async fn wait_ready(&self);
}

/// Polls the persistent tier's /health endpoint
pub struct HttpReadiness {
    client: BlobStoreClient,
    poll_interval: Duration,
}

impl HttpReadiness {
    pub fn new(client: BlobStoreClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }
}

#[async_trait]
impl ReadinessProbe for HttpReadiness {
    async fn wait_ready(&self) {
        loop {
            match self.client.health().await {
                Ok(true) => return,
                Ok(false) => debug!("Persistent tier not ready yet"),
                Err(e) => debug!(error = %e, "Persistent tier unreachable"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// In-process readiness flag
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: watch::Sender<bool>,
}

impl ReadySignal {
    /// A signal that is not ready yet
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A signal that is already ready
    pub fn ready() -> Self {
        let signal = Self::new();
        signal.set_ready();
        signal
    }

    pub fn set_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadinessProbe for ReadySignal {
    async fn wait_ready(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

/// Wait for `probe`, bounded by `timeout` and abandoned on cancellation
pub async fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FileCacheError::Cancelled),
        waited = tokio::time::timeout(timeout, probe.wait_ready()) => {
            waited.map_err(|_| FileCacheError::WorkerNotReady(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_store;

    #[tokio::test]
    async fn test_ready_signal() {
        let signal = ReadySignal::new();
        assert!(!signal.is_ready());

        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait_ready().await });
        signal.set_ready();
        handle.await.unwrap();
        assert!(signal.is_ready());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let result = wait_until_ready(
            &ReadySignal::new(),
            Duration::from_millis(20),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(FileCacheError::WorkerNotReady(_))));
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result =
            wait_until_ready(&ReadySignal::ready(), Duration::from_secs(1), &cancel).await;
        assert!(matches!(result, Err(FileCacheError::Cancelled)));
    }

    #[tokio::test]
    async fn test_http_readiness_waits_for_init() {
        let store = spawn_store(false).await;
        let probe = HttpReadiness::new(store.client(), Duration::from_millis(10));

        let not_yet = wait_until_ready(
            &probe,
            Duration::from_millis(50),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(not_yet, Err(FileCacheError::WorkerNotReady(_))));

        store.state.store.init().await.unwrap();
        wait_until_ready(&probe, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
    }
}
