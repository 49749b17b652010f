use std::env;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:3005";
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What the decode and encode loops do at their per-record yield point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YieldStrategy {
    /// Hand control back to the scheduler once
    #[default]
    Immediate,
    /// Sleep for a fixed slice, leaving room for other pending work
    Sleep(Duration),
    /// Keep going; cancellation is still observed
    Never,
}

impl YieldStrategy {
    pub async fn yield_now(self) {
        match self {
            YieldStrategy::Immediate => tokio::task::yield_now().await,
            YieldStrategy::Sleep(slice) => tokio::time::sleep(slice).await,
            YieldStrategy::Never => {}
        }
    }
}

/// Client configuration for the file cache
#[derive(Debug, Clone)]
pub struct FileCacheConfig {
    /// Origin serving the /PQDIF endpoints
    pub base_url: String,
    /// Upper bound on waiting for the persistent tier to become ready
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
    pub yield_strategy: YieldStrategy,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            ready_poll_interval: DEFAULT_READY_POLL_INTERVAL,
            yield_strategy: YieldStrategy::default(),
        }
    }
}

impl FileCacheConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = env::var("PQDIF_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        let ready_timeout = env::var("PQDIF_READY_TIMEOUT_MS")
            .ok()
            .and_then(|ms| ms.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.ready_timeout);

        Self {
            base_url,
            ready_timeout,
            ..defaults
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_yield_strategy(mut self, strategy: YieldStrategy) -> Self {
        self.yield_strategy = strategy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FileCacheConfig::default();
        assert_eq!(config.base_url, "http://localhost:3005");
        assert_eq!(config.ready_timeout, Duration::from_secs(5));
        assert_eq!(config.yield_strategy, YieldStrategy::Immediate);
    }

    #[test]
    fn test_builders() {
        let config = FileCacheConfig::default()
            .with_base_url("http://127.0.0.1:9999")
            .with_ready_timeout(Duration::from_millis(10))
            .with_yield_strategy(YieldStrategy::Never);
        assert_eq!(config.base_url, "http://127.0.0.1:9999");
        assert_eq!(config.ready_timeout, Duration::from_millis(10));
        assert_eq!(config.yield_strategy, YieldStrategy::Never);
    }

    #[tokio::test]
    async fn test_sleep_strategy_waits() {
        let start = std::time::Instant::now();
        YieldStrategy::Sleep(Duration::from_millis(5)).yield_now().await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
