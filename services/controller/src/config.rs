//! Configuration for the tag controller.

use std::time::Duration;

use anyhow::Result;
use tagsync_workqueue::BackoffPolicy;

/// Tag controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Inventory API URL the watcher polls for service state.
    pub inventory_url: String,

    /// Tag API URL the handler writes to. Empty disables tagging and
    /// falls back to the logging handler.
    pub tag_api_url: String,

    /// Number of concurrent reconciliation workers.
    pub workers: usize,

    /// Seconds between inventory polls.
    pub poll_interval_secs: u64,

    /// Seconds to wait for the initial inventory listing at startup.
    pub sync_timeout_secs: u64,

    /// Base retry delay in milliseconds for failed items.
    pub backoff_base_ms: u64,

    /// Retry delay cap in seconds.
    pub backoff_max_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let inventory_url = std::env::var("TAGSYNC_INVENTORY_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

        let tag_api_url = std::env::var("TAGSYNC_TAG_API_URL").unwrap_or_default();

        let workers = std::env::var("TAGSYNC_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);

        let poll_interval_secs = std::env::var("TAGSYNC_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let sync_timeout_secs = std::env::var("TAGSYNC_SYNC_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let backoff_base_ms = std::env::var("TAGSYNC_BACKOFF_BASE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let backoff_max_secs = std::env::var("TAGSYNC_BACKOFF_MAX_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        let log_level = std::env::var("TAGSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            inventory_url,
            tag_api_url,
            workers,
            poll_interval_secs,
            sync_timeout_secs,
            backoff_base_ms,
            backoff_max_secs,
            log_level,
        })
    }

    /// Interval between inventory polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Startup deadline for the initial cache sync.
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    /// Backoff schedule for failed work items.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_secs(self.backoff_max_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            inventory_url: "http://127.0.0.1:8080".to_string(),
            tag_api_url: String::new(),
            workers: 2,
            poll_interval_secs: 10,
            sync_timeout_secs: 60,
            backoff_base_ms: 5,
            backoff_max_secs: 1000,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_duration_helpers() {
        let config = config();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.sync_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_from_config() {
        let backoff = config().backoff();
        assert_eq!(backoff.delay_for(0), Duration::from_millis(5));
        assert_eq!(backoff.max, Duration::from_secs(1000));
    }
}
