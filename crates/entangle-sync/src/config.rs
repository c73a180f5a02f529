//! Connection manager configuration.

use std::time::Duration;

/// Reconnect delay bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// First delay, and the delay restored after a stable connection.
    pub initial: Duration,
    /// Upper bound on the delay.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(256),
            max: Duration::from_millis(32768),
        }
    }
}

/// Configuration for a [`SyncManager`](crate::SyncManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Server address, e.g. `tcp://127.0.0.1:9000` or `memory://test`.
    pub url: String,
    /// Reconnect backoff.
    pub backoff: BackoffConfig,
    /// Reject pending requests that wait longer than this. `None` waits
    /// until the connection goes away.
    pub request_timeout: Option<Duration>,
}

impl ManagerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: BackoffConfig::default(),
            request_timeout: None,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new("memory://default")
    }
}
