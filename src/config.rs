//! Tunables shared by the lobby client, its subscriptions and the
//! transport-backed match channel.

use std::time::Duration;

/// Default capacity of the bounded roster-change channel.
const DEFAULT_CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for one request/response round-trip.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a graceful channel close.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for stopping a background task.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for lobby operations.
///
/// # Example
///
/// ```
/// use lobby_sync_client::LobbyConfig;
/// use std::time::Duration;
///
/// let config = LobbyConfig::default()
///     .with_request_timeout(Duration::from_secs(3))
///     .with_change_channel_capacity(64);
/// assert_eq!(config.request_timeout, Duration::from_secs(3));
/// assert_eq!(config.change_channel_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Upper bound for a single remote call (create, join, subscribe,
    /// unsubscribe, leave). An elapsed timeout faults the subscription.
    ///
    /// Defaults to **10 seconds**.
    pub request_timeout: Duration,
    /// Upper bound for a graceful channel close before it is aborted.
    ///
    /// Defaults to **5 seconds**.
    pub close_timeout: Duration,
    /// Time a background task (roster dispatcher, transport loop) is given to
    /// exit before it is aborted.
    ///
    /// Defaults to **1 second**. A zero timeout aborts immediately.
    pub shutdown_timeout: Duration,
    /// Capacity of the bounded roster-change notification channel.
    ///
    /// When the consumer falls behind, change notifications are dropped with a
    /// warning; the roster snapshot is always current.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub change_channel_capacity: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            change_channel_capacity: DEFAULT_CHANGE_CHANNEL_CAPACITY,
        }
    }
}

impl LobbyConfig {
    /// Set the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the graceful close timeout.
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the background task shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the roster-change channel capacity. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_change_channel_capacity(mut self, capacity: usize) -> Self {
        self.change_channel_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LobbyConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.close_timeout, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.change_channel_capacity, 256);
    }

    #[test]
    fn capacity_is_clamped_to_one() {
        let config = LobbyConfig::default().with_change_channel_capacity(0);
        assert_eq!(config.change_channel_capacity, 1);
    }
}
