//! Client configuration.
//!
//! A [`ClientConfig`] is injected into each
//! [`ConnectionManager`](crate::ConnectionManager) so independent instances
//! can run side by side, for example in tests.

use std::time::Duration;

use crate::backoff::ReconnectPolicy;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(1);

/// Settings shared by the connection manager and the request façade.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use netview::{ClientConfig, ReconnectPolicy};
///
/// let config = ClientConfig::default()
///     .request_timeout(Duration::from_secs(5))
///     .reconnect(ReconnectPolicy::disabled());
/// assert_eq!(config.request_timeout_value(), Duration::from_secs(5));
/// assert_eq!(config.reconnect_value().max_attempts, 0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    request_timeout: Duration,
    reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Set how long a request waits for its response.
    ///
    /// Values below one millisecond are raised to one millisecond.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout.max(MIN_REQUEST_TIMEOUT);
        self
    }

    /// Set the reconnect policy. The policy is normalized on the way in.
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy.normalized();
        self
    }

    /// Return the configured request timeout.
    #[must_use]
    pub const fn request_timeout_value(&self) -> Duration { self.request_timeout }

    /// Return the configured reconnect policy.
    #[must_use]
    pub const fn reconnect_value(&self) -> ReconnectPolicy { self.reconnect }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ClientConfig;
    use crate::backoff::ReconnectPolicy;

    #[test]
    fn defaults_match_production_values() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout_value(), Duration::from_secs(30));
        assert_eq!(config.reconnect_value(), ReconnectPolicy::default());
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let config = ClientConfig::default().request_timeout(Duration::ZERO);
        assert_eq!(config.request_timeout_value(), Duration::from_millis(1));
    }

    #[test]
    fn reconnect_policy_is_normalized() {
        let config = ClientConfig::default().reconnect(ReconnectPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: 2,
        });
        assert_eq!(
            config.reconnect_value().initial_delay,
            Duration::from_millis(1)
        );
    }
}
