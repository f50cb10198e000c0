//! Reconnect policy for the connection manager.

use std::time::Duration;

/// Exponential back-off schedule applied after connection failures.
///
/// The delay before retry `attempt` (counting from zero) is
/// `min(initial_delay * 2^attempt, max_delay)`. Once `max_attempts` retries
/// have failed the manager gives up and stays `Disconnected` until the next
/// explicit `connect`.
///
/// # Default Values
/// - `initial_delay`: 1 second
/// - `max_delay`: 10 seconds
/// - `max_attempts`: 5
///
/// # Invariants
/// - `initial_delay` must not exceed `max_delay`
/// - `initial_delay` must be at least 1 millisecond
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay used for the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Number of retries before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Clamp delays to sane bounds and ensure `initial_delay <= max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use netview::ReconnectPolicy;
    ///
    /// let policy = ReconnectPolicy {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::ZERO,
    ///     max_attempts: 3,
    /// };
    ///
    /// let normalized = policy.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay before retry number `attempt`, or `None` once the budget is spent.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use netview::ReconnectPolicy;
    ///
    /// let policy = ReconnectPolicy::default();
    /// assert_eq!(policy.delay_for(0), Some(Duration::from_secs(1)));
    /// assert_eq!(policy.delay_for(4), Some(Duration::from_secs(10)));
    /// assert_eq!(policy.delay_for(5), None);
    /// ```
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}
