//! Metric helpers for `netview`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers do nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the counter tracking completed requests by outcome.
pub const REQUESTS_TOTAL: &str = "netview_requests_total";
/// Name of the counter tracking scheduled reconnect attempts.
pub const RECONNECT_ATTEMPTS: &str = "netview_reconnect_attempts_total";
/// Name of the counter tracking dropped malformed frames.
pub const MALFORMED_FRAMES: &str = "netview_malformed_frames_total";
/// Name of the gauge that is 1 while the connection is up.
pub const CONNECTED: &str = "netview_connected";

/// How a request finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A matching response arrived.
    Success,
    /// The timeout elapsed first.
    Timeout,
    /// The connection closed first.
    Closed,
    /// The request was refused because the client was offline.
    NotConnected,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Timeout => "timeout",
            Outcome::Closed => "closed",
            Outcome::NotConnected => "not_connected",
        }
    }
}

/// Record a finished request.
pub fn inc_requests(outcome: Outcome) {
    #[cfg(feature = "metrics")]
    counter!(REQUESTS_TOTAL, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome.as_str();
}

/// Record a scheduled reconnect attempt.
pub fn inc_reconnect_attempts() {
    #[cfg(feature = "metrics")]
    counter!(RECONNECT_ATTEMPTS).increment(1);
}

/// Record a dropped malformed frame.
pub fn inc_malformed_frames() {
    #[cfg(feature = "metrics")]
    counter!(MALFORMED_FRAMES).increment(1);
}

/// Set the connected gauge.
pub fn set_connected(connected: bool) {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTED).set(if connected { 1.0 } else { 0.0 });
    #[cfg(not(feature = "metrics"))]
    let _ = connected;
}
