//! Error types surfaced by the connection layer.
//!
//! Transport failures never reach callers directly: they drive state
//! transitions in the [`ConnectionManager`](crate::ConnectionManager) and
//! resolve outstanding requests with [`ClientError::ConnectionClosed`].
//! A server reply that reports an application-level failure is not an error
//! here; it arrives as an ordinary [`Response`](crate::Response).

use std::{sync::Arc, time::Duration};

use crate::identifier::RequestId;

/// Errors returned by [`crate::Client`] and [`crate::ConnectionManager`].
///
/// The type is `Clone` so a single close event can fail every outstanding
/// request with the same reason.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// The connection is not in the `Connected` state.
    #[error("not connected to server")]
    NotConnected,
    /// No matching response arrived within the timeout window.
    ///
    /// The outcome of the remote operation is unknown.
    #[error("request {request_id} timed out after {timeout:?}")]
    RequestTimeout {
        /// Identifier of the request that expired.
        request_id: RequestId,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The connection dropped while the request was outstanding.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    /// A request with the same identifier is already in flight.
    #[error("request identifier {0} is already pending")]
    DuplicateRequestId(RequestId),
    /// Request parameters did not serialize to a JSON object.
    #[error("request parameters must serialize to a JSON object")]
    InvalidParams,
    /// Failed to serialize an outbound request.
    #[error("failed to serialize request")]
    Serialize(#[source] Arc<serde_json::Error>),
    /// Failed to decode a response into the requested type.
    #[error("failed to decode response")]
    Deserialize(#[source] Arc<serde_json::Error>),
}

impl ClientError {
    /// Returns `true` when the remote outcome of the request is unknown.
    ///
    /// Timeouts and dropped connections may have reached the server, so
    /// callers should not assume the operation failed.
    #[must_use]
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. } | Self::ConnectionClosed)
    }
}
