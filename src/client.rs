//! Request façade: send an action, await its correlated response.
//!
//! [`Client`] is what screens hold. It wraps a [`ConnectionManager`] and turns
//! the fire-and-forget transmit path into an awaitable request that completes
//! exactly once: with the server's response, with
//! [`ClientError::RequestTimeout`], or with [`ClientError::ConnectionClosed`]
//! if the connection drops first.

use std::{sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tracing::Instrument;

use crate::{
    config::ClientConfig,
    endpoint::ServerEndpoint,
    error::ClientError,
    frame::{InboundMessage, OutboundFrame, Response},
    identifier::RequestId,
    manager::{ConnectionManager, ConnectionState},
    metrics::{self, Outcome},
    observers::Subscription,
    transport::{TcpTransport, Transport},
};

/// Handle used by application code to talk to the monitoring server.
///
/// Construct one per server context with [`Client::new`] and tear it down with
/// [`Client::shutdown`]. Clones share the same connection.
///
/// # Examples
///
/// ```no_run
/// use netview::{Client, ClientConfig, ServerEndpoint};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::tcp(ClientConfig::default());
/// client.connect(ServerEndpoint::new("127.0.0.1", 9100));
/// let response = client.send_request("get_topology", json!({"map": 1})).await?;
/// println!("{:?}", response.data());
/// client.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    manager: ConnectionManager,
}

impl Client {
    /// Create a client over `transport`. No connection is opened yet.
    #[must_use]
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            manager: ConnectionManager::new(config, transport),
        }
    }

    /// Create a client using the default [`TcpTransport`].
    #[must_use]
    pub fn tcp(config: ClientConfig) -> Self { Self::new(config, Arc::new(TcpTransport::default())) }

    /// Start connecting to `endpoint`. See [`ConnectionManager::connect`].
    pub fn connect(&self, endpoint: ServerEndpoint) { self.manager.connect(endpoint); }

    /// Close the connection and stop reconnecting.
    pub fn disconnect(&self) { self.manager.disconnect(); }

    /// Tear the client down: closes the connection, fails outstanding
    /// requests and cancels every timer.
    pub fn shutdown(self) { self.manager.disconnect(); }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.manager.state() }

    /// Register a connectivity observer. See
    /// [`ConnectionManager::on_connection_change`].
    pub fn on_connection_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.manager.on_connection_change(handler)
    }

    /// Register an inbound message observer. See
    /// [`ConnectionManager::on_message`].
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.manager.on_message(handler)
    }

    /// Access the underlying connection manager.
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager { &self.manager }

    /// Send `action` with `params` and await the correlated response.
    ///
    /// Uses the configured request timeout. The response is returned
    /// verbatim, including any application-level failure indicator.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] if the connection is not up.
    /// - [`ClientError::RequestTimeout`] if no response arrives in time.
    /// - [`ClientError::ConnectionClosed`] if the connection drops first.
    /// - [`ClientError::InvalidParams`] or [`ClientError::Serialize`] if
    ///   `params` cannot be encoded as a JSON object.
    pub async fn send_request<P: Serialize>(
        &self,
        action: &str,
        params: P,
    ) -> Result<Response, ClientError> {
        let timeout = self.manager.config().request_timeout_value();
        self.send_request_with_timeout(action, params, timeout).await
    }

    /// Like [`send_request`](Self::send_request) with an explicit timeout.
    ///
    /// # Errors
    ///
    /// See [`send_request`](Self::send_request).
    pub async fn send_request_with_timeout<P: Serialize>(
        &self,
        action: &str,
        params: P,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        if !self.manager.state().is_connected() {
            metrics::inc_requests(Outcome::NotConnected);
            return Err(ClientError::NotConnected);
        }
        let request_id = RequestId::generate();
        let span = tracing::debug_span!("request", action, request_id = %request_id);
        let result = self
            .transmit(action, params, request_id, timeout)
            .instrument(span)
            .await;
        record_outcome(&result);
        result
    }

    async fn transmit<P: Serialize>(
        &self,
        action: &str,
        params: P,
        request_id: RequestId,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        let pending = self.manager.pending().register(request_id.clone(), timeout)?;
        let frame = OutboundFrame::new(action, request_id, params)?.encode()?;
        self.manager.send(frame)?;
        tracing::debug!("request sent");
        pending.await
    }

    /// Send a request and decode the whole response into `R`.
    ///
    /// # Errors
    ///
    /// Everything [`send_request`](Self::send_request) returns, plus
    /// [`ClientError::Deserialize`] if the response does not match `R`.
    pub async fn request<P, R>(&self, action: &str, params: P) -> Result<R, ClientError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.send_request(action, params).await?.decode()
    }
}

fn record_outcome(result: &Result<Response, ClientError>) {
    let outcome = match result {
        Ok(_) => Outcome::Success,
        Err(ClientError::RequestTimeout { .. }) => Outcome::Timeout,
        Err(ClientError::ConnectionClosed) => Outcome::Closed,
        Err(ClientError::NotConnected) => Outcome::NotConnected,
        Err(_) => return,
    };
    metrics::inc_requests(outcome);
}
