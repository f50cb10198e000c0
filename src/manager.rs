//! Connection manager: socket lifecycle, reconnection and inbound dispatch.
//!
//! The manager owns exactly one logical connection to a server endpoint and
//! drives it through the states in [`ConnectionState`]:
//!
//! ```text
//! Disconnected/Reconnecting --connect--> Connecting
//! Connecting   --opened-->  Connected
//! Connecting   --failed-->  Reconnecting | Disconnected (retry budget spent)
//! Connected    --closed-->  Reconnecting | Disconnected
//! any          --disconnect--> Disconnected
//! ```
//!
//! Each `connect` spawns one driver task. The driver opens the transport,
//! runs the session loop while connected, and sleeps out the back-off delay
//! between attempts. All state lives behind a single mutex and every driver
//! carries a [`CancellationToken`]; `disconnect` cancels the token under the
//! lock, so a superseded driver can never mutate state again.

use std::{
    fmt,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::{select, sync::mpsc, sync::watch, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ClientConfig,
    endpoint::ServerEndpoint,
    error::ClientError,
    frame::InboundMessage,
    metrics,
    observers::{Observers, Subscription},
    pending::PendingRequests,
    transport::{Transport, TransportConnection},
};

/// Lifecycle state of the managed connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no attempt scheduled.
    Disconnected,
    /// The transport is being opened.
    Connecting,
    /// The transport is open; requests may be sent.
    Connected,
    /// Waiting out the back-off delay before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` in the `Connected` state.
    #[must_use]
    pub const fn is_connected(self) -> bool { matches!(self, Self::Connected) }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        })
    }
}

struct Link {
    state: ConnectionState,
    attempt: u32,
    endpoint: Option<ServerEndpoint>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    driver: CancellationToken,
}

struct Shared {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    link: Mutex<Link>,
    state_tx: watch::Sender<ConnectionState>,
    pending: PendingRequests,
    connection_observers: Observers<bool>,
    message_observers: Observers<InboundMessage>,
}

enum SessionEnd {
    Cancelled,
    Closed,
}

/// Owns the connection to one server and multiplexes requests over it.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("pending", &self.shared.pending.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state.
    #[must_use]
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let driver = CancellationToken::new();
        driver.cancel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                link: Mutex::new(Link {
                    state: ConnectionState::Disconnected,
                    attempt: 0,
                    endpoint: None,
                    outbound: None,
                    driver,
                }),
                state_tx,
                pending: PendingRequests::new(),
                connection_observers: Observers::new(),
                message_observers: Observers::new(),
            }),
        }
    }

    /// Start connecting to `endpoint`.
    ///
    /// Returns immediately; progress is reported through
    /// [`watch_state`](Self::watch_state) and connection observers. A call
    /// while `Connecting` or `Connected` is a no-op. A call while
    /// `Reconnecting` abandons the scheduled retry and starts a fresh attempt
    /// with the retry budget reset. Must be called within a Tokio runtime.
    pub fn connect(&self, endpoint: ServerEndpoint) {
        let shared = &self.shared;
        let mut link = shared.lock();
        if matches!(
            link.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(
                "connect ignored: state={}, endpoint={endpoint}",
                link.state
            );
            return;
        }
        link.driver.cancel();
        let token = CancellationToken::new();
        link.driver = token.clone();
        link.attempt = 0;
        link.endpoint = Some(endpoint.clone());
        shared.transition(&mut link, ConnectionState::Connecting);
        drop(link);

        info!("connecting: endpoint={endpoint}");
        tokio::spawn(drive(Arc::clone(shared), endpoint, token));
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Cancels any scheduled retry, closes the transport if open and fails
    /// every pending request with [`ClientError::ConnectionClosed`].
    pub fn disconnect(&self) {
        let shared = &self.shared;
        let mut link = shared.lock();
        link.driver.cancel();
        link.outbound = None;
        let was_connected = link.state.is_connected();
        shared.transition(&mut link, ConnectionState::Disconnected);
        let rejected = shared.pending.reject_all(&ClientError::ConnectionClosed);
        drop(link);

        if rejected > 0 {
            debug!("disconnect rejected pending requests: count={rejected}");
        }
        if was_connected {
            info!("disconnected");
            shared.connection_changed(false);
        }
    }

    /// Queue `frame` for transmission.
    ///
    /// Does not wait for the frame to be written or acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] unless the state is `Connected`.
    pub fn send(&self, frame: String) -> Result<(), ClientError> {
        let link = self.shared.lock();
        if !link.state.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let outbound = link.outbound.as_ref().ok_or(ClientError::NotConnected)?;
        outbound.send(frame).map_err(|_| ClientError::NotConnected)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { *self.shared.state_tx.borrow() }

    /// Receiver that observes every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> { self.shared.state_tx.subscribe() }

    /// Endpoint of the most recent `connect` call.
    #[must_use]
    pub fn endpoint(&self) -> Option<ServerEndpoint> { self.shared.lock().endpoint.clone() }

    /// Register an observer for connectivity changes.
    ///
    /// The handler receives `true` when the connection opens and `false`
    /// when an open connection closes.
    pub fn on_connection_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.shared.connection_observers.add(handler)
    }

    /// Register an observer for every parsed inbound message.
    ///
    /// Responses to requests are delivered here too, after the request has
    /// been resolved.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.shared.message_observers.add(handler)
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize { self.shared.pending.len() }

    /// Configuration this manager was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig { &self.shared.config }

    pub(crate) fn pending(&self) -> &PendingRequests { &self.shared.pending }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Link> { self.link.lock().unwrap_or_else(PoisonError::into_inner) }

    fn transition(&self, link: &mut Link, next: ConnectionState) {
        if link.state != next {
            debug!("connection state: from={}, to={next}", link.state);
            link.state = next;
        }
        self.state_tx.send_replace(next);
    }

    fn connection_changed(&self, connected: bool) {
        metrics::set_connected(connected);
        self.connection_observers.notify_all(&connected);
    }

    /// Enter `Connected` and hand back the outbound queue, unless `driver`
    /// has been superseded.
    fn opened(&self, driver: &CancellationToken) -> Option<mpsc::UnboundedReceiver<String>> {
        let mut link = self.lock();
        if driver.is_cancelled() {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        link.outbound = Some(tx);
        link.attempt = 0;
        self.transition(&mut link, ConnectionState::Connected);
        drop(link);

        info!("connected");
        self.connection_changed(true);
        Some(rx)
    }

    /// Leave `Connected` after the transport closed on its own.
    ///
    /// Returns the back-off delay before the next attempt, or `None` when the
    /// driver should stop.
    fn closed(&self, driver: &CancellationToken) -> Option<std::time::Duration> {
        let mut link = self.lock();
        if driver.is_cancelled() {
            return None;
        }
        link.outbound = None;
        let delay = self.schedule_retry(&mut link);
        // Rejected under the lock so a session opened by a concurrent
        // `connect` never loses requests to this close.
        let rejected = self.pending.reject_all(&ClientError::ConnectionClosed);
        drop(link);

        info!("connection closed: rejected_requests={rejected}");
        self.connection_changed(false);
        delay
    }

    /// Record a failed open and pick the next delay, if any.
    fn failed(&self, driver: &CancellationToken) -> Option<std::time::Duration> {
        let mut link = self.lock();
        if driver.is_cancelled() {
            return None;
        }
        self.schedule_retry(&mut link)
    }

    fn schedule_retry(&self, link: &mut Link) -> Option<std::time::Duration> {
        let policy = self.config.reconnect_value();
        if let Some(delay) = policy.delay_for(link.attempt) {
            link.attempt += 1;
            metrics::inc_reconnect_attempts();
            info!(
                "reconnect scheduled: attempt={}, max_attempts={}, delay={delay:?}",
                link.attempt, policy.max_attempts
            );
            self.transition(link, ConnectionState::Reconnecting);
            Some(delay)
        } else {
            warn!(
                "giving up after {} reconnect attempts",
                policy.max_attempts
            );
            link.driver.cancel();
            self.transition(link, ConnectionState::Disconnected);
            None
        }
    }

    /// Move from `Reconnecting` back to `Connecting` once the delay elapsed.
    fn retrying(&self, driver: &CancellationToken) -> bool {
        let mut link = self.lock();
        if driver.is_cancelled() {
            return false;
        }
        self.transition(&mut link, ConnectionState::Connecting);
        true
    }

    fn dispatch(&self, text: &str) {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                metrics::inc_malformed_frames();
                warn!("dropping malformed frame: error={e}");
                return;
            }
        };
        if let Some(id) = message.request_id() {
            if !self.pending.resolve(id, message.to_response()) {
                debug!("no pending request for response: request_id={id}");
            }
        }
        self.message_observers.notify_all(&message);
    }
}

async fn drive(shared: Arc<Shared>, endpoint: ServerEndpoint, driver: CancellationToken) {
    loop {
        let opened = select! {
            biased;

            () = driver.cancelled() => return,
            res = shared.transport.open(&endpoint) => res,
        };

        let delay = match opened {
            Ok(connection) => {
                let Some(outbound) = shared.opened(&driver) else {
                    return;
                };
                match run_session(&shared, connection, outbound, &driver).await {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Closed => shared.closed(&driver),
                }
            }
            Err(e) => {
                warn!("connect failed: endpoint={endpoint}, error={e}");
                shared.failed(&driver)
            }
        };

        let Some(delay) = delay else {
            return;
        };
        select! {
            biased;

            () = driver.cancelled() => return,
            () = sleep(delay) => {}
        }
        if !shared.retrying(&driver) {
            return;
        }
    }
}

async fn run_session(
    shared: &Shared,
    connection: TransportConnection,
    mut outbound: mpsc::UnboundedReceiver<String>,
    driver: &CancellationToken,
) -> SessionEnd {
    let TransportConnection {
        mut sink,
        mut stream,
    } = connection;
    loop {
        select! {
            biased;

            () = driver.cancelled() => {
                let _ = sink.close().await;
                return SessionEnd::Cancelled;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    return SessionEnd::Cancelled;
                };
                if let Err(e) = sink.send(frame).await {
                    warn!("write failed: error={e}");
                    return SessionEnd::Closed;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(text)) => shared.dispatch(&text),
                Some(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    metrics::inc_malformed_frames();
                    warn!("dropping unreadable frame: error={e}");
                }
                Some(Err(e)) => {
                    warn!("read failed: error={e}");
                    return SessionEnd::Closed;
                }
                None => {
                    debug!("server closed the connection");
                    return SessionEnd::Closed;
                }
            },
        }
    }
}
