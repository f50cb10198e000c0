//! In-memory transport with scripted connection outcomes.
//!
//! Each call to [`Transport::open`] consumes the next queued
//! [`OpenOutcome`], falling back to a default once the queue is empty.
//! Accepted connections are published as [`ServerPeer`] handles that tests
//! retrieve with [`ScriptedTransport::next_peer`].

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{
    SinkExt,
    StreamExt,
    channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded},
};
use netview::{ConnectionManager, ConnectionState, ServerEndpoint, Transport, TransportConnection};
use serde_json::{Value, json};
use tokio::{sync::mpsc, time::Instant};

/// What the next `open` call does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Open an in-memory connection and publish its [`ServerPeer`].
    Accept,
    /// Fail with `ConnectionRefused`.
    Refuse,
}

struct Script {
    queued: VecDeque<OpenOutcome>,
    fallback: OpenOutcome,
    opens: Vec<Instant>,
}

struct Inner {
    script: Mutex<Script>,
    peer_tx: mpsc::UnboundedSender<ServerPeer>,
    peer_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerPeer>>,
}

/// Scripted stand-in for the network.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

impl ScriptedTransport {
    fn with_fallback(fallback: OpenOutcome) -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                script: Mutex::new(Script {
                    queued: VecDeque::new(),
                    fallback,
                    opens: Vec::new(),
                }),
                peer_tx,
                peer_rx: tokio::sync::Mutex::new(peer_rx),
            }),
        }
    }

    /// A transport that accepts every connection unless told otherwise.
    #[must_use]
    pub fn accepting() -> Self { Self::with_fallback(OpenOutcome::Accept) }

    /// A transport that refuses every connection unless told otherwise.
    #[must_use]
    pub fn refusing() -> Self { Self::with_fallback(OpenOutcome::Refuse) }

    /// Queue outcomes for the next `open` calls, in order.
    #[must_use]
    pub fn then(self, outcomes: impl IntoIterator<Item = OpenOutcome>) -> Self {
        self.script().queued.extend(outcomes);
        self
    }

    /// Change the outcome used once the queue is empty.
    pub fn set_fallback(&self, outcome: OpenOutcome) { self.script().fallback = outcome; }

    /// Number of `open` calls so far.
    #[must_use]
    pub fn open_count(&self) -> usize { self.script().opens.len() }

    /// Instants at which `open` was called.
    #[must_use]
    pub fn open_times(&self) -> Vec<Instant> { self.script().opens.clone() }

    /// Wait for the next accepted connection.
    ///
    /// # Panics
    ///
    /// Panics if the transport has been dropped.
    pub async fn next_peer(&self) -> ServerPeer {
        self.inner
            .peer_rx
            .lock()
            .await
            .recv()
            .await
            .expect("scripted transport dropped")
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.inner.script.lock().expect("script lock poisoned")
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, endpoint: &ServerEndpoint) -> io::Result<TransportConnection> {
        let outcome = {
            let mut script = self.script();
            script.opens.push(Instant::now());
            let fallback = script.fallback;
            script.queued.pop_front().unwrap_or(fallback)
        };
        match outcome {
            OpenOutcome::Refuse => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("scripted refusal for {endpoint}"),
            )),
            OpenOutcome::Accept => {
                let (client_tx, server_rx) = unbounded::<String>();
                let (server_tx, client_rx) = unbounded::<io::Result<String>>();
                let peer = ServerPeer {
                    endpoint: endpoint.clone(),
                    incoming: server_rx,
                    outgoing: server_tx,
                };
                let _ = self.inner.peer_tx.send(peer);
                Ok(TransportConnection::new(
                    Box::pin(
                        client_tx.sink_map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e)),
                    ),
                    Box::pin(client_rx),
                ))
            }
        }
    }
}

/// Server side of one in-memory connection.
///
/// Dropping the peer closes the connection from the server's end.
#[derive(Debug)]
pub struct ServerPeer {
    endpoint: ServerEndpoint,
    incoming: UnboundedReceiver<String>,
    outgoing: UnboundedSender<io::Result<String>>,
}

impl ServerPeer {
    /// Endpoint the client asked for.
    #[must_use]
    pub fn endpoint(&self) -> &ServerEndpoint { &self.endpoint }

    /// Next raw frame written by the client, or `None` once it closed.
    pub async fn recv_text(&mut self) -> Option<String> { self.incoming.next().await }

    /// Next frame written by the client, parsed as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the client closed the connection or sent invalid JSON.
    pub async fn recv_json(&mut self) -> Value {
        let text = self.recv_text().await.expect("client closed connection");
        serde_json::from_str(&text).expect("client frame is JSON")
    }

    /// Next request from the client, returning its `request_id` and frame.
    ///
    /// # Panics
    ///
    /// Panics if the frame carries no string `request_id`.
    pub async fn recv_request(&mut self) -> (String, Value) {
        let frame = self.recv_json().await;
        let id = frame["request_id"]
            .as_str()
            .expect("request carries request_id")
            .to_owned();
        (id, frame)
    }

    /// Push a raw text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) { let _ = self.outgoing.unbounded_send(Ok(text.into())); }

    /// Push a JSON frame to the client.
    pub fn send_json(&self, value: &Value) { self.send_text(value.to_string()); }

    /// Answer `request_id` with `body` plus the echoed identifier.
    pub fn reply(&self, request_id: &str, body: Value) {
        let mut frame = match body {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_owned(), other);
                map
            }
        };
        frame.insert("request_id".to_owned(), json!(request_id));
        self.send_json(&Value::Object(frame));
    }

    /// Inject a transport error into the client's read side.
    pub fn send_error(&self, kind: io::ErrorKind) {
        let _ = self
            .outgoing
            .unbounded_send(Err(io::Error::new(kind, "scripted transport error")));
    }

    /// Returns `true` once the client has closed its side.
    pub async fn client_closed(&mut self) -> bool { self.incoming.next().await.is_none() }

    /// Close the connection from the server's end.
    pub fn close(self) {}
}

/// Wait until `manager` reaches `state`.
///
/// # Panics
///
/// Panics if the manager is dropped first.
pub async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    let mut states = manager.watch_state();
    states
        .wait_for(|current| *current == state)
        .await
        .expect("connection manager dropped");
}
