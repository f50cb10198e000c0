#![doc(html_root_url = "https://docs.rs/netview/latest")]
//! Public API for the `netview` connection layer.
//!
//! This crate provides the persistent connection used by the netview
//! monitoring client: a single duplex channel to the server that multiplexes
//! many concurrent request/response exchanges, reconnects with exponential
//! back-off, times out unanswered requests and fans out server-pushed
//! messages to registered observers.

pub mod backoff;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod identifier;
pub mod manager;
pub mod metrics;
pub mod observers;
pub mod pending;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use client::Client;
pub use config::ClientConfig;
pub use endpoint::{EndpointParseError, ServerEndpoint};
pub use error::ClientError;
pub use frame::{FrameError, InboundMessage, OutboundFrame, Response};
pub use identifier::RequestId;
pub use manager::{ConnectionManager, ConnectionState};
pub use observers::{Observers, Subscription};
pub use pending::{PendingRequests, PendingResponse};
pub use transport::{FrameSink, FrameStream, TcpTransport, Transport, TransportConnection};
