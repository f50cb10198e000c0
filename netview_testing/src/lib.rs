//! Test support for the `netview` connection layer.
//!
//! [`ScriptedTransport`] stands in for the network: each `open` either
//! refuses or hands the test a [`ServerPeer`] playing the server side of an
//! in-memory connection. [`spawn_line_server`] runs a real TCP server that
//! speaks the newline-delimited JSON protocol for end-to-end tests.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use netview::{ClientConfig, ConnectionManager, ServerEndpoint};
//! use netview_testing::ScriptedTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = ScriptedTransport::accepting();
//! let manager = ConnectionManager::new(ClientConfig::default(), Arc::new(transport.clone()));
//! manager.connect(ServerEndpoint::new("monitor", 9100));
//! let _peer = transport.next_peer().await;
//! # }
//! ```

pub mod line_server;
pub mod logging;
pub mod scripted;

pub use line_server::{OVERSIZED_LINE_LENGTH, ServerMode, process_line, spawn_line_server};
pub use logging::{LoggerHandle, logger};
pub use scripted::{OpenOutcome, ScriptedTransport, ServerPeer, wait_for_state};
