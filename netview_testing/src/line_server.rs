//! Minimal newline-delimited JSON server for end-to-end tests.
//!
//! The server answers each request according to a [`ServerMode`], letting
//! tests drive a real [`netview::TcpTransport`] against well-behaved and
//! misbehaving peers.

use std::{io, net::SocketAddr};

use futures::StreamExt;
use serde_json::{Map, Value, json};
use tokio::{io::AsyncWriteExt, net::TcpListener, task::JoinHandle};
use tokio_util::codec::{FramedRead, LinesCodec};

/// Length of the line [`ServerMode::Oversized`] sends ahead of each reply.
pub const OVERSIZED_LINE_LENGTH: usize = 512;

/// How the server answers requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerMode {
    /// Reply to every request. `ping` yields `"pong"`; other actions echo
    /// their parameters under `data`.
    #[default]
    Respond,
    /// Read requests but never answer them.
    Silent,
    /// Send an unparseable line before each proper reply.
    Garbage,
    /// Reply under a request id the client never issued.
    Mismatch,
    /// Send a JSON line of [`OVERSIZED_LINE_LENGTH`] bytes before each
    /// proper reply.
    Oversized,
    /// Send a line that is not valid UTF-8 before each proper reply.
    InvalidUtf8,
}

/// Lines the server writes in reply to one client `line`, without their
/// terminating newlines.
///
/// Lines that are not JSON objects are ignored.
#[must_use]
pub fn process_line(mode: ServerMode, line: &str) -> Vec<Vec<u8>> {
    let Ok(Value::Object(mut request)) = serde_json::from_str::<Value>(line) else {
        return Vec::new();
    };
    let action = request.remove("action");
    let request_id = request.remove("request_id").unwrap_or(Value::Null);
    let data = match action.as_ref().and_then(Value::as_str) {
        Some("ping") => json!("pong"),
        _ => Value::Object(request),
    };
    let reply = |id: Value| {
        let mut body = Map::new();
        body.insert("request_id".to_owned(), id);
        body.insert("success".to_owned(), Value::Bool(true));
        body.insert("data".to_owned(), data.clone());
        Value::Object(body).to_string().into_bytes()
    };

    match mode {
        ServerMode::Respond => vec![reply(request_id)],
        ServerMode::Silent => Vec::new(),
        ServerMode::Garbage => vec![b"{not json".to_vec(), reply(request_id)],
        ServerMode::Mismatch => vec![reply(json!("unknown-request"))],
        ServerMode::Oversized => vec![oversized_line(), reply(request_id)],
        ServerMode::InvalidUtf8 => vec![b"{\"event\":\"\xff\xfe\"}".to_vec(), reply(request_id)],
    }
}

fn oversized_line() -> Vec<u8> {
    let filler = OVERSIZED_LINE_LENGTH - r#"{"padding":""}"#.len();
    json!({ "padding": "x".repeat(filler) })
        .to_string()
        .into_bytes()
}

/// Bind an ephemeral local port and serve connections in `mode`.
///
/// Each accepted connection is handled on its own task; the returned handle
/// owns the accept loop and stops the server when aborted.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn spawn_line_server(mode: ServerMode) -> io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut lines = FramedRead::new(read, LinesCodec::new());
                while let Some(Ok(line)) = lines.next().await {
                    for mut reply in process_line(mode, &line) {
                        reply.push(b'\n');
                        if write.write_all(&reply).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    Ok((addr, handle))
}
