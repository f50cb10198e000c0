//! Transport abstraction used by the connection manager.
//!
//! A [`Transport`] opens one duplex channel of text frames per call. The
//! manager never reuses a [`TransportConnection`]: every reconnect attempt
//! opens a fresh one. [`TcpTransport`] carries one JSON object per line over
//! TCP.

use std::{io, pin::Pin, time::Duration};

use async_trait::async_trait;
use bytes::BytesMut;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::{Decoder, Encoder, Framed, LinesCodec, LinesCodecError};

use crate::endpoint::ServerEndpoint;

const MIN_FRAME_LENGTH: usize = 64;
const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;
const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound half of a transport connection.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = io::Error> + Send>>;

/// Inbound half of a transport connection.
///
/// Items with [`io::ErrorKind::InvalidData`] mark a single unreadable frame;
/// any other error, or the end of the stream, means the connection is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = io::Result<String>> + Send>>;

/// One open duplex channel of text frames.
pub struct TransportConnection {
    /// Frames written to the server.
    pub sink: FrameSink,
    /// Frames read from the server.
    pub stream: FrameStream,
}

impl TransportConnection {
    /// Bundle the two halves of a connection.
    #[must_use]
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self { Self { sink, stream } }
}

impl std::fmt::Debug for TransportConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConnection").finish_non_exhaustive()
    }
}

/// Opens connections to a server endpoint.
///
/// Implementations must be cancellation-safe: dropping a pending `open()`
/// future must not leak resources.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new connection to `endpoint`.
    async fn open(&self, endpoint: &ServerEndpoint) -> io::Result<TransportConnection>;
}

/// Newline-delimited JSON over TCP.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use netview::TcpTransport;
///
/// let transport = TcpTransport::default()
///     .max_frame_length(64 * 1024)
///     .connect_timeout(Duration::from_secs(3))
///     .nodelay(true);
/// assert_eq!(transport.max_frame_length_value(), 64 * 1024);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct TcpTransport {
    max_frame_length: usize,
    connect_timeout: Duration,
    nodelay: bool,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
        }
    }
}

impl TcpTransport {
    /// Set the maximum length of a single line.
    ///
    /// The value is clamped between 64 bytes and 16 MiB.
    #[must_use]
    pub fn max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH);
        self
    }

    /// Bound the time spent establishing the TCP connection.
    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Configure `TCP_NODELAY` on new sockets.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Return the configured maximum line length.
    #[must_use]
    pub const fn max_frame_length_value(&self) -> usize { self.max_frame_length }

    /// Return the configured connect timeout.
    #[must_use]
    pub const fn connect_timeout_value(&self) -> Duration { self.connect_timeout }
}

/// Line codec that reports unreadable lines as items instead of errors.
///
/// `Framed` ends the stream after its decoder fails, so an oversized line or
/// one that is not UTF-8 is surfaced as `Ok(Err(InvalidData))` and decoding
/// carries on with the next line. Only I/O failures of the socket itself
/// are decoder errors.
#[derive(Debug)]
pub(crate) struct JsonLinesCodec {
    lines: LinesCodec,
}

impl JsonLinesCodec {
    pub(crate) fn new(max_frame_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_length),
        }
    }

    fn settle(
        decoded: Result<Option<String>, LinesCodecError>,
    ) -> io::Result<Option<io::Result<String>>> {
        match decoded {
            Ok(line) => Ok(line.map(Ok)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame exceeds maximum line length",
            )))),
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                Ok(Some(Err(e)))
            }
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for JsonLinesCodec {
    type Item = io::Result<String>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        Self::settle(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        Self::settle(self.lines.decode_eof(src))
    }
}

impl Encoder<String> for JsonLinesCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> io::Result<()> {
        self.lines.encode(line, dst).map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            LinesCodecError::MaxLineLengthExceeded => {
                io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds maximum line length")
            }
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self, endpoint: &ServerEndpoint) -> io::Result<TransportConnection> {
        let connect = TcpStream::connect((endpoint.host(), endpoint.port()));
        let stream = timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(self.nodelay)?;

        let framed = Framed::new(stream, JsonLinesCodec::new(self.max_frame_length));
        let (sink, stream) = framed.split::<String>();
        Ok(TransportConnection::new(
            Box::pin(sink),
            Box::pin(stream.map(|frame| frame.and_then(|line| line))),
        ))
    }
}
