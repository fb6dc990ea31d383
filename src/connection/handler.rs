//! Connection Handler
//!
//! Each client gets its own handler task that loops reading request frames,
//! executing them and writing the replies back.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! Open ──> ┌──────────────────────────────┐
//!          │  ReadFrame (parse buffer,    │
//!          │  read socket if incomplete)  │
//!          │            │                 │
//!          │            ▼                 │
//!          │  Dispatch (CommandHandler)   │
//!          │            │                 │
//!          │            ▼                 │
//!          │  WriteReply (write + flush)  │
//!          └────────────┬─────────────────┘
//!                       │ EOF, framing error, I/O error, timeout
//!                       ▼
//!                    Closed
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol: a read may deliver half a frame or several
//! pipelined frames. Incoming bytes accumulate in a `BytesMut` buffer and
//! complete frames are split off the front as they are parsed.
//!
//! Every reply is flushed before the next frame is handled, so replies are
//! never batched.

use crate::commands::CommandHandler;
use crate::protocol::parser::MAX_BULK_SIZE;
use crate::protocol::{FrameError, Reply, RequestParser};
use bytes::{Buf, BytesMut};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, trace, warn};

/// Maximum size for the read buffer: one maximal bulk plus room for the
/// frame's headers and the other arguments.
pub const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// I/O deadlines applied to one session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    /// Upper bound on waiting for the next chunk of request bytes.
    /// `None` lets an idle client hold its connection indefinitely.
    pub read: Option<Duration>,
    /// Upper bound on writing and flushing one reply.
    pub write: Option<Duration>,
}

/// Handles a single client connection.
///
/// Generic over the transport so sessions can be driven by a `TcpStream` in
/// production and by in-memory streams in tests.
pub struct ConnectionHandler<S> {
    /// The transport, with writes buffered until each reply is flushed
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Scratch buffer for encoding replies
    out: BytesMut,

    command_handler: CommandHandler,

    parser: RequestParser,

    timeouts: Timeouts,

    /// Upper bound on buffered, not yet parsed bytes
    max_buffer_size: usize,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        timeouts: Timeouts,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            out: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RequestParser::new(),
            timeouts,
            max_buffer_size: MAX_BUFFER_SIZE,
            stats,
        }
    }

    /// Overrides the read buffer limit.
    pub fn with_max_buffer_size(mut self, limit: usize) -> Self {
        self.max_buffer_size = limit;
        self
    }

    /// Runs the session until the client disconnects or an error occurs.
    ///
    /// A clean disconnect between frames returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed with error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Drain every complete frame already buffered (pipelining)
            while let Some(args) = self.try_parse_frame()? {
                let reply = self.command_handler.execute(args);
                self.stats.command_processed();
                self.send_reply(&reply).await?;
            }

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Attempts to split one complete frame off the front of the buffer.
    fn try_parse_frame(&mut self) -> Result<Option<Vec<bytes::Bytes>>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer)? {
            Some((args, consumed)) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed frame"
                );
                Ok(Some(args))
            }
            None => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete frame, need more data"
                );
                Ok(None)
            }
        }
    }

    /// Reads more data from the transport into the buffer.
    ///
    /// Returns `false` on a clean end of stream.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= self.max_buffer_size {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let read = self.stream.get_mut().read_buf(&mut self.buffer);
        let n = with_deadline(self.timeouts.read, read).await??;

        if n == 0 {
            if self.buffer.is_empty() {
                return Ok(false);
            }
            // Connection closed in the middle of a frame
            return Err(FrameError::UnexpectedEof.into());
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(true)
    }

    /// Writes and flushes one reply.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        self.out.clear();
        reply.encode_into(&mut self.out);

        let stream = &mut self.stream;
        let out = &self.out;
        with_deadline(self.timeouts.write, async move {
            stream.write_all(out).await?;
            stream.flush().await
        })
        .await??;

        self.stats.bytes_written(self.out.len());
        trace!(client = %self.addr, reply = %reply, "Sent reply");
        Ok(())
    }
}

/// Runs `fut`, failing with [`ConnectionError::Timeout`] if `limit` elapses.
async fn with_deadline<F, T>(limit: Option<Duration>, fut: F) -> Result<T, ConnectionError>
where
    F: Future<Output = T>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ConnectionError::Timeout(limit)),
        None => Ok(fut.await),
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error on the transport (reset, broken pipe, ...)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or truncated request frame
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// A read or write did not complete in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The client sent more unparsed bytes than the buffer limit
    #[error("buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// Creates a [`ConnectionHandler`] and runs it to completion. The outcome is
/// logged by [`ConnectionHandler::run`]; errors never propagate past the
/// session.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    timeouts: Timeouts,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, timeouts, stats);
    let _ = handler.run().await;
}
