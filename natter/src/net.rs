//! Async chat-server connection: TCP stream plus newline framing.
//!
//! [`Connection`] wraps a tokio [`TcpStream`] with line reassembly.  The
//! pure framing logic lives in [`LineAssembler`], which holds the
//! carry-over buffer between reads and is independently testable without
//! any real I/O.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// ── NetEvent ──────────────────────────────────────────────────────────────

/// High-level events produced by [`Connection::recv`].
#[derive(Debug, PartialEq, Eq)]
pub enum NetEvent {
    /// A complete line of text from the server (newline stripped).
    Line(Vec<u8>),
    /// An oversized unterminated line was discarded; the payload is the
    /// number of bytes dropped.
    Dropped(usize),
    /// The server closed the connection.
    Closed,
}

// ── LineAssembler (pure, testable) ────────────────────────────────────────

/// Maximum bytes held while waiting for a line boundary.  A longer run
/// without a newline violates the wire protocol; see [`LineAssembler::feed`].
pub const MAX_PENDING: usize = 8192;

/// Reassembles newline-delimited messages out of arbitrarily fragmented
/// reads.  Contains no I/O handles and has no async methods.
#[derive(Debug, Default)]
pub struct LineAssembler {
    /// Bytes received but not yet forming a complete line.
    /// Never contains `\n`.
    pending: Vec<u8>,
    /// Set while skipping the tail of an oversized line, until the next `\n`.
    discarding: bool,
    /// Bytes discarded so far from the current oversized line.
    dropped: usize,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `raw` to the carry-over buffer and extract every complete line.
    ///
    /// Each `\n` boundary emits the bytes before it (newline excluded; a
    /// trailing `\r` is also stripped for CRLF servers) as one
    /// [`NetEvent::Line`], preserving arrival order.  A line split across
    /// reads is reassembled identically to one that arrived whole, and an
    /// empty line is a valid empty message.
    ///
    /// If the carry-over would exceed [`MAX_PENDING`] without a newline,
    /// the partial line is discarded and input is skipped until the next
    /// `\n`, where a single [`NetEvent::Dropped`] reports the loss.
    pub fn feed(&mut self, raw: &[u8]) -> Vec<NetEvent> {
        let mut events = Vec::new();
        for &b in raw {
            if b == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    events.push(NetEvent::Dropped(self.dropped));
                    self.dropped = 0;
                } else {
                    if self.pending.last() == Some(&b'\r') {
                        self.pending.pop();
                    }
                    events.push(NetEvent::Line(std::mem::take(&mut self.pending)));
                }
            } else if self.discarding {
                self.dropped += 1;
            } else if self.pending.len() == MAX_PENDING {
                self.dropped = self.pending.len() + 1;
                self.pending.clear();
                self.discarding = true;
            } else {
                self.pending.push(b);
            }
        }
        events
    }

    /// Whether an incomplete line is buffered (or being discarded).
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.discarding
    }
}

// ── Connection ────────────────────────────────────────────────────────────

const READ_BUF: usize = 8192;

/// A single async connection to the chat server.
///
/// After construction via [`Self::connect`], drive the session with
/// [`Self::send_line`] and [`Self::recv`].
pub struct Connection {
    stream: TcpStream,
    assembler: LineAssembler,
}

impl Connection {
    /// Open a plain TCP connection to `host:port`.
    pub async fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self { stream, assembler: LineAssembler::new() })
    }

    /// Send `line` to the server, appending the newline terminator.
    ///
    /// `write_all` retries internally on short writes, so a send either
    /// transmits the whole line or fails.
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.stream.write_all(&buf).await
    }

    /// Await readable data and decode it into [`NetEvent`]s.
    ///
    /// Returns `Ok([NetEvent::Closed])` on EOF, `Err` on I/O error.
    pub async fn recv(&mut self) -> io::Result<Vec<NetEvent>> {
        let mut raw = [0u8; READ_BUF];
        let n = self.stream.read(&mut raw).await?;
        if n == 0 {
            return Ok(vec![NetEvent::Closed]);
        }
        Ok(self.assembler.feed(&raw[..n]))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
