//! # Transport
//!
//! Dialing the store and framing records on the resulting byte stream.
//!
//! Records travel as newline-delimited JSON: one record per line, no
//! embedded newlines (serde_json never emits raw newlines). Reads are
//! bounded so a misbehaving peer cannot exhaust memory with one line.

use futures_util::future::BoxFuture;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// A bidirectional byte stream.
pub trait AsyncDuplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncDuplex for T {}

pub type BoxedStream = Box<dyn AsyncDuplex>;

/// Something that can open a fresh connection to the store.
///
/// Called once per (re)connect attempt by the connection supervisor.
pub trait Transport: Send + Sync + 'static {
    fn dial(&self) -> BoxFuture<'_, io::Result<BoxedStream>>;

    /// Human-readable peer description for logs.
    fn describe(&self) -> String {
        "transport".to_string()
    }
}

// =============================================================================
// TCP
// =============================================================================

/// Plain TCP to `host:port`.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    endpoint: String,
}

impl TcpTransport {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Transport for TcpTransport {
    fn dial(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.endpoint).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as BoxedStream)
        })
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.endpoint)
    }
}

// =============================================================================
// FRAMING
// =============================================================================

/// Outcome of reading one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Record(String),
    /// The line exceeded the limit and was discarded up to its newline.
    Oversized(usize),
    Eof,
}

/// Read one newline-terminated frame of at most `max_bytes`.
///
/// An oversized line is drained so the next read starts at a record boundary.
/// Invalid UTF-8 is replaced rather than reported, leaving the record decoder
/// to reject it.
pub async fn read_frame<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_bytes: usize,
) -> io::Result<Frame> {
    let mut raw = Vec::new();
    let mut oversized = false;
    let mut seen = 0usize;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if seen == 0 {
                return Ok(Frame::Eof);
            }
            break;
        }
        let (end, found_newline) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        seen += end;
        if !oversized && seen > max_bytes.saturating_add(1) {
            oversized = true;
            raw = Vec::new();
        }
        if !oversized {
            raw.extend_from_slice(&available[..end]);
        }
        reader.consume(end);
        if found_newline {
            break;
        }
    }

    if oversized {
        return Ok(Frame::Oversized(seen));
    }
    let line = String::from_utf8_lossy(&raw);
    Ok(Frame::Record(line.trim_end_matches(['\n', '\r']).to_string()))
}

/// Write one record followed by its newline terminator.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, record: &str) -> io::Result<()> {
    writer.write_all(record.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
