//! # Transport Abstraction
//!
//! A minimal, async interface for one HTTP request/response exchange.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The transport knows nothing about XML or values. It moves
//!   opaque request chunks out and response chunks in.
//! - **One Exchange per Connection**: `Transport::open` starts a request; the
//!   returned `Connection` accepts the body, then yields the response head and
//!   its body chunks, in that order.
//! - **Backpressure**: `Connection::write` resolves only once the chunk has been
//!   accepted, so a fast producer is paced by the network.

use std::fmt;

use bytes::Bytes;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The server answered with a non-success HTTP status.
    Status(u16),
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "HTTP status {}", code),
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// What a transport needs to know before the first body byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub url: String,
    pub user_agent: String,
    /// Set when the whole body is known up front; `None` streams the body.
    pub content_length: Option<u64>,
    /// How many body chunks may be queued before `write` waits.
    pub write_capacity: usize,
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    pub fn new(status: u16) -> Self {
        Self { status, headers: Vec::new() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header with a case-insensitive name match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Opens request/response exchanges.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Starts a request. No body has been sent when this returns.
    async fn open(&self, head: &RequestHead) -> Result<Box<dyn Connection>>;
}

/// One in-flight exchange.
///
/// # Invariants
/// - `write` is only called before `finish`; `chunk` only after it.
/// - After `abort`, the connection is inert and every method may fail.
#[async_trait::async_trait]
pub trait Connection: Send {
    /// Sends a body chunk, resolving once the transport is ready for more.
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Ends the request body and waits for the response head.
    async fn finish(&mut self) -> Result<ResponseHead>;

    /// Next response body chunk, or `None` at end of body.
    async fn chunk(&mut self) -> Result<Option<Bytes>>;

    /// Tears the exchange down. Never blocks.
    fn abort(&mut self);
}
