//! Connections for Gamehall.
//!
//! A session never touches sockets. It is handed something implementing
//! [`Connection`], which moves whole messages in both directions, and the
//! session manager pulls new ones out of a [`Transport`].
//!
//! Implementations:
//!
//! - [`WebSocketTransport`]: TCP listener, each connection upgraded to a
//!   WebSocket before it is handed out (feature `websocket`, on by default)
//! - [`MemoryTransport`]: linked channel pairs, for tests and for
//!   embedding the server in-process

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryConnection, MemoryConnector, MemoryTransport};
#[cfg(feature = "websocket")]
pub use websocket::{HANDSHAKE_TIMEOUT, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique connection number, shown as `conn-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Takes the next unused id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Source of incoming connections.
///
/// Binding happens in the constructor of each implementation. By the time
/// a `Transport` value exists it is already listening, so the only startup
/// failure a server can hit is reported before its accept loop runs.
pub trait Transport: Send + 'static {
    type Connection: Connection;

    /// Next connection. A failure for one peer (a botched handshake, say)
    /// is returned as an error and the caller keeps accepting;
    /// [`TransportError::Shutdown`] means no connection will ever arrive.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    fn shutdown(
        &mut self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// One peer, exchanging whole messages.
///
/// A session reads and writes from two different tasks, so `send` must not
/// wait on a `recv` that is parked.
pub trait Connection: Send + Sync + 'static {
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// `Ok(None)` once the peer closed cleanly or [`close`](Self::close)
    /// was called on this end.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closing twice is not an error.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn id(&self) -> ConnectionId;

    /// Human-readable description of the remote end, for logs.
    fn peer(&self) -> String;
}
