//! In-process transport built on Tokio channels.
//!
//! [`MemoryTransport::new`] returns the listening side plus a cloneable
//! [`MemoryConnector`]. Each `connect()` creates a linked pair of
//! [`MemoryConnection`]s: one is queued for `accept()`, the other is
//! handed back to the caller to play the client.

use std::sync::Mutex;

use tokio::sync::{mpsc, watch};

use crate::{Connection, ConnectionId, Transport, TransportError};

/// One end of an in-memory, message-framed duplex channel.
pub struct MemoryConnection {
    id: ConnectionId,
    /// `None` once this end has been closed.
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: watch::Sender<bool>,
}

impl MemoryConnection {
    /// Creates two connected ends. What one sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    fn new(
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            id: ConnectionId::next(),
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            closed: watch::Sender::new(false),
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        match self.tx.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let tx = self.sender().ok_or_else(|| {
            TransportError::ConnectionClosed("closed locally".into())
        })?;
        tx.send(data.to_vec()).map_err(|_| {
            TransportError::ConnectionClosed("peer went away".into())
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Ok(None);
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            msg = rx.recv() => Ok(msg),
            _ = closed.changed() => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let taken = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(taken);
        self.closed.send_replace(true);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer(&self) -> String {
        "in-process".to_string()
    }
}

/// The accepting side of the in-memory transport.
pub struct MemoryTransport {
    incoming: mpsc::UnboundedReceiver<MemoryConnection>,
}

/// Client-side handle for opening connections to a [`MemoryTransport`].
#[derive(Clone)]
pub struct MemoryConnector {
    outgoing: mpsc::UnboundedSender<MemoryConnection>,
}

impl MemoryTransport {
    /// Creates a transport and the connector that feeds it.
    pub fn new() -> (Self, MemoryConnector) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { incoming: rx }, MemoryConnector { outgoing: tx })
    }
}

impl MemoryConnector {
    /// Opens a new connection and returns the client end.
    pub fn connect(&self) -> Result<MemoryConnection, TransportError> {
        let (server, client) = MemoryConnection::pair();
        self.outgoing
            .send(server)
            .map_err(|_| TransportError::Shutdown)?;
        Ok(client)
    }
}

impl Transport for MemoryTransport {
    type Connection = MemoryConnection;

    async fn accept(&mut self) -> Result<MemoryConnection, TransportError> {
        let conn = self.incoming.recv().await.ok_or(TransportError::Shutdown)?;
        tracing::debug!(id = %conn.id(), "accepted in-memory connection");
        Ok(conn)
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.incoming.close();
        Ok(())
    }
}
