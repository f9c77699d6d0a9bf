use std::io;

/// Transport failures. None of them outlive the connection they happened on.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The peer did not finish the WebSocket upgrade within
    /// the handshake timeout.
    #[error("handshake with {peer} timed out")]
    HandshakeTimeout { peer: String },

    #[cfg(feature = "websocket")]
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Sending on a connection that is gone.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("transport shut down")]
    Shutdown,
}
