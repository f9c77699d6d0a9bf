//! Error types for the session layer.

use gamehall_protocol::ProtocolError;
use gamehall_transport::TransportError;

/// Errors raised while serving a session.
///
/// A [`RequestHandler`](crate::RequestHandler) returning any of these makes
/// the session send an error response and drop the connection. The one
/// exception is [`AuthenticationFailed`](Self::AuthenticationFailed): the
/// lobby reports it without returning it, so the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The administrative secret did not match.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A privileged request arrived from a session without the role.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The handler returned without acknowledging the request.
    #[error("request was not processed")]
    UnprocessedRequest,

    /// The inbound frame could not be decoded into a known request.
    #[error("unknown request: {0}")]
    UnknownRequest(#[source] ProtocolError),

    /// The connection failed underneath the session.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
