//! Unified error type for Gamehall.

use std::path::PathBuf;

use gamehall_protocol::ProtocolError;
use gamehall_room::RoomError;
use gamehall_session::SessionError;
use gamehall_transport::TransportError;

/// Everything a server can fail with.
///
/// Layer errors convert with `?`. At runtime only [`Transport`](Self::Transport)
/// from binding the listener escapes to the caller; the rest are handled per
/// session or per room and show up here when the layers are driven directly.
#[derive(Debug, thiserror::Error)]
pub enum GamehallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error_keeps_message() {
        let err: GamehallError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, GamehallError::Transport(_)));
        assert_eq!(err.to_string(), "connection closed: gone");
    }

    #[test]
    fn test_from_protocol_error_wraps() {
        let err: GamehallError = ProtocolError::EmptyFrame.into();
        assert!(matches!(err, GamehallError::Protocol(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn test_from_session_error_wraps() {
        let err: GamehallError = SessionError::AuthenticationFailed.into();
        assert!(matches!(err, GamehallError::Session(_)));
    }

    #[test]
    fn test_from_room_error_displays_room() {
        let err: GamehallError = RoomError::NotFound(gamehall_protocol::RoomId(1)).into();
        assert!(matches!(err, GamehallError::Room(_)));
        assert_eq!(err.to_string(), "room R-1 not found");
    }

    #[test]
    fn test_config_read_names_path() {
        let err = GamehallError::ConfigRead {
            path: PathBuf::from("/etc/gamehall.json"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("failed to read config /etc/gamehall.json"));
    }
}
