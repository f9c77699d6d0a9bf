//! Error types for the room layer.

use gamehall_protocol::{RoomId, SlotIndex};

/// Errors that can occur during room operations.
///
/// Every variant is reported back to the requesting client. None of them
/// is fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// Every slot is bound or reserved.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// More slot descriptors than the game has slots.
    #[error("too many players: {requested} requested, game supports {capacity}")]
    TooManyPlayers { requested: usize, capacity: usize },

    /// The reservation token is unknown or was already used.
    #[error("reservation token is invalid or already redeemed")]
    ReservationInvalid,

    /// An action arrived from a slot that is not the one to move.
    #[error("not your turn: slot {expected} is to move, got slot {got}")]
    NotYourTurn { expected: SlotIndex, got: SlotIndex },

    /// The game in this room has already ended.
    #[error("game in room {0} has already finished")]
    GameFinished(RoomId),

    /// The room is paused and no step was granted.
    #[error("room {0} is paused")]
    Paused(RoomId),

    /// The session is neither a player nor an observer of the room.
    #[error("not a participant of room {0}")]
    NotInRoom(RoomId),

    /// No game module is registered under this name.
    #[error("unknown game type {0:?}")]
    UnknownGameType(String),

    /// The room is in a state that doesn't allow this operation.
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),

    /// The room's command channel is full or closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// No finished game was recorded for this display name.
    #[error("no score recorded for {0:?}")]
    UnknownPlayer(String),

    /// The manager was shut down and opens no more rooms.
    #[error("server is shutting down")]
    ShuttingDown,
}
