//! Messages exchanged between Gamehall clients and the server.
//!
//! Clients send [`Request`]s and receive [`Response`]s. Everything a room
//! has to say travels inside [`Response::Room`] as a [`RoomEvent`], and a
//! finished game is summed up by a [`GameResult`]. Requests and responses
//! are tagged by a `"type"` field so a client can dispatch on it.
//!
//! Bytes become messages through a [`Codec`]; the server ships with
//! [`JsonCodec`].

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec, MAX_FRAME_LEN};
pub use error::ProtocolError;
pub use types::{
    GameAction, GameResult, PlayerScore, Request, Response, RoomEvent,
    RoomId, SlotDescriptor, SlotIndex, SlotScore, TerminationCause,
};
