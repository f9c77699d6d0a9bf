//! Core protocol types for Gamehall's wire format.
//!
//! Every type in this module is serialized by a [`Codec`](crate::Codec)
//! and sent over a connection. Requests and responses are internally
//! tagged (`{"type": "JoinRoom", ...}`) so client code can switch on a
//! single field.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a room (one game instance).
///
/// Serialized as a plain number; displayed as `R-<n>` in logs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// Zero-based position of a participant inside a room.
pub type SlotIndex = usize;

// ---------------------------------------------------------------------------
// Slot descriptors
// ---------------------------------------------------------------------------

/// Describes one slot of an explicitly prepared room.
///
/// Missing flags default to `true`, so `{"display_name": "alice"}` is a
/// complete descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDescriptor {
    /// Name shown to other participants and in the final result.
    pub display_name: String,

    /// Whether missing the hard deadline costs this slot the game.
    /// When `false`, the game's default action is played instead.
    #[serde(default = "default_true")]
    pub can_timeout: bool,

    /// Whether the room should start paused (and in step mode).
    #[serde(default = "default_true")]
    pub should_be_paused: bool,
}

fn default_true() -> bool {
    true
}

impl SlotDescriptor {
    /// A descriptor with the given name and both flags set.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            can_timeout: true,
            should_be_paused: true,
        }
    }

    /// The descriptor used for slots filled through matchmaking:
    /// times out normally and never pauses the room.
    pub fn open(slot: SlotIndex) -> Self {
        Self {
            display_name: format!("player-{slot}"),
            can_timeout: true,
            should_be_paused: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Game actions and results
// ---------------------------------------------------------------------------

/// A player's move, opaque to the core apart from its `kind`.
///
/// The turn driver compares `kind` against what the game logic currently
/// expects; `data` is only ever interpreted by the game logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAction {
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl GameAction {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Why a game ended, or why a particular slot lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    /// The game logic reported the game as over.
    Regular,
    /// A participant disconnected (or never showed up).
    Left,
    /// A participant sent an action of the wrong kind or an illegal move.
    RuleViolation,
    /// A move arrived after the slot's soft deadline.
    SoftTimeout,
    /// No move arrived before the slot's hard deadline.
    HardTimeout,
    /// An administrator cancelled the game.
    Cancelled,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Regular => "regular",
            Self::Left => "left",
            Self::RuleViolation => "rule violation",
            Self::SoftTimeout => "soft timeout",
            Self::HardTimeout => "hard timeout",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Final score line for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotScore {
    pub slot: SlotIndex,
    pub display_name: String,
    pub score: i64,
    /// `Regular` unless this slot was charged with the termination.
    pub cause: TerminationCause,
}

/// The outcome of a finished game, broadcast to every participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    /// `None` for a draw or a cancelled game.
    pub winner: Option<SlotIndex>,
    pub cause: TerminationCause,
    /// Human-readable explanation.
    pub reason: String,
    pub scores: Vec<SlotScore>,
}

/// Totals over every finished, uncancelled game a display name played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub display_name: String,
    pub games: u64,
    pub wins: u64,
    /// Sum of the slot scores.
    pub total: i64,
}

// ---------------------------------------------------------------------------
// Requests (client → server)
// ---------------------------------------------------------------------------

/// Every request the lobby understands.
///
/// This is a closed set: the lobby matches on it exhaustively, so adding a
/// variant is a compile error until it is routed somewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Present the administrative secret.
    Authenticate { secret: String },

    /// Join the first waiting room of this game type, or open a new one.
    JoinRoom { game_type: String },

    /// Take the slot a reservation token points at.
    JoinPreparedRoom { token: String },

    /// Administrator: open a room with explicit slots and get one
    /// reservation token per described slot.
    PrepareGame {
        game_type: String,
        slots: Vec<SlotDescriptor>,
    },

    /// Administrator: invalidate an unredeemed reservation.
    FreeReservation { token: String },

    /// Administrator: start receiving a room's broadcasts.
    Observe { room_id: RoomId },

    /// Administrator or observer: pause or resume a room.
    PauseGame { room_id: RoomId, pause: bool },

    /// Administrator or observer: let a paused room advance one turn.
    /// `forced` also ends a room that is still waiting for players.
    Step {
        room_id: RoomId,
        #[serde(default)]
        forced: bool,
    },

    /// Administrator: finish a room immediately with no winner.
    Cancel { room_id: RoomId },

    /// Player: a move for the addressed room.
    RoomAction { room_id: RoomId, action: GameAction },

    /// Administrator: decide whether missing the hard deadline costs
    /// `slot` the game, or plays the default action instead.
    ControlTimeout {
        room_id: RoomId,
        slot: SlotIndex,
        activate: bool,
    },

    /// Administrator: look up the recorded score of a display name.
    PlayerScore { display_name: String },
}

// ---------------------------------------------------------------------------
// Responses (server → client)
// ---------------------------------------------------------------------------

/// Something that happened inside a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomEvent {
    /// Sent to each player when the game starts.
    Welcome {
        slot: SlotIndex,
        display_name: String,
    },

    /// A state snapshot after the start and after every accepted action.
    State {
        turn: u64,
        slot_to_move: SlotIndex,
        state: serde_json::Value,
    },

    /// The room was paused or resumed.
    Paused { paused: bool },

    /// The game ended.
    Result(GameResult),
}

/// Every message the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// The session now holds the administrator role.
    Authenticated,

    /// The session was bound to a slot.
    Joined {
        room_id: RoomId,
        slot: SlotIndex,
        game_type: String,
    },

    /// Reply to `PrepareGame`: tokens are in slot order.
    GamePrepared {
        room_id: RoomId,
        reservations: Vec<String>,
    },

    /// The session now observes a room.
    Observing { room_id: RoomId },

    /// Sent to administrators whenever a player takes a slot.
    PlayerJoined {
        room_id: RoomId,
        slot: SlotIndex,
        game_type: String,
    },

    /// An event from a room the session plays in or observes.
    Room { room_id: RoomId, event: RoomEvent },

    /// The room finished; no more events will follow for it.
    Left { room_id: RoomId },

    /// Reply to `PlayerScore`.
    PlayerScore(PlayerScore),

    /// A request failed. `request` echoes the offending request when it
    /// could be decoded.
    Error {
        message: String,
        request: Option<Request>,
    },
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The JSON shape is the contract with client code, so these tests pin
    //! the serde attributes rather than round-tripping every variant.

    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&RoomId(99)).unwrap();
        assert_eq!(json, "99");
    }

    #[test]
    fn test_room_id_display() {
        assert_eq!(RoomId(3).to_string(), "R-3");
    }

    #[test]
    fn test_slot_descriptor_missing_flags_default_to_true() {
        let d: SlotDescriptor =
            serde_json::from_value(json!({ "display_name": "alice" }))
                .unwrap();
        assert_eq!(d, SlotDescriptor::new("alice"));
        assert!(d.can_timeout);
        assert!(d.should_be_paused);
    }

    #[test]
    fn test_slot_descriptor_open_never_pauses() {
        let d = SlotDescriptor::open(1);
        assert_eq!(d.display_name, "player-1");
        assert!(!d.should_be_paused);
    }

    #[test]
    fn test_request_prepare_game_json_format() {
        let json = json!({
            "type": "PrepareGame",
            "game_type": "tic-tac-toe",
            "slots": [
                { "display_name": "a", "can_timeout": false },
                { "display_name": "b", "should_be_paused": false }
            ]
        });
        let req: Request = serde_json::from_value(json).unwrap();

        match req {
            Request::PrepareGame { game_type, slots } => {
                assert_eq!(game_type, "tic-tac-toe");
                assert!(!slots[0].can_timeout);
                assert!(slots[0].should_be_paused);
                assert!(!slots[1].should_be_paused);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_request_step_forced_defaults_to_false() {
        let req: Request =
            serde_json::from_value(json!({ "type": "Step", "room_id": 4 }))
                .unwrap();
        assert_eq!(
            req,
            Request::Step {
                room_id: RoomId(4),
                forced: false
            }
        );
    }

    #[test]
    fn test_request_room_action_json_format() {
        let req = Request::RoomAction {
            room_id: RoomId(2),
            action: GameAction::new("move", json!({ "cell": 4 })),
        };
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["type"], "RoomAction");
        assert_eq!(value["room_id"], 2);
        assert_eq!(value["action"]["kind"], "move");
        assert_eq!(value["action"]["data"]["cell"], 4);
    }

    #[test]
    fn test_request_unknown_type_returns_error() {
        let result: Result<Request, _> =
            serde_json::from_value(json!({ "type": "FlyToMoon" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_response_room_result_json_format() {
        let resp = Response::Room {
            room_id: RoomId(1),
            event: RoomEvent::Result(GameResult {
                winner: Some(1),
                cause: TerminationCause::RuleViolation,
                reason: "slot 0 violated the rules".into(),
                scores: vec![SlotScore {
                    slot: 0,
                    display_name: "a".into(),
                    score: 0,
                    cause: TerminationCause::RuleViolation,
                }],
            }),
        };
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["type"], "Room");
        assert_eq!(value["event"]["type"], "Result");
        assert_eq!(value["event"]["winner"], 1);
        assert_eq!(value["event"]["cause"], "rule_violation");
        assert_eq!(value["event"]["scores"][0]["cause"], "rule_violation");
    }

    #[test]
    fn test_response_error_echoes_request() {
        let resp = Response::Error {
            message: "room R-9 not found".into(),
            request: Some(Request::Cancel { room_id: RoomId(9) }),
        };
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["type"], "Error");
        assert_eq!(value["request"]["type"], "Cancel");
        assert_eq!(value["request"]["room_id"], 9);
    }

    #[test]
    fn test_request_control_timeout_json_format() {
        let req: Request = serde_json::from_value(json!({
            "type": "ControlTimeout",
            "room_id": 5,
            "slot": 1,
            "activate": false
        }))
        .unwrap();
        assert_eq!(
            req,
            Request::ControlTimeout {
                room_id: RoomId(5),
                slot: 1,
                activate: false
            }
        );
    }

    #[test]
    fn test_response_player_score_flattens_fields() {
        let resp = Response::PlayerScore(PlayerScore {
            display_name: "alice".into(),
            games: 3,
            wins: 2,
            total: 7,
        });
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["type"], "PlayerScore");
        assert_eq!(value["display_name"], "alice");
        assert_eq!(value["wins"], 2);
        assert_eq!(value["total"], 7);
    }

    #[test]
    fn test_termination_cause_display() {
        assert_eq!(TerminationCause::HardTimeout.to_string(), "hard timeout");
        assert_eq!(TerminationCause::Left.to_string(), "left");
    }
}
