//! The room lifecycle state machine.
//!
//! ```text
//! Waiting ──→ Running ⇄ Paused
//!    │           │        │
//!    └───────────┴────────┴──→ Finished
//! ```
//!
//! `Finished` is terminal. A room can finish from any other state: a
//! forced step or a player leaving ends a room that never started.

use std::fmt;

use serde::Serialize;

/// The lifecycle state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    /// Slots are still being filled.
    Waiting,
    /// Every slot is bound and the turn clock is running.
    Running,
    /// The game is suspended. The turn clock keeps its remaining budget.
    Paused,
    /// A result has been produced. Terminal.
    Finished,
}

impl RoomState {
    /// Returns `true` if the room still accepts players.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` once the game has started and has not ended.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns `true` if moving from `self` to `target` is a legal edge.
    pub fn can_transition_to(self, target: Self) -> bool {
        use RoomState::*;
        matches!(
            (self, target),
            (Waiting, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Waiting | Running | Paused, Finished)
        )
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}
