//! Rooms for Gamehall.
//!
//! A room is one game instance: its slots, the sessions bound to them,
//! its observers, and the [`GameLogic`] module that owns the rules. This
//! crate provides:
//!
//! 1. **[`GameLogic`]**: the trait game modules implement
//! 2. **[`TurnDriver`]**: turn order, action validation, deadlines, and
//!    scoring for games that end early
//! 3. **Room actors**: one Tokio task per room, reached via [`RoomHandle`]
//! 4. **[`RoomManager`]**: matchmaking, prepared games, and lookups
//! 5. **[`ReservationRegistry`]**: one-time tokens for prepared slots
//! 6. **[`ScoreLedger`]**: per-player totals over finished games
//!
//! # Room lifecycle
//!
//! ```text
//! Waiting ──(last slot bound)──→ Running ⇄ Paused ──→ Finished
//! ```
//!
//! See [`RoomState`] for the full set of transitions.

mod driver;
mod error;
mod logic;
mod manager;
mod registry;
mod reservation;
mod room;
mod scores;
mod state;

pub use driver::{Progress, TurnDriver};
pub use error::RoomError;
pub use logic::GameLogic;
pub use manager::{DEFAULT_CHANNEL_SIZE, RoomManager};
pub use registry::GameRegistry;
pub use reservation::{Reservation, ReservationRegistry};
pub use room::{RoomHandle, RoomInfo};
pub use scores::ScoreLedger;
pub use state::RoomState;
