//! # Gamehall
//!
//! A server for turn-based multiplayer games.
//!
//! Game modules implement a single [`GameLogic`] trait. Gamehall handles
//! the rest: connections, matchmaking, prepared games with reservation
//! tokens, turn order, per-turn deadlines, pausing and stepping, observers,
//! and reporting the result.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gamehall::prelude::*;
//!
//! # async fn run<G: GameLogic>(game: G) -> Result<(), GamehallError> {
//! let config = ServerConfig::from_env()?;
//! gamehall::logging::init(config.debug);
//!
//! let secret = SharedSecret::new(config.admin_secret.clone());
//! let server = GamehallServer::builder()
//!     .config(config)
//!     .game("my-game", game)
//!     .build(secret)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod lobby;
pub mod logging;
mod server;

pub use config::{ADMIN_SECRET_ENV, CONFIG_ENV, ServerConfig};
pub use error::GamehallError;
pub use lobby::Lobby;
pub use server::{GamehallServer, GamehallServerBuilder};

/// Everything a game module and its launcher need.
pub mod prelude {
    pub use crate::{GamehallError, GamehallServer, ServerConfig};
    pub use gamehall_protocol::{
        GameAction, GameResult, PlayerScore, Request, Response, RoomEvent,
        RoomId, SlotDescriptor, SlotIndex, SlotScore, TerminationCause,
    };
    pub use gamehall_room::{GameLogic, RoomError, RoomState};
    pub use gamehall_session::{Authenticator, SessionError, SharedSecret};
    pub use gamehall_timeout::TimeoutPolicy;
}
