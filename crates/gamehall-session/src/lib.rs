//! Connection sessions for Gamehall.
//!
//! This crate handles everything between "a connection was accepted" and
//! "a decoded request reached the lobby":
//!
//! 1. **Sessions**: one [`Session`] per connection: roles, an outbound
//!    queue, and exactly-once disconnect notification
//! 2. **Dispatch**: the [`RequestHandler`] trait and the
//!    [`PacketCallback`] acknowledgment every request must receive
//! 3. **Roles**: [`Role`] variants and the authorization functions in
//!    [`role`]
//! 4. **Authentication**: the [`Authenticator`] trait and
//!    [`SharedSecret`]
//! 5. **Tracking**: [`SessionManager`], which accepts connections and
//!    publishes [`SessionEvent`]s
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby (above)  ← implements RequestHandler, listens to SessionEvents
//!     ↕
//! Session Layer (this crate)  ← decodes, dispatches, tracks roles
//!     ↕
//! Protocol + Transport (below)  ← Request/Response types, connections
//! ```

mod auth;
mod error;
mod manager;
pub mod role;
mod session;

pub use auth::{Authenticator, SharedSecret};
pub use error::SessionError;
pub use manager::{SessionEvent, SessionManager};
pub use role::Role;
pub use session::{
    DisconnectReason, PacketCallback, RequestHandler, Session, SessionId,
};
