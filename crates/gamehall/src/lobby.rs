//! The lobby: routes every decoded request to the service that owns it.
//!
//! Each request kind is matched exactly once, with no catch-all arm, so a
//! new request kind does not compile until the lobby handles it.
//!
//! # Outcomes
//!
//! | Outcome                         | Client sees            | Connection |
//! |---------------------------------|------------------------|------------|
//! | success                         | the request's response | open       |
//! | room error, failed authentication | `Error` echoing the request | open |
//! | privileged request without role | `Error` echoing the request | closed |

use std::sync::Arc;

use gamehall_protocol::{Request, Response, RoomId, SlotIndex};
use gamehall_room::{RoomError, RoomManager};
use gamehall_session::{
    Authenticator, PacketCallback, RequestHandler, Session, SessionError,
    SessionEvent, SessionManager, role,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Why a request was not carried out.
enum Rejection {
    /// Sent back to the client; the connection stays open.
    Reported(String),
    /// Ends the connection.
    Fatal(SessionError),
}

impl From<RoomError> for Rejection {
    fn from(e: RoomError) -> Self {
        Self::Reported(e.to_string())
    }
}

/// Dispatches requests and cleans up after disconnected sessions.
pub struct Lobby<A> {
    auth: A,
    rooms: Arc<RoomManager>,
    sessions: Arc<SessionManager>,
}

impl<A: Authenticator> Lobby<A> {
    pub fn new(auth: A, rooms: Arc<RoomManager>, sessions: Arc<SessionManager>) -> Self {
        Self {
            auth,
            rooms,
            sessions,
        }
    }

    async fn dispatch(
        &self,
        session: &Arc<Session>,
        request: &Request,
    ) -> Result<(), Rejection> {
        match request {
            Request::Authenticate { secret } => {
                session
                    .authenticate(&self.auth, secret)
                    .await
                    .map_err(|e| Rejection::Reported(e.to_string()))?;
                session.send(Response::Authenticated);
            }
            Request::JoinRoom { game_type } => {
                let (room_id, slot) = self.rooms.join_or_create(session, game_type).await?;
                self.announce_join(room_id, slot, game_type);
            }
            Request::JoinPreparedRoom { token } => {
                let (room, slot) = self.rooms.redeem_reservation(session, token).await?;
                self.announce_join(room.room_id(), slot, room.game_type());
            }
            Request::PrepareGame { game_type, slots } => {
                require_administrator(session, "PrepareGame")?;
                let (room_id, reservations) =
                    self.rooms.prepare_game(game_type, slots.clone()).await?;
                session.send(Response::GamePrepared {
                    room_id,
                    reservations,
                });
            }
            Request::FreeReservation { token } => {
                require_administrator(session, "FreeReservation")?;
                if !self.rooms.free_reservation(token) {
                    debug!(session_id = %session.id(), "freed reservation was unknown");
                }
            }
            Request::Observe { room_id } => {
                require_administrator(session, "Observe")?;
                self.rooms
                    .find_room(*room_id)
                    .await?
                    .observe(Arc::clone(session))
                    .await?;
            }
            Request::PauseGame { room_id, pause } => {
                require_control(session, *room_id, "PauseGame")?;
                self.rooms.find_room(*room_id).await?.pause(*pause).await?;
            }
            Request::Step { room_id, forced } => {
                require_control(session, *room_id, "Step")?;
                self.rooms.find_room(*room_id).await?.step(*forced).await?;
            }
            Request::Cancel { room_id } => {
                require_administrator(session, "Cancel")?;
                self.rooms.find_room(*room_id).await?.cancel().await?;
                info!(%room_id, session_id = %session.id(), "room cancelled");
            }
            Request::RoomAction { room_id, action } => {
                self.rooms
                    .find_room(*room_id)
                    .await?
                    .act(session.id(), action.clone())
                    .await?;
            }
            Request::ControlTimeout {
                room_id,
                slot,
                activate,
            } => {
                require_administrator(session, "ControlTimeout")?;
                self.rooms
                    .find_room(*room_id)
                    .await?
                    .control_timeout(*slot, *activate)
                    .await?;
            }
            Request::PlayerScore { display_name } => {
                require_administrator(session, "PlayerScore")?;
                let score = self.rooms.player_score(display_name)?;
                session.send(Response::PlayerScore(score));
            }
        }
        Ok(())
    }

    /// Tells every administrator that a player took a slot.
    fn announce_join(&self, room_id: RoomId, slot: SlotIndex, game_type: &str) {
        for admin in self.sessions.administrators() {
            admin.send(Response::PlayerJoined {
                room_id,
                slot,
                game_type: game_type.to_string(),
            });
        }
    }

    /// Consumes session events until the session manager goes away.
    ///
    /// A disconnected session leaves every room it was attached to: as a
    /// player it forfeits, as an observer it is dropped.
    pub async fn watch_sessions(
        rooms: Arc<RoomManager>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Connected(session) => {
                    trace!(session_id = %session.id(), "lobby saw connect");
                }
                SessionEvent::Disconnected { session, reason } => {
                    for room_id in role::attached_rooms(&session.roles()) {
                        let left = match rooms.find_room(room_id).await {
                            Ok(room) => room.leave(session.id()).await,
                            Err(e) => Err(e),
                        };
                        if let Err(e) = left {
                            debug!(%room_id, session_id = %session.id(), error = %e, "leave skipped");
                        }
                    }
                    debug!(session_id = %session.id(), %reason, "lobby released session");
                }
            }
        }
    }
}

impl<A: Authenticator> RequestHandler for Lobby<A> {
    async fn on_request(
        &self,
        session: &Arc<Session>,
        callback: &mut PacketCallback,
    ) -> Result<(), SessionError> {
        match self.dispatch(session, callback.request()).await {
            Ok(()) => {}
            Err(Rejection::Reported(message)) => {
                debug!(session_id = %session.id(), %message, "request rejected");
                session.send(Response::Error {
                    message,
                    request: Some(callback.request().clone()),
                });
            }
            Err(Rejection::Fatal(e)) => return Err(e),
        }
        callback.set_processed();
        Ok(())
    }
}

fn require_administrator(session: &Session, what: &str) -> Result<(), Rejection> {
    if session.is_administrator() {
        Ok(())
    } else {
        Err(Rejection::Fatal(SessionError::Unauthorized(format!(
            "{what} requires the administrator role"
        ))))
    }
}

fn require_control(session: &Session, room_id: RoomId, what: &str) -> Result<(), Rejection> {
    if role::can_control(&session.roles(), room_id) {
        Ok(())
    } else {
        Err(Rejection::Fatal(SessionError::Unauthorized(format!(
            "{what} on room {room_id} requires the administrator role or observing it"
        ))))
    }
}
