//! Room actor: an isolated Tokio task that owns one game instance.
//!
//! Each room runs in its own task and is reached only through its
//! command channel. Every mutation of the room is processed one at a time
//! by that task, so the room never needs a lock.
//!
//! The turn deadline is a branch of the actor's `select!`, racing the
//! command channel. When the room is paused or finished the clock has no
//! deadline and the branch never fires.

use std::sync::Arc;

use gamehall_protocol::{
    GameAction, Response, RoomEvent, RoomId, SlotDescriptor, SlotIndex,
    TerminationCause,
};
use gamehall_session::{Role, Session, SessionId};
use gamehall_timeout::ActionTimeout;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::driver::{Progress, TurnDriver};
use crate::{GameLogic, RoomError, RoomState, ScoreLedger};

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    /// Bind a session to `slot`, or to the first free unreserved slot.
    Bind {
        session: Arc<Session>,
        slot: Option<SlotIndex>,
        reply: Reply<SlotIndex>,
    },

    /// An action from whichever slot `session_id` is bound to.
    Action {
        session_id: SessionId,
        action: GameAction,
        reply: Reply<()>,
    },

    Observe {
        session: Arc<Session>,
        reply: Reply<()>,
    },

    Pause {
        paused: bool,
        reply: Reply<()>,
    },

    Step {
        forced: bool,
        reply: Reply<()>,
    },

    Cancel {
        reply: Reply<()>,
    },

    /// Change whether `slot` loses on its hard deadline.
    ControlTimeout {
        slot: SlotIndex,
        activate: bool,
        reply: Reply<()>,
    },

    /// The session disconnected. Players forfeit; observers are dropped.
    Leave {
        session_id: SessionId,
        reply: Reply<()>,
    },

    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },
}

/// Lifecycle changes a room reports to its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoomNotice {
    /// Every slot is bound; the room takes no more players.
    Started(RoomId),
    Finished(RoomId),
}

/// A snapshot of room metadata (not the game state itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub game_type: String,
    pub state: RoomState,
    /// Slots currently bound to a session.
    pub players: usize,
    pub capacity: usize,
    pub observers: usize,
}

/// Handle to a running room actor.
///
/// Cheap to clone. The actor stops once every handle is dropped.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    game_type: Arc<str>,
    sender: mpsc::Sender<RoomCommand>,
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("room_id", &self.room_id)
            .field("game_type", &self.game_type)
            .finish()
    }
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn game_type(&self) -> &str {
        &self.game_type
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    /// Binds `session` as a player and returns its slot.
    ///
    /// The room sends `Joined` to the session itself, so it arrives
    /// before any broadcast the bind triggers.
    pub async fn bind(
        &self,
        session: Arc<Session>,
        slot: Option<SlotIndex>,
    ) -> Result<SlotIndex, RoomError> {
        self.request(|reply| RoomCommand::Bind {
            session,
            slot,
            reply,
        })
        .await
    }

    /// Submits an action on behalf of the session's slot.
    ///
    /// `Ok` means the action was processed, which includes the game
    /// ending because of it.
    pub async fn act(
        &self,
        session_id: SessionId,
        action: GameAction,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Action {
            session_id,
            action,
            reply,
        })
        .await
    }

    pub async fn observe(&self, session: Arc<Session>) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Observe { session, reply })
            .await
    }

    pub async fn pause(&self, paused: bool) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Pause { paused, reply })
            .await
    }

    pub async fn step(&self, forced: bool) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Step { forced, reply })
            .await
    }

    pub async fn cancel(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Cancel { reply }).await
    }

    /// Lets an administrator decide whether `slot` forfeits on its hard
    /// deadline or has the default action played for it.
    pub async fn control_timeout(
        &self,
        slot: SlotIndex,
        activate: bool,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::ControlTimeout {
            slot,
            activate,
            reply,
        })
        .await
    }

    pub async fn leave(&self, session_id: SessionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { session_id, reply })
            .await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::GetInfo { reply: reply_tx })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

/// Everything needed to spawn a room.
pub(crate) struct RoomSetup {
    pub room_id: RoomId,
    pub game_type: String,
    pub slots: Vec<SlotDescriptor>,
    /// Slots that can only be bound by redeeming a reservation.
    pub reserved: Vec<bool>,
    pub channel_size: usize,
    pub notices: mpsc::UnboundedSender<RoomNotice>,
    pub scores: Arc<ScoreLedger>,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<G: GameLogic> {
    room_id: RoomId,
    game_type: String,
    logic: Arc<G>,
    slots: Vec<SlotDescriptor>,
    reserved: Vec<bool>,
    bound: Vec<Option<Arc<Session>>>,
    observers: Vec<Arc<Session>>,
    state: RoomState,
    /// A pause requested before the game started.
    pause_requested: bool,
    /// Set when any descriptor asks for it. Only rooms in step mode
    /// accept `Step` while paused.
    step_mode: bool,
    /// One turn granted by `Step` while paused.
    step_permit: bool,
    driver: Option<TurnDriver<G>>,
    notices: mpsc::UnboundedSender<RoomNotice>,
    scores: Arc<ScoreLedger>,
}

impl<G: GameLogic> RoomActor<G> {
    /// Runs the actor loop until every handle is dropped.
    async fn run(mut self, mut receiver: mpsc::Receiver<RoomCommand>) {
        info!(room_id = %self.room_id, game_type = %self.game_type, "room actor started");

        loop {
            let clock = self
                .driver
                .as_ref()
                .map(|d| d.timeout().clone())
                .unwrap_or_else(ActionTimeout::new);

            tokio::select! {
                cmd = receiver.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                () = clock.expired() => self.handle_timeout(),
            }
        }

        info!(room_id = %self.room_id, "room actor stopped");
    }

    fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Bind {
                session,
                slot,
                reply,
            } => {
                let _ = reply.send(self.handle_bind(session, slot));
            }
            RoomCommand::Action {
                session_id,
                action,
                reply,
            } => {
                let _ = reply.send(self.handle_action(session_id, &action));
            }
            RoomCommand::Observe { session, reply } => {
                let _ = reply.send(self.handle_observe(session));
            }
            RoomCommand::Pause { paused, reply } => {
                let _ = reply.send(self.handle_pause(paused));
            }
            RoomCommand::Step { forced, reply } => {
                let _ = reply.send(self.handle_step(forced));
            }
            RoomCommand::Cancel { reply } => {
                let _ = reply.send(self.handle_cancel());
            }
            RoomCommand::ControlTimeout {
                slot,
                activate,
                reply,
            } => {
                let _ = reply.send(self.handle_control_timeout(slot, activate));
            }
            RoomCommand::Leave { session_id, reply } => {
                let _ = reply.send(self.handle_leave(session_id));
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
        }
    }

    fn finished(&self) -> Result<(), RoomError> {
        if self.state.is_finished() {
            Err(RoomError::GameFinished(self.room_id))
        } else {
            Ok(())
        }
    }

    fn slot_of(&self, session_id: SessionId) -> Option<SlotIndex> {
        self.bound
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.id() == session_id))
    }

    fn handle_bind(
        &mut self,
        session: Arc<Session>,
        slot: Option<SlotIndex>,
    ) -> Result<SlotIndex, RoomError> {
        self.finished()?;
        if !self.state.is_joinable() {
            return Err(RoomError::InvalidState(format!(
                "cannot join room {} in state {}",
                self.room_id, self.state
            )));
        }
        if self.slot_of(session.id()).is_some() {
            return Err(RoomError::InvalidState(format!(
                "session {} already plays in room {}",
                session.id(),
                self.room_id
            )));
        }

        let slot = match slot {
            Some(slot) if slot < self.bound.len() && self.bound[slot].is_none() => slot,
            Some(slot) => {
                return Err(RoomError::InvalidState(format!(
                    "slot {slot} of room {} is not available",
                    self.room_id
                )));
            }
            None => (0..self.bound.len())
                .find(|&s| self.bound[s].is_none() && !self.reserved[s])
                .ok_or(RoomError::RoomFull(self.room_id))?,
        };

        session.add_role(Role::Player {
            room_id: self.room_id,
            slot,
        });
        session.send(Response::Joined {
            room_id: self.room_id,
            slot,
            game_type: self.game_type.clone(),
        });
        self.bound[slot] = Some(session);

        let players = self.bound.iter().flatten().count();
        info!(room_id = %self.room_id, slot, players, "player bound");

        if players == self.bound.len() {
            self.start();
        }
        Ok(slot)
    }

    fn start(&mut self) {
        let mut driver = TurnDriver::new(
            self.room_id,
            Arc::clone(&self.logic),
            self.slots.clone(),
        );
        let paused = self.pause_requested || self.step_mode;
        if paused {
            driver.pause_clock();
        }
        driver.start();
        self.driver = Some(driver);
        self.set_state(RoomState::Running);
        let _ = self.notices.send(RoomNotice::Started(self.room_id));

        for (slot, session) in self.bound.iter().enumerate() {
            if let Some(session) = session {
                session.send(Response::Room {
                    room_id: self.room_id,
                    event: RoomEvent::Welcome {
                        slot,
                        display_name: self.slots[slot].display_name.clone(),
                    },
                });
            }
        }
        self.broadcast_snapshot();

        if paused {
            self.set_state(RoomState::Paused);
            self.broadcast(RoomEvent::Paused { paused: true });
        }
    }

    fn handle_action(
        &mut self,
        session_id: SessionId,
        action: &GameAction,
    ) -> Result<(), RoomError> {
        self.finished()?;
        let slot = self
            .slot_of(session_id)
            .ok_or(RoomError::NotInRoom(self.room_id))?;
        if self.state.is_joinable() {
            return Err(RoomError::InvalidState(format!(
                "room {} is still waiting for players",
                self.room_id
            )));
        }
        if self.state == RoomState::Paused && !self.step_permit {
            return Err(RoomError::Paused(self.room_id));
        }
        let Some(driver) = self.driver.as_mut() else {
            return Err(RoomError::InvalidState("game has not started".into()));
        };

        let progress = driver.on_action(slot, action)?;
        debug!(room_id = %self.room_id, slot, kind = %action.kind, ?progress, "action processed");
        self.after_turn(progress);
        Ok(())
    }

    fn handle_timeout(&mut self) {
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        let slot = driver.slot_to_move();
        let progress = driver.on_timeout();
        if progress != Progress::Idle {
            info!(room_id = %self.room_id, slot, ?progress, "turn deadline passed");
        }
        self.after_turn(progress);
    }

    /// Broadcasts the outcome of a turn and closes a granted step.
    fn after_turn(&mut self, progress: Progress) {
        match progress {
            Progress::Finished => {
                self.finish();
                return;
            }
            Progress::Advanced => self.broadcast_snapshot(),
            Progress::Stalled => {
                warn!(room_id = %self.room_id, "game stalled until cancelled");
            }
            Progress::Idle => return,
        }
        if self.state == RoomState::Paused && self.step_permit {
            self.step_permit = false;
            if let Some(driver) = self.driver.as_mut() {
                driver.pause_clock();
            }
        }
    }

    fn handle_observe(&mut self, session: Arc<Session>) -> Result<(), RoomError> {
        self.finished()?;
        if !self.observers.iter().any(|o| o.id() == session.id()) {
            self.observers.push(Arc::clone(&session));
        }
        session.add_role(Role::Observer {
            room_id: self.room_id,
        });
        session.send(Response::Observing {
            room_id: self.room_id,
        });
        if let Some(driver) = &self.driver {
            session.send(Response::Room {
                room_id: self.room_id,
                event: driver.snapshot(),
            });
            if self.state == RoomState::Paused {
                session.send(Response::Room {
                    room_id: self.room_id,
                    event: RoomEvent::Paused { paused: true },
                });
            }
        }
        info!(room_id = %self.room_id, session_id = %session.id(), "observer added");
        Ok(())
    }

    fn handle_pause(&mut self, paused: bool) -> Result<(), RoomError> {
        self.finished()?;
        match (self.state, paused) {
            (RoomState::Waiting, _) => {
                self.pause_requested = paused;
                debug!(room_id = %self.room_id, paused, "pause remembered until start");
            }
            (RoomState::Running, true) => {
                if let Some(driver) = self.driver.as_mut() {
                    driver.pause_clock();
                }
                self.set_state(RoomState::Paused);
                self.broadcast(RoomEvent::Paused { paused: true });
            }
            (RoomState::Paused, false) => {
                self.step_permit = false;
                self.pause_requested = false;
                if let Some(driver) = self.driver.as_mut() {
                    driver.resume_clock();
                }
                self.set_state(RoomState::Running);
                self.broadcast(RoomEvent::Paused { paused: false });
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_step(&mut self, forced: bool) -> Result<(), RoomError> {
        self.finished()?;
        match self.state {
            RoomState::Waiting if forced => {
                let unbound: Vec<SlotIndex> = (0..self.bound.len())
                    .filter(|&s| self.bound[s].is_none())
                    .collect();
                info!(room_id = %self.room_id, ?unbound, "forced step on waiting room");
                self.driver_mut().forfeit(
                    &unbound,
                    TerminationCause::Left,
                    "game forced to start without all players",
                );
                self.finish();
                Ok(())
            }
            RoomState::Waiting => Err(RoomError::InvalidState(format!(
                "room {} is still waiting for players",
                self.room_id
            ))),
            RoomState::Paused if self.step_mode => {
                if !self.step_permit {
                    self.step_permit = true;
                    if let Some(driver) = self.driver.as_mut() {
                        driver.resume_clock();
                    }
                    debug!(room_id = %self.room_id, "step granted");
                }
                Ok(())
            }
            state => Err(RoomError::InvalidState(format!(
                "cannot step room {} in state {state}{}",
                self.room_id,
                if self.step_mode { "" } else { " without step mode" }
            ))),
        }
    }

    fn handle_cancel(&mut self) -> Result<(), RoomError> {
        self.finished()?;
        self.driver_mut().cancel();
        self.finish();
        Ok(())
    }

    fn handle_control_timeout(
        &mut self,
        slot: SlotIndex,
        activate: bool,
    ) -> Result<(), RoomError> {
        self.finished()?;
        let Some(descriptor) = self.slots.get_mut(slot) else {
            return Err(RoomError::InvalidState(format!(
                "room {} has no slot {slot}",
                self.room_id
            )));
        };
        descriptor.can_timeout = activate;
        if let Some(driver) = self.driver.as_mut() {
            driver.set_can_timeout(slot, activate);
        }
        info!(room_id = %self.room_id, slot, activate, "slot timeout control changed");
        Ok(())
    }

    fn handle_leave(&mut self, session_id: SessionId) -> Result<(), RoomError> {
        self.finished()?;
        if let Some(pos) = self.observers.iter().position(|o| o.id() == session_id) {
            let observer = self.observers.remove(pos);
            observer.drop_room_roles(self.room_id);
            debug!(room_id = %self.room_id, %session_id, "observer left");
            return Ok(());
        }

        let slot = self
            .slot_of(session_id)
            .ok_or(RoomError::NotInRoom(self.room_id))?;
        info!(room_id = %self.room_id, slot, state = %self.state, "player left");

        if self.state.is_joinable() {
            // Slots nobody took are forfeited along with the leaver.
            let mut losers: Vec<SlotIndex> = (0..self.bound.len())
                .filter(|&s| self.bound[s].is_none())
                .collect();
            losers.push(slot);
            let name = self.slots[slot].display_name.clone();
            self.driver_mut().forfeit(
                &losers,
                TerminationCause::Left,
                format!("{name} left the game"),
            );
        } else {
            self.driver_mut().player_left(slot);
        }
        self.finish();
        Ok(())
    }

    /// The driver, created unstarted for rooms that end before starting.
    fn driver_mut(&mut self) -> &mut TurnDriver<G> {
        self.driver.get_or_insert_with(|| {
            TurnDriver::new(self.room_id, Arc::clone(&self.logic), self.slots.clone())
        })
    }

    fn finish(&mut self) {
        let Some(result) = self.driver.as_ref().and_then(TurnDriver::result) else {
            return;
        };
        self.set_state(RoomState::Finished);
        self.step_permit = false;
        info!(
            room_id = %self.room_id,
            winner = ?result.winner,
            cause = %result.cause,
            reason = %result.reason,
            "game finished"
        );

        self.scores.record(&result);
        self.broadcast(RoomEvent::Result(result));
        for session in self.participants() {
            session.drop_room_roles(self.room_id);
            session.send(Response::Left {
                room_id: self.room_id,
            });
        }
        self.bound.iter_mut().for_each(|s| *s = None);
        self.observers.clear();
        let _ = self.notices.send(RoomNotice::Finished(self.room_id));
    }

    fn set_state(&mut self, next: RoomState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        debug!(room_id = %self.room_id, from = %self.state, to = %next, "room state changed");
        self.state = next;
    }

    fn participants(&self) -> impl Iterator<Item = &Arc<Session>> {
        self.bound.iter().flatten().chain(self.observers.iter())
    }

    fn broadcast(&self, event: RoomEvent) {
        for session in self.participants() {
            session.send(Response::Room {
                room_id: self.room_id,
                event: event.clone(),
            });
        }
    }

    fn broadcast_snapshot(&self) {
        if let Some(driver) = &self.driver {
            self.broadcast(driver.snapshot());
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id,
            game_type: self.game_type.clone(),
            state: self.state,
            players: self.bound.iter().flatten().count(),
            capacity: self.bound.len(),
            observers: self.observers.len(),
        }
    }
}

/// Spawns a new room actor task and returns a handle to communicate with it.
pub(crate) fn spawn_room<G: GameLogic>(logic: Arc<G>, setup: RoomSetup) -> RoomHandle {
    let (tx, rx) = mpsc::channel(setup.channel_size.max(1));
    let step_mode = setup.slots.iter().any(|d| d.should_be_paused);
    let bound = vec![None; setup.slots.len()];

    let handle = RoomHandle {
        room_id: setup.room_id,
        game_type: Arc::from(setup.game_type.as_str()),
        sender: tx,
    };

    let actor = RoomActor {
        room_id: setup.room_id,
        game_type: setup.game_type,
        logic,
        slots: setup.slots,
        reserved: setup.reserved,
        bound,
        observers: Vec::new(),
        state: RoomState::Waiting,
        pause_requested: false,
        step_mode,
        step_permit: false,
        driver: None,
        notices: setup.notices,
        scores: setup.scores,
    };
    tokio::spawn(actor.run(rx));

    handle
}
