//! Room manager: creates, tracks, and routes sessions to rooms.
//!
//! Rooms report when they start and when they finish over a channel. The
//! manager drains that channel before every lookup, so a started room
//! leaves matchmaking and a finished room disappears from the index, its
//! unused reservations freed, without any extra task.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use gamehall_protocol::{PlayerScore, RoomId, SlotDescriptor, SlotIndex};
use gamehall_session::Session;
use tokio::sync::{Mutex, mpsc};

use crate::room::{RoomNotice, RoomSetup};
use crate::{
    GameRegistry, ReservationRegistry, RoomError, RoomHandle, RoomInfo, ScoreLedger,
};

/// Default command channel size for room actors.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

struct RoomIndex {
    /// Open rooms. `RoomId`s increase, so iteration is creation order.
    rooms: BTreeMap<RoomId, RoomHandle>,
    /// Matchmade rooms that have not started yet.
    waiting: BTreeSet<RoomId>,
    notices: mpsc::UnboundedReceiver<RoomNotice>,
}

/// Owns every open room and the reservation tokens that lead to them.
///
/// The index lock is only held for bookkeeping. Matchmaking is
/// serialized by a lock of its own, held across the bind round-trips, so
/// two sessions joining at once cannot both decide to create a new room
/// while lookups keep going.
pub struct RoomManager {
    games: GameRegistry,
    reservations: ReservationRegistry,
    scores: Arc<ScoreLedger>,
    index: Mutex<RoomIndex>,
    matchmaking: Mutex<()>,
    notices_tx: mpsc::UnboundedSender<RoomNotice>,
    /// Ids below this were handed out. One that is no longer in the index
    /// belongs to a finished room.
    next_id: AtomicU64,
    shutting_down: AtomicBool,
    channel_size: usize,
}

impl RoomManager {
    pub fn new(games: GameRegistry) -> Self {
        Self::with_channel_size(games, DEFAULT_CHANNEL_SIZE)
    }

    pub fn with_channel_size(games: GameRegistry, channel_size: usize) -> Self {
        let (notices_tx, notices) = mpsc::unbounded_channel();
        Self {
            games,
            reservations: ReservationRegistry::new(),
            scores: Arc::new(ScoreLedger::new()),
            index: Mutex::new(RoomIndex {
                rooms: BTreeMap::new(),
                waiting: BTreeSet::new(),
                notices,
            }),
            matchmaking: Mutex::new(()),
            notices_tx,
            next_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            channel_size,
        }
    }

    pub fn games(&self) -> &GameRegistry {
        &self.games
    }

    pub fn reservations(&self) -> &ReservationRegistry {
        &self.reservations
    }

    pub fn scores(&self) -> &ScoreLedger {
        &self.scores
    }

    /// Totals recorded for `display_name` over its finished games.
    pub fn player_score(&self, display_name: &str) -> Result<PlayerScore, RoomError> {
        self.scores
            .get(display_name)
            .ok_or_else(|| RoomError::UnknownPlayer(display_name.to_string()))
    }

    fn prune(&self, index: &mut RoomIndex) {
        while let Ok(notice) = index.notices.try_recv() {
            match notice {
                RoomNotice::Started(room_id) => {
                    if index.waiting.remove(&room_id) {
                        tracing::debug!(%room_id, "room left matchmaking");
                    }
                }
                RoomNotice::Finished(room_id) => {
                    index.waiting.remove(&room_id);
                    index.rooms.remove(&room_id);
                    let freed = self.reservations.free_room(room_id);
                    tracing::info!(%room_id, freed, "room removed");
                }
            }
        }
    }

    fn create(
        &self,
        index: &mut RoomIndex,
        game_type: &str,
        slots: Vec<SlotDescriptor>,
        reserved: Vec<bool>,
    ) -> Result<RoomHandle, RoomError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(RoomError::ShuttingDown);
        }
        let factory = self
            .games
            .get(game_type)
            .ok_or_else(|| RoomError::UnknownGameType(game_type.to_string()))?;
        let room_id = RoomId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = factory.spawn(RoomSetup {
            room_id,
            game_type: game_type.to_string(),
            slots,
            reserved,
            channel_size: self.channel_size,
            notices: self.notices_tx.clone(),
            scores: Arc::clone(&self.scores),
        });
        index.rooms.insert(room_id, handle.clone());
        tracing::info!(%room_id, %game_type, "room created");
        Ok(handle)
    }

    /// Seats `session` in the oldest matchmade room of `game_type` that is
    /// still waiting for players, creating a room when there is none.
    ///
    /// Prepared rooms are never offered here.
    pub async fn join_or_create(
        &self,
        session: &Arc<Session>,
        game_type: &str,
    ) -> Result<(RoomId, SlotIndex), RoomError> {
        let capacity = self
            .games
            .capacity(game_type)
            .ok_or_else(|| RoomError::UnknownGameType(game_type.to_string()))?;

        let _matchmaking = self.matchmaking.lock().await;
        let candidates: Vec<RoomHandle> = {
            let mut index = self.index.lock().await;
            self.prune(&mut index);
            index
                .waiting
                .iter()
                .filter_map(|room_id| index.rooms.get(room_id))
                .filter(|h| h.game_type() == game_type)
                .cloned()
                .collect()
        };
        for handle in candidates {
            match handle.bind(Arc::clone(session), None).await {
                Ok(slot) => return Ok((handle.room_id(), slot)),
                Err(e) => {
                    tracing::trace!(room_id = %handle.room_id(), error = %e, "room skipped");
                }
            }
        }

        let handle = {
            let mut index = self.index.lock().await;
            self.prune(&mut index);
            let slots = (0..capacity).map(SlotDescriptor::open).collect();
            let handle = self.create(&mut index, game_type, slots, vec![false; capacity])?;
            index.waiting.insert(handle.room_id());
            handle
        };
        let slot = handle.bind(Arc::clone(session), None).await?;
        Ok((handle.room_id(), slot))
    }

    /// Creates a room in which every slot is reserved and returns one
    /// token per slot, in slot order.
    ///
    /// When fewer descriptors than the game has slots are given, the rest
    /// are filled with default descriptors. They are reserved too, so the
    /// room never takes players through matchmaking.
    pub async fn prepare_game(
        &self,
        game_type: &str,
        descriptors: Vec<SlotDescriptor>,
    ) -> Result<(RoomId, Vec<String>), RoomError> {
        let capacity = self
            .games
            .capacity(game_type)
            .ok_or_else(|| RoomError::UnknownGameType(game_type.to_string()))?;
        if descriptors.len() > capacity {
            return Err(RoomError::TooManyPlayers {
                requested: descriptors.len(),
                capacity,
            });
        }

        let described = descriptors.len();
        let mut slots = descriptors;
        slots.extend((described..capacity).map(SlotDescriptor::open));

        let handle = {
            let mut index = self.index.lock().await;
            self.prune(&mut index);
            self.create(&mut index, game_type, slots, vec![true; capacity])?
        };
        let room_id = handle.room_id();

        let tokens = (0..capacity)
            .map(|slot| self.reservations.issue(room_id, slot))
            .collect();
        tracing::info!(%room_id, %game_type, described, padded = capacity - described, "game prepared");
        Ok((room_id, tokens))
    }

    /// Binds `session` to the slot `token` was issued for.
    ///
    /// The token is consumed even if the bind then fails.
    pub async fn redeem_reservation(
        &self,
        session: &Arc<Session>,
        token: &str,
    ) -> Result<(RoomHandle, SlotIndex), RoomError> {
        let reservation = self.reservations.redeem(token)?;
        let handle = self.find_room(reservation.room_id).await?;
        let slot = handle
            .bind(Arc::clone(session), Some(reservation.slot))
            .await?;
        Ok((handle, slot))
    }

    /// Drops an unused token. Unknown tokens are ignored.
    pub fn free_reservation(&self, token: &str) -> bool {
        self.reservations.free(token)
    }

    pub async fn find_room(&self, room_id: RoomId) -> Result<RoomHandle, RoomError> {
        let mut index = self.index.lock().await;
        self.prune(&mut index);
        if let Some(handle) = index.rooms.get(&room_id) {
            return Ok(handle.clone());
        }
        if room_id.0 >= 1 && room_id.0 < self.next_id.load(Ordering::Relaxed) {
            Err(RoomError::GameFinished(room_id))
        } else {
            Err(RoomError::NotFound(room_id))
        }
    }

    pub async fn room_count(&self) -> usize {
        let mut index = self.index.lock().await;
        self.prune(&mut index);
        index.rooms.len()
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        let mut index = self.index.lock().await;
        self.prune(&mut index);
        index.rooms.keys().copied().collect()
    }

    /// Metadata of every open room that still answers.
    pub async fn room_infos(&self) -> Vec<RoomInfo> {
        let handles: Vec<RoomHandle> = {
            let mut index = self.index.lock().await;
            self.prune(&mut index);
            index.rooms.values().cloned().collect()
        };
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos
    }

    /// Cancels every open room and forgets all reservations. No room is
    /// created afterwards.
    ///
    /// Cancelled rooms broadcast their result before this returns.
    pub async fn shutdown(&self) {
        let mut index = self.index.lock().await;
        self.shutting_down.store(true, Ordering::Release);
        self.prune(&mut index);
        index.waiting.clear();
        let rooms = std::mem::take(&mut index.rooms);
        tracing::info!(rooms = rooms.len(), "cancelling open rooms");
        for (room_id, handle) in rooms {
            if let Err(e) = handle.cancel().await {
                tracing::debug!(%room_id, error = %e, "room not cancelled");
            }
        }
        self.reservations.clear();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
}
