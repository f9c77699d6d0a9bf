//! Game modules registered by name.
//!
//! A [`GameRegistry`] maps a game type (the string clients put in
//! `JoinRoom` and `PrepareGame`) to the module that implements it. Each
//! module is type-erased behind [`GameFactory`] so one server can host
//! games with different state types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::GameLogic;
use crate::room::{RoomHandle, RoomSetup, spawn_room};

/// Spawns rooms for one game type.
pub(crate) trait GameFactory: Send + Sync {
    fn capacity(&self) -> usize;
    fn spawn(&self, setup: RoomSetup) -> RoomHandle;
}

struct Plugin<G>(Arc<G>);

impl<G: GameLogic> GameFactory for Plugin<G> {
    fn capacity(&self) -> usize {
        self.0.player_count()
    }

    fn spawn(&self, setup: RoomSetup) -> RoomHandle {
        spawn_room(Arc::clone(&self.0), setup)
    }
}

/// The set of game types a server offers.
#[derive(Clone, Default)]
pub struct GameRegistry {
    games: BTreeMap<String, Arc<dyn GameFactory>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `logic` under `game_type`, replacing any module already
    /// registered under that name.
    pub fn register<G: GameLogic>(&mut self, game_type: impl Into<String>, logic: G) {
        let game_type = game_type.into();
        tracing::info!(%game_type, slots = logic.player_count(), "game registered");
        self.games.insert(game_type, Arc::new(Plugin(Arc::new(logic))));
    }

    pub(crate) fn get(&self, game_type: &str) -> Option<&Arc<dyn GameFactory>> {
        self.games.get(game_type)
    }

    pub fn contains(&self, game_type: &str) -> bool {
        self.games.contains_key(game_type)
    }

    /// Slot count of a registered game type.
    pub fn capacity(&self, game_type: &str) -> Option<usize> {
        self.games.get(game_type).map(|g| g.capacity())
    }

    /// Registered game types in name order.
    pub fn game_types(&self) -> impl Iterator<Item = &str> {
        self.games.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

impl fmt::Debug for GameRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.games.keys()).finish()
    }
}
