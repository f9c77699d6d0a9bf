//! The `GameLogic` trait: the extension point for game modules.
//!
//! A game module owns the rules. The framework owns everything else:
//! turn order enforcement, deadlines, pausing, and producing the result.
//! Modules are registered once per game type and shared by every room of
//! that type, so all methods take `&self` and the mutable game data lives
//! in [`GameLogic::State`].

use gamehall_protocol::{GameAction, SlotDescriptor, SlotIndex};
use gamehall_timeout::TimeoutPolicy;
use serde::Serialize;

/// The core trait that game modules implement.
///
/// The framework calls `init` once when a room starts, then for each turn:
///
/// 1. asks `expected_action_kind` which action the slot to move must send
/// 2. passes a matching action to `apply`
/// 3. picks the next slot with `next_slot`
/// 4. checks `is_over`, and if so builds the result from `winner` and
///    `scores_for`
pub trait GameLogic: Send + Sync + 'static {
    /// The full game state. Serialized into every state broadcast.
    type State: Clone + Serialize + Send + Sync + 'static;

    /// Number of slots a room of this game has.
    fn player_count(&self) -> usize;

    /// Creates the initial state. `slots` has exactly `player_count`
    /// entries.
    fn init(&self, slots: &[SlotDescriptor]) -> Self::State;

    /// The action kind the slot to move must send next.
    fn expected_action_kind(&self, state: &Self::State) -> String;

    /// Applies an action of the expected kind from `slot`.
    ///
    /// Returns the new state, or a reason the action is illegal. An
    /// illegal action loses the game for `slot`.
    fn apply(
        &self,
        state: &Self::State,
        slot: SlotIndex,
        action: &GameAction,
    ) -> Result<Self::State, String>;

    fn is_over(&self, state: &Self::State) -> bool;

    /// The winner of a game that ended regularly, or `None` for a draw.
    fn winner(&self, state: &Self::State) -> Option<SlotIndex>;

    /// One score per slot, in slot order.
    fn scores_for(&self, state: &Self::State) -> Vec<i64>;

    /// Deadlines for `slot`'s turns.
    fn timeout_policy_for(&self, _slot: SlotIndex) -> TimeoutPolicy {
        TimeoutPolicy::default()
    }

    /// The slot to move after `acted` has moved. Default: round robin.
    fn next_slot(
        &self,
        _state: &Self::State,
        acted: SlotIndex,
        player_count: usize,
    ) -> SlotIndex {
        (acted + 1) % player_count.max(1)
    }

    /// The action played for a slot that cannot time out when its hard
    /// deadline passes. `None` leaves the turn open.
    fn default_action(
        &self,
        _state: &Self::State,
        _slot: SlotIndex,
    ) -> Option<GameAction> {
        None
    }
}
