//! The round-based turn driver.
//!
//! [`TurnDriver`] wraps one game module instance and enforces everything
//! the module should not have to care about: whose turn it is, which
//! action kind is legal, the per-turn deadline, and how a game that ends
//! early is scored. It is plain synchronous state; the room actor owns it
//! and feeds it actions and timeout expiries one at a time.

use std::sync::Arc;

use gamehall_protocol::{
    GameAction, GameResult, RoomEvent, RoomId, SlotDescriptor, SlotIndex,
    SlotScore, TerminationCause,
};
use gamehall_timeout::ActionTimeout;
use tracing::{debug, warn};

use crate::{GameLogic, RoomError};

/// What handling an action or a deadline did to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The turn passed to the next slot.
    Advanced,
    /// The game ended. [`TurnDriver::result`] is now available.
    Finished,
    /// The deadline passed but nothing can be played. The clock is
    /// disarmed until the room is cancelled.
    Stalled,
    /// Nothing happened.
    Idle,
}

#[derive(Debug, Clone)]
struct Termination {
    winner: Option<SlotIndex>,
    cause: TerminationCause,
    reason: String,
}

/// Drives one game instance turn by turn.
pub struct TurnDriver<G: GameLogic> {
    room_id: RoomId,
    logic: Arc<G>,
    slots: Vec<SlotDescriptor>,
    state: G::State,
    turn: u64,
    slot_to_move: SlotIndex,
    /// Per-slot cause for slots that lost by violating, timing out, or
    /// leaving.
    charged: Vec<Option<TerminationCause>>,
    termination: Option<Termination>,
    timeout: ActionTimeout,
    /// The clock was disarmed because nothing could be played.
    stalled: bool,
}

impl<G: GameLogic> TurnDriver<G> {
    /// Initializes the game. The clock stays disarmed until
    /// [`start`](Self::start).
    pub fn new(room_id: RoomId, logic: Arc<G>, slots: Vec<SlotDescriptor>) -> Self {
        let state = logic.init(&slots);
        let charged = vec![None; slots.len()];
        Self {
            room_id,
            logic,
            slots,
            state,
            turn: 0,
            slot_to_move: 0,
            charged,
            termination: None,
            timeout: ActionTimeout::new(),
            stalled: false,
        }
    }

    /// Arms the clock for the first turn.
    pub fn start(&mut self) {
        if self.termination.is_none() {
            self.arm();
        }
    }

    fn arm(&mut self) {
        let policy = self.logic.timeout_policy_for(self.slot_to_move);
        self.timeout.reset(policy);
        self.stalled = false;
    }

    fn stall(&mut self) -> Progress {
        self.timeout.stop();
        self.stalled = true;
        Progress::Stalled
    }

    /// Changes whether `slot` loses when it misses the hard deadline.
    ///
    /// Making a stalled slot to move timeoutable again re-arms its clock
    /// with a full budget. Returns `false` for an unknown slot.
    pub fn set_can_timeout(&mut self, slot: SlotIndex, activate: bool) -> bool {
        let Some(descriptor) = self.slots.get_mut(slot) else {
            return false;
        };
        descriptor.can_timeout = activate;
        if activate && self.stalled && slot == self.slot_to_move && !self.is_finished() {
            debug!(room_id = %self.room_id, slot, "stalled clock re-armed");
            self.arm();
        }
        true
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn pause_clock(&mut self) {
        self.timeout.pause();
    }

    pub fn resume_clock(&mut self) {
        self.timeout.resume();
    }

    pub fn timeout(&self) -> &ActionTimeout {
        &self.timeout
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn slot_to_move(&self) -> SlotIndex {
        self.slot_to_move
    }

    pub fn state(&self) -> &G::State {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.termination.is_some()
    }

    /// Handles an action sent by `slot`.
    ///
    /// `NotYourTurn` and `GameFinished` leave the game untouched. Every
    /// other problem with the action ends the game against `slot`.
    pub fn on_action(
        &mut self,
        slot: SlotIndex,
        action: &GameAction,
    ) -> Result<Progress, RoomError> {
        if self.is_finished() {
            return Err(RoomError::GameFinished(self.room_id));
        }
        if slot != self.slot_to_move {
            return Err(RoomError::NotYourTurn {
                expected: self.slot_to_move,
                got: slot,
            });
        }

        if self.slots[slot].can_timeout && self.timeout.soft_exceeded() {
            let reason = format!(
                "{} answered after the soft deadline",
                self.slots[slot].display_name
            );
            self.forfeit(&[slot], TerminationCause::SoftTimeout, reason);
            return Ok(Progress::Finished);
        }

        match self.checked_apply(slot, action) {
            Ok(next) => Ok(self.advance(slot, next)),
            Err(reason) => {
                let reason = format!(
                    "{} broke the rules: {reason}",
                    self.slots[slot].display_name
                );
                self.forfeit(&[slot], TerminationCause::RuleViolation, reason);
                Ok(Progress::Finished)
            }
        }
    }

    /// Handles the hard deadline of the slot to move passing.
    pub fn on_timeout(&mut self) -> Progress {
        if self.is_finished() || !self.timeout.hard_exceeded() {
            return Progress::Idle;
        }
        let slot = self.slot_to_move;
        let name = self.slots[slot].display_name.clone();

        if self.slots[slot].can_timeout {
            let reason = format!("{name} missed the hard deadline");
            self.forfeit(&[slot], TerminationCause::HardTimeout, reason);
            return Progress::Finished;
        }

        let Some(action) = self.logic.default_action(&self.state, slot) else {
            debug!(room_id = %self.room_id, slot, "deadline passed, no default action");
            return self.stall();
        };
        match self.checked_apply(slot, &action) {
            Ok(next) => {
                debug!(room_id = %self.room_id, slot, kind = %action.kind, "default action played");
                self.advance(slot, next)
            }
            Err(reason) => {
                warn!(room_id = %self.room_id, slot, %reason, "default action rejected");
                self.stall()
            }
        }
    }

    fn checked_apply(
        &self,
        slot: SlotIndex,
        action: &GameAction,
    ) -> Result<G::State, String> {
        let expected = self.logic.expected_action_kind(&self.state);
        if action.kind != expected {
            return Err(format!(
                "expected a {expected:?} action, got {:?}",
                action.kind
            ));
        }
        self.logic.apply(&self.state, slot, action)
    }

    fn advance(&mut self, acted: SlotIndex, next: G::State) -> Progress {
        let n = self.slots.len();
        self.state = next;
        self.turn += 1;

        let mut next_slot = self.logic.next_slot(&self.state, acted, n);
        if next_slot >= n || (next_slot == acted && n > 1) {
            next_slot = (acted + 1) % n;
        }
        self.slot_to_move = next_slot;

        if self.logic.is_over(&self.state) {
            let winner = match self.logic.winner(&self.state) {
                Some(w) if w >= n => {
                    warn!(room_id = %self.room_id, winner = w, slots = n, "winner outside the room, scored as a draw");
                    None
                }
                w => w,
            };
            let reason = match winner {
                Some(w) => format!("{} won", self.slots[w].display_name),
                None => "draw".to_string(),
            };
            self.finish(winner, TerminationCause::Regular, reason);
            return Progress::Finished;
        }
        self.arm();
        Progress::Advanced
    }

    /// Ends the game against every slot in `losers`.
    ///
    /// The winner is the one slot left uncharged, if exactly one is.
    pub fn forfeit(
        &mut self,
        losers: &[SlotIndex],
        cause: TerminationCause,
        reason: impl Into<String>,
    ) {
        if self.is_finished() {
            return;
        }
        for &slot in losers {
            if let Some(charged) = self.charged.get_mut(slot) {
                *charged = Some(cause);
            }
        }
        let mut survivors = (0..self.slots.len()).filter(|&s| self.charged[s].is_none());
        let winner = match (survivors.next(), survivors.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        };
        self.finish(winner, cause, reason.into());
    }

    pub fn player_left(&mut self, slot: SlotIndex) {
        let reason = match self.slots.get(slot) {
            Some(d) => format!("{} left the game", d.display_name),
            None => "a player left the game".to_string(),
        };
        self.forfeit(&[slot], TerminationCause::Left, reason);
    }

    pub fn cancel(&mut self) {
        self.finish(None, TerminationCause::Cancelled, "game cancelled".into());
    }

    fn finish(&mut self, winner: Option<SlotIndex>, cause: TerminationCause, reason: String) {
        if self.is_finished() {
            return;
        }
        self.timeout.stop();
        self.termination = Some(Termination {
            winner,
            cause,
            reason,
        });
    }

    /// The final result, once the game has finished.
    pub fn result(&self) -> Option<GameResult> {
        let termination = self.termination.as_ref()?;
        let mut scores = self.logic.scores_for(&self.state);
        scores.resize(self.slots.len(), 0);

        let scores = self
            .slots
            .iter()
            .zip(scores)
            .enumerate()
            .map(|(slot, (descriptor, score))| SlotScore {
                slot,
                display_name: descriptor.display_name.clone(),
                score,
                cause: self.charged[slot].unwrap_or(match termination.cause {
                    TerminationCause::Cancelled => TerminationCause::Cancelled,
                    _ => TerminationCause::Regular,
                }),
            })
            .collect();

        Some(GameResult {
            winner: termination.winner,
            cause: termination.cause,
            reason: termination.reason.clone(),
            scores,
        })
    }

    /// The current state as a broadcastable event.
    pub fn snapshot(&self) -> RoomEvent {
        let state = serde_json::to_value(&self.state).unwrap_or_else(|e| {
            warn!(room_id = %self.room_id, error = %e, "state failed to serialize");
            serde_json::Value::Null
        });
        RoomEvent::State {
            turn: self.turn,
            slot_to_move: self.slot_to_move,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gamehall_timeout::TimeoutPolicy;
    use serde_json::json;

    use super::*;

    /// Players alternate adding 1..=3 to a total; reaching 10 ends the
    /// game and the player who reached it wins.
    struct Race;

    impl GameLogic for Race {
        type State = u32;

        fn player_count(&self) -> usize {
            2
        }

        fn init(&self, _slots: &[SlotDescriptor]) -> u32 {
            0
        }

        fn expected_action_kind(&self, _state: &u32) -> String {
            "add".into()
        }

        fn apply(&self, state: &u32, _slot: SlotIndex, action: &GameAction) -> Result<u32, String> {
            match action.data.as_u64() {
                Some(n @ 1..=3) => Ok(state + n as u32),
                _ => Err("can only add 1 to 3".into()),
            }
        }

        fn is_over(&self, state: &u32) -> bool {
            *state >= 10
        }

        fn winner(&self, state: &u32) -> Option<SlotIndex> {
            // The slot that just moved reached the total.
            Some(if state % 2 == 0 { 1 } else { 0 })
        }

        fn scores_for(&self, _state: &u32) -> Vec<i64> {
            vec![1]
        }

        fn timeout_policy_for(&self, _slot: SlotIndex) -> TimeoutPolicy {
            TimeoutPolicy::from_millis(100, 500)
        }

        fn default_action(&self, _state: &u32, _slot: SlotIndex) -> Option<GameAction> {
            Some(GameAction::new("add", json!(1)))
        }
    }

    /// Ends after one action, naming a slot the room does not have. Has
    /// no default action.
    struct Stuck;

    impl GameLogic for Stuck {
        type State = u32;

        fn player_count(&self) -> usize {
            2
        }

        fn init(&self, _slots: &[SlotDescriptor]) -> u32 {
            0
        }

        fn expected_action_kind(&self, _state: &u32) -> String {
            "add".into()
        }

        fn apply(&self, state: &u32, _slot: SlotIndex, _action: &GameAction) -> Result<u32, String> {
            Ok(state + 1)
        }

        fn is_over(&self, state: &u32) -> bool {
            *state > 0
        }

        fn winner(&self, _state: &u32) -> Option<SlotIndex> {
            Some(7)
        }

        fn scores_for(&self, _state: &u32) -> Vec<i64> {
            Vec::new()
        }

        fn timeout_policy_for(&self, _slot: SlotIndex) -> TimeoutPolicy {
            TimeoutPolicy::from_millis(100, 500)
        }
    }

    fn driver() -> TurnDriver<Race> {
        let slots = vec![SlotDescriptor::new("alice"), SlotDescriptor::new("bob")];
        let mut driver = TurnDriver::new(RoomId(1), Arc::new(Race), slots);
        driver.start();
        driver
    }

    fn add(n: u64) -> GameAction {
        GameAction::new("add", json!(n))
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_action_advances_turn_and_slot() {
        let mut d = driver();
        assert_eq!(d.on_action(0, &add(2)), Ok(Progress::Advanced));
        assert_eq!(d.turn(), 1);
        assert_eq!(d.slot_to_move(), 1);
        assert_eq!(*d.state(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_action_wrong_slot_not_your_turn() {
        let mut d = driver();
        assert_eq!(
            d.on_action(1, &add(1)),
            Err(RoomError::NotYourTurn { expected: 0, got: 1 })
        );
        assert_eq!(d.turn(), 0);
        assert!(!d.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_action_kind_mismatch_is_rule_violation() {
        let mut d = driver();
        let action = GameAction::new("subtract", json!(1));
        assert_eq!(d.on_action(0, &action), Ok(Progress::Finished));

        let result = d.result().unwrap();
        assert_eq!(result.cause, TerminationCause::RuleViolation);
        assert_eq!(result.winner, Some(1));
        assert_eq!(result.scores[0].cause, TerminationCause::RuleViolation);
        assert_eq!(result.scores[1].cause, TerminationCause::Regular);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_action_apply_failure_is_rule_violation() {
        let mut d = driver();
        d.on_action(0, &add(1)).unwrap();
        assert_eq!(d.on_action(1, &add(7)), Ok(Progress::Finished));
        let result = d.result().unwrap();
        assert_eq!(result.cause, TerminationCause::RuleViolation);
        assert_eq!(result.winner, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_action_after_finish_game_finished() {
        let mut d = driver();
        d.cancel();
        assert_eq!(
            d.on_action(0, &add(1)),
            Err(RoomError::GameFinished(RoomId(1)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_action_regular_end_uses_module_winner() {
        let mut d = driver();
        for (slot, n) in [(0, 3), (1, 3), (0, 3)] {
            assert_eq!(d.on_action(slot, &add(n)), Ok(Progress::Advanced));
        }
        assert_eq!(d.on_action(1, &add(1)), Ok(Progress::Finished));

        let result = d.result().unwrap();
        assert_eq!(result.cause, TerminationCause::Regular);
        assert_eq!(result.winner, Some(1));
        assert_eq!(result.reason, "bob won");
        assert!(!d.timeout().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_action_after_soft_deadline_soft_timeout() {
        let mut d = driver();
        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(d.on_action(0, &add(1)), Ok(Progress::Finished));
        let result = d.result().unwrap();
        assert_eq!(result.cause, TerminationCause::SoftTimeout);
        assert_eq!(result.winner, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_action_paused_clock_does_not_count() {
        let mut d = driver();
        d.pause_clock();
        tokio::time::advance(Duration::from_secs(5)).await;
        d.resume_clock();
        assert_eq!(d.on_action(0, &add(1)), Ok(Progress::Advanced));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_timeout_timeoutable_slot_hard_timeout() {
        let mut d = driver();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(d.on_timeout(), Progress::Finished);
        let result = d.result().unwrap();
        assert_eq!(result.cause, TerminationCause::HardTimeout);
        assert_eq!(result.winner, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_timeout_before_deadline_idle() {
        let mut d = driver();
        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(d.on_timeout(), Progress::Idle);
        assert!(!d.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_timeout_untimeoutable_slot_plays_default() {
        let mut alice = SlotDescriptor::new("alice");
        alice.can_timeout = false;
        let slots = vec![alice, SlotDescriptor::new("bob")];
        let mut d = TurnDriver::new(RoomId(1), Arc::new(Race), slots);
        d.start();

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(d.on_timeout(), Progress::Advanced);
        assert_eq!(*d.state(), 1);
        assert_eq!(d.slot_to_move(), 1);
        assert!(d.timeout().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_can_timeout_rearms_stalled_slot() {
        let mut alice = SlotDescriptor::new("alice");
        alice.can_timeout = false;
        let slots = vec![alice, SlotDescriptor::new("bob")];
        let mut d = TurnDriver::new(RoomId(1), Arc::new(Stuck), slots);
        d.start();

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(d.on_timeout(), Progress::Stalled);
        assert!(d.is_stalled());
        assert!(!d.timeout().is_armed());

        assert!(d.set_can_timeout(0, true));
        assert!(d.timeout().is_armed());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(d.on_timeout(), Progress::Finished);
        assert_eq!(d.result().unwrap().cause, TerminationCause::HardTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_can_timeout_unknown_slot_false() {
        let mut d = driver();
        assert!(!d.set_can_timeout(2, false));
        assert!(d.set_can_timeout(1, false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_action_winner_out_of_range_scored_as_draw() {
        let slots = vec![SlotDescriptor::new("alice"), SlotDescriptor::new("bob")];
        let mut d = TurnDriver::new(RoomId(3), Arc::new(Stuck), slots);
        d.start();

        assert_eq!(d.on_action(0, &add(1)), Ok(Progress::Finished));
        let result = d.result().unwrap();
        assert_eq!(result.cause, TerminationCause::Regular);
        assert_eq!(result.winner, None);
        assert_eq!(result.reason, "draw");
    }

    #[tokio::test(start_paused = true)]
    async fn test_forfeit_multiple_losers_single_survivor_wins() {
        let slots = (0..3).map(SlotDescriptor::open).collect();
        let mut d = TurnDriver::new(RoomId(2), Arc::new(Race), slots);
        d.forfeit(&[0, 2], TerminationCause::Left, "never joined");
        let result = d.result().unwrap();
        assert_eq!(result.winner, Some(1));
        assert_eq!(result.scores.len(), 3);
        assert_eq!(result.scores[1].score, 0);
        assert_eq!(result.scores[2].cause, TerminationCause::Left);
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_left_remaining_slot_wins() {
        let mut d = driver();
        d.player_left(0);
        let result = d.result().unwrap();
        assert_eq!(result.cause, TerminationCause::Left);
        assert_eq!(result.winner, Some(1));
        assert_eq!(result.reason, "alice left the game");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_no_winner_and_first_termination_sticks() {
        let mut d = driver();
        d.cancel();
        d.player_left(1);
        let result = d.result().unwrap();
        assert_eq!(result.cause, TerminationCause::Cancelled);
        assert_eq!(result.winner, None);
        assert!(result.scores.iter().all(|s| s.cause == TerminationCause::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_turn_and_state() {
        let mut d = driver();
        d.on_action(0, &add(3)).unwrap();
        assert_eq!(
            d.snapshot(),
            RoomEvent::State {
                turn: 1,
                slot_to_move: 1,
                state: json!(3),
            }
        );
    }
}
