//! Per-turn deadline tracking for Gamehall.
//!
//! An [`ActionTimeout`] measures how long the slot-to-move has been
//! thinking. It carries two limits from a [`TimeoutPolicy`]:
//!
//! - **soft**: a move arriving after this is late. The turn driver
//!   decides what lateness costs.
//! - **hard**: when this elapses with no move, the room treats it as a
//!   synthetic timeout action.
//!
//! Pausing freezes the clock: the budget consumed so far is kept and the
//! countdown continues from there on resume. Only [`ActionTimeout::reset`]
//! ever gives the budget back.
//!
//! # Integration
//!
//! The timeout is designed to sit inside a room actor's `tokio::select!`
//! loop, racing the command channel:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = timeout.expired() => { /* synthetic timeout action */ }
//!     }
//! }
//! ```
//!
//! All instants are Tokio instants, so `tokio::time::pause()` and
//! `advance()` drive it deterministically in tests.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Soft and hard limit for one slot's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub soft: Duration,
    pub hard: Duration,
}

impl TimeoutPolicy {
    /// Creates a policy. `hard` is raised to `soft` if it is shorter.
    pub fn new(soft: Duration, hard: Duration) -> Self {
        Self {
            soft,
            hard: hard.max(soft),
        }
    }

    /// Convenience for millisecond limits.
    pub fn from_millis(soft: u64, hard: u64) -> Self {
        Self::new(Duration::from_millis(soft), Duration::from_millis(hard))
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(10))
    }
}

// ---------------------------------------------------------------------------
// ActionTimeout
// ---------------------------------------------------------------------------

/// Deadline tracker for the slot currently expected to act.
///
/// A fresh tracker is *disarmed*: no deadline, [`expired`](Self::expired)
/// pends forever. [`reset`](Self::reset) arms it for a new turn.
#[derive(Debug, Clone, Default)]
pub struct ActionTimeout {
    policy: Option<TimeoutPolicy>,
    /// Budget consumed in earlier running stretches of this turn.
    consumed: Duration,
    /// Start of the current running stretch. `None` while paused or
    /// disarmed.
    running_since: Option<Instant>,
    paused: bool,
}

impl ActionTimeout {
    /// Creates a disarmed, unpaused tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the tracker for a new turn with a full budget.
    ///
    /// If the tracker is paused, the countdown starts on the next
    /// [`resume`](Self::resume).
    pub fn reset(&mut self, policy: TimeoutPolicy) {
        self.policy = Some(policy);
        self.consumed = Duration::ZERO;
        self.running_since = (!self.paused).then(Instant::now);
        trace!(?policy, paused = self.paused, "action timeout reset");
    }

    /// Disarms the tracker. Nothing fires until the next reset.
    pub fn stop(&mut self) {
        self.policy = None;
        self.consumed = Duration::ZERO;
        self.running_since = None;
    }

    /// Freezes the countdown, keeping the remaining budget.
    ///
    /// Idempotent.
    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        if let Some(since) = self.running_since.take() {
            self.consumed += since.elapsed();
        }
        trace!(consumed = ?self.consumed, "action timeout paused");
    }

    /// Continues the countdown from where [`pause`](Self::pause) left it.
    ///
    /// Idempotent.
    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        if self.policy.is_some() {
            self.running_since = Some(Instant::now());
        }
        trace!(consumed = ?self.consumed, "action timeout resumed");
    }

    /// The policy of the current turn, if armed.
    pub fn policy(&self) -> Option<TimeoutPolicy> {
        self.policy
    }

    pub fn is_armed(&self) -> bool {
        self.policy.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Time charged against the current turn, excluding paused time.
    pub fn elapsed(&self) -> Duration {
        let running = self
            .running_since
            .map(|since| since.elapsed())
            .unwrap_or(Duration::ZERO);
        self.consumed + running
    }

    /// Budget left before the hard deadline. `None` when disarmed.
    pub fn remaining(&self) -> Option<Duration> {
        self.policy
            .map(|p| p.hard.saturating_sub(self.elapsed()))
    }

    /// Whether the soft limit has passed for the current turn.
    pub fn soft_exceeded(&self) -> bool {
        self.policy.is_some_and(|p| self.elapsed() > p.soft)
    }

    /// Whether the hard limit has passed for the current turn.
    pub fn hard_exceeded(&self) -> bool {
        self.policy.is_some_and(|p| self.elapsed() >= p.hard)
    }

    /// The instant the hard deadline fires, if the countdown is running.
    pub fn deadline(&self) -> Option<Instant> {
        let policy = self.policy?;
        let since = self.running_since?;
        Some(since + policy.hard.saturating_sub(self.consumed))
    }

    /// Resolves when the hard deadline passes.
    ///
    /// While paused or disarmed this future pends forever, which lets a
    /// `tokio::select!` loop keep serving its other branches.
    pub async fn expired(&self) {
        match self.deadline() {
            Some(deadline) => time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
