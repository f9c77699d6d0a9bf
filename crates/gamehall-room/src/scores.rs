//! Per-player totals across finished games, keyed by display name.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use gamehall_protocol::{GameResult, PlayerScore, TerminationCause};

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    games: u64,
    wins: u64,
    total: i64,
}

/// Scores kept in memory for the lifetime of the server.
///
/// Rooms record their result here when they finish. Cancelled games do
/// not count.
#[derive(Debug, Default)]
pub struct ScoreLedger {
    tallies: Mutex<HashMap<String, Tally>>,
}

impl ScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Tally>> {
        self.tallies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds every slot of `result` to its display name's tally.
    pub fn record(&self, result: &GameResult) {
        if result.cause == TerminationCause::Cancelled {
            return;
        }
        let mut tallies = self.lock();
        for line in &result.scores {
            let tally = tallies.entry(line.display_name.clone()).or_default();
            tally.games += 1;
            tally.total += line.score;
            if result.winner == Some(line.slot) {
                tally.wins += 1;
            }
        }
    }

    pub fn get(&self, display_name: &str) -> Option<PlayerScore> {
        self.lock().get(display_name).map(|t| PlayerScore {
            display_name: display_name.to_string(),
            games: t.games,
            wins: t.wins,
            total: t.total,
        })
    }

    /// Number of display names with at least one recorded game.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
