use gamehall::prelude::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum Cell { Empty, X, O }

#[derive(Clone, Debug, Serialize)]
pub struct State {
    board: [[Cell; 3]; 3],
    to_move: SlotIndex, // 0 = X, 1 = O
    winner: Option<SlotIndex>,
    full: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Move { pub row: usize, pub col: usize }

// ---------------------------------------------------------------------------
// Game logic
// ---------------------------------------------------------------------------

struct TicTacToe;

impl GameLogic for TicTacToe {
    type State = State;

    fn player_count(&self) -> usize {
        2
    }

    fn init(&self, _slots: &[SlotDescriptor]) -> State {
        State { board: [[Cell::Empty; 3]; 3], to_move: 0, winner: None, full: false }
    }

    fn expected_action_kind(&self, _state: &State) -> String {
        "move".into()
    }

    fn apply(&self, state: &State, slot: SlotIndex, action: &GameAction) -> Result<State, String> {
        let mv: Move = serde_json::from_value(action.data.clone())
            .map_err(|e| format!("malformed move: {e}"))?;
        if mv.row >= 3 || mv.col >= 3 {
            return Err("row and col must be 0-2".into());
        }
        if state.board[mv.row][mv.col] != Cell::Empty {
            return Err("cell is occupied".into());
        }

        let mark = if slot == 0 { Cell::X } else { Cell::O };
        let mut next = state.clone();
        next.board[mv.row][mv.col] = mark;
        next.to_move = 1 - slot;
        if check_winner(&next.board, mark) {
            next.winner = Some(slot);
        }
        next.full = board_full(&next.board);
        Ok(next)
    }

    fn is_over(&self, state: &State) -> bool {
        state.winner.is_some() || state.full
    }

    fn winner(&self, state: &State) -> Option<SlotIndex> {
        state.winner
    }

    fn scores_for(&self, state: &State) -> Vec<i64> {
        match state.winner {
            Some(w) => (0..2).map(|s| if s == w { 2 } else { 0 }).collect(),
            None => vec![1, 1],
        }
    }

    fn timeout_policy_for(&self, _slot: SlotIndex) -> TimeoutPolicy {
        TimeoutPolicy::from_millis(30_000, 60_000)
    }
}

fn check_winner(b: &[[Cell; 3]; 3], m: Cell) -> bool {
    (0..3).any(|i| (0..3).all(|j| b[i][j] == m))           // rows
    || (0..3).any(|j| (0..3).all(|i| b[i][j] == m))        // cols
    || (0..3).all(|i| b[i][i] == m)                         // diagonal
    || (0..3).all(|i| b[i][2 - i] == m)                     // anti-diagonal
}

fn board_full(b: &[[Cell; 3]; 3]) -> bool {
    b.iter().all(|row| row.iter().all(|c| *c != Cell::Empty))
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    gamehall::logging::init(config.debug);

    let secret = SharedSecret::new(config.admin_secret.clone());
    let server = GamehallServer::builder()
        .config(config)
        .game("tic-tac-toe", TicTacToe)
        .build(secret)
        .await?;

    server.run().await?;
    Ok(())
}
