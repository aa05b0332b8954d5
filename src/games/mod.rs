//! Game rule engines for StakeDuel
//!
//! Pure, deterministic rules for every supported game variant. Nothing in
//! this module performs I/O or knows about wallets, timers, or sockets:
//! the engines see seats, moves, and board state, and the match manager
//! maps real players onto seats.
//!
//! Randomness (dice values, diamond placement) is injected by the caller
//! so that `apply_move` stays a pure function of state and move.

pub mod chess;
pub mod connect_four;
pub mod diamond_hunt;
pub mod dice_battle;
pub mod tic_tac_toe;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::Seat;

pub use chess::{ChessGame, PieceKind};
pub use connect_four::ConnectFour;
pub use diamond_hunt::DiamondHunt;
pub use dice_battle::DiceBattle;
pub use tic_tac_toe::TicTacToe;

/// Supported game variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    TicTacToe,
    TicTacToe5x5,
    ConnectFour,
    DiceBattle,
    DiamondHunt,
    Chess,
}

impl GameType {
    /// Build the starting state for a fresh match. Seat `P0` always moves
    /// first; game-specific hidden state (the diamond cell) comes from the
    /// supplied rng.
    pub fn initial_state(&self, rng: &mut dyn RngCore) -> GameState {
        match self {
            GameType::TicTacToe => GameState::TicTacToe(TicTacToe::new_3x3()),
            GameType::TicTacToe5x5 => GameState::TicTacToe(TicTacToe::new_5x5()),
            GameType::ConnectFour => GameState::ConnectFour(ConnectFour::new()),
            GameType::DiceBattle => GameState::DiceBattle(DiceBattle::new()),
            GameType::DiamondHunt => GameState::DiamondHunt(DiamondHunt::new(rng)),
            GameType::Chess => GameState::Chess(ChessGame::new()),
        }
    }
}

/// How a finished game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminal {
    Winner(Seat),
    Draw,
}

/// A validated move with full payload. Dice values are filled in by the
/// server before the engine sees the move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Move {
    Place { cell: usize },
    Drop { column: usize },
    Roll { die1: u8, die2: u8 },
    Reveal { cell: usize },
    Chess { from: u8, to: u8, promotion: Option<PieceKind> },
}

/// A move as submitted by a player. Dice rolls carry no values; the
/// server is authoritative for randomness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayerMove {
    Place { cell: usize },
    Drop { column: usize },
    Roll,
    Reveal { cell: usize },
    Chess { from: u8, to: u8, promotion: Option<PieceKind> },
}

/// Why a move was rejected. Surfaced verbatim to the submitting client;
/// the board state is untouched on any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MoveError {
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("the game has already ended")]
    GameOver,
    #[error("target is out of range")]
    OutOfRange,
    #[error("cell is already occupied")]
    CellOccupied,
    #[error("cell was already revealed")]
    AlreadyRevealed,
    #[error("you already rolled this round")]
    AlreadyRolled,
    #[error("column is full")]
    ColumnFull,
    #[error("that move kind does not belong to this game")]
    WrongMoveKind,
    #[error("illegal move: {0}")]
    IllegalMove(String),
}

/// Result of an accepted move
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub state: GameState,
    pub terminal: Option<Terminal>,
}

/// Capability every game variant implements exactly once. Win checking
/// for a variant lives behind this trait and nowhere else.
pub trait Ruleset {
    /// Validate and apply a move, returning the successor state. Rejection
    /// leaves the state untouched.
    fn apply_move(&self, mv: &Move, seat: Seat) -> Result<MoveOutcome, MoveError>;

    /// Seat allowed to move now, `None` once the game is over
    fn to_move(&self) -> Option<Seat>;

    /// Terminal result if the game has ended
    fn terminal(&self) -> Option<Terminal>;
}

/// Variant payload for the authoritative per-match game state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum GameState {
    TicTacToe(TicTacToe),
    ConnectFour(ConnectFour),
    DiceBattle(DiceBattle),
    DiamondHunt(DiamondHunt),
    Chess(ChessGame),
}

impl GameState {
    fn ruleset(&self) -> &dyn Ruleset {
        match self {
            GameState::TicTacToe(g) => g,
            GameState::ConnectFour(g) => g,
            GameState::DiceBattle(g) => g,
            GameState::DiamondHunt(g) => g,
            GameState::Chess(g) => g,
        }
    }

    pub fn apply_move(&self, mv: &Move, seat: Seat) -> Result<MoveOutcome, MoveError> {
        self.ruleset().apply_move(mv, seat)
    }

    pub fn to_move(&self) -> Option<Seat> {
        self.ruleset().to_move()
    }

    pub fn terminal(&self) -> Option<Terminal> {
        self.ruleset().terminal()
    }
}
