//! Diamond hunt rules: one diamond hidden in a 5x5 grid at match
//! creation, alternate single-cell reveals, first hit wins immediately.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use super::{Move, MoveError, MoveOutcome, Ruleset, Terminal};
use crate::protocol::Seat;

pub const GRID: usize = 5;
pub const CELLS: usize = GRID * GRID;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiamondHunt {
    /// Hidden diamond cell. Never sent to clients; the transport layer
    /// only ever forwards reveals and outcomes.
    diamond: usize,
    revealed: Vec<bool>,
    to_move: Seat,
    result: Option<Terminal>,
}

impl DiamondHunt {
    pub fn new(rng: &mut dyn RngCore) -> Self {
        Self::with_diamond_at(rng.gen_range(0..CELLS))
    }

    /// Deterministic constructor used by tests
    pub fn with_diamond_at(cell: usize) -> Self {
        debug_assert!(cell < CELLS);
        Self {
            diamond: cell,
            revealed: vec![false; CELLS],
            to_move: Seat::P0,
            result: None,
        }
    }

    pub fn is_revealed(&self, cell: usize) -> bool {
        self.revealed.get(cell).copied().unwrap_or(false)
    }
}

impl Ruleset for DiamondHunt {
    fn apply_move(&self, mv: &Move, seat: Seat) -> Result<MoveOutcome, MoveError> {
        let cell = match mv {
            Move::Reveal { cell } => *cell,
            _ => return Err(MoveError::WrongMoveKind),
        };

        if self.result.is_some() {
            return Err(MoveError::GameOver);
        }
        if seat != self.to_move {
            return Err(MoveError::NotYourTurn);
        }
        if cell >= CELLS {
            return Err(MoveError::OutOfRange);
        }
        if self.revealed[cell] {
            return Err(MoveError::AlreadyRevealed);
        }

        let mut next = self.clone();
        next.revealed[cell] = true;

        if cell == next.diamond {
            next.result = Some(Terminal::Winner(seat));
        } else {
            next.to_move = seat.other();
        }

        let terminal = next.result;
        Ok(MoveOutcome {
            state: super::GameState::DiamondHunt(next),
            terminal,
        })
    }

    fn to_move(&self) -> Option<Seat> {
        if self.result.is_some() {
            None
        } else {
            Some(self.to_move)
        }
    }

    fn terminal(&self) -> Option<Terminal> {
        self.result
    }
}
