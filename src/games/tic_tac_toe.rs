//! Tic-tac-toe rules, covering the classic 3x3 board and the 5x5
//! variant that requires four in a row.

use serde::{Deserialize, Serialize};

use super::{Move, MoveError, MoveOutcome, Ruleset, Terminal};
use crate::protocol::Seat;

/// Tic-tac-toe board of configurable size and winning line length
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicTacToe {
    cells: Vec<Option<Seat>>,
    size: usize,
    win_len: usize,
    to_move: Seat,
    result: Option<Terminal>,
}

impl TicTacToe {
    pub fn new_3x3() -> Self {
        Self::with_dimensions(3, 3)
    }

    pub fn new_5x5() -> Self {
        Self::with_dimensions(5, 4)
    }

    fn with_dimensions(size: usize, win_len: usize) -> Self {
        Self {
            cells: vec![None; size * size],
            size,
            win_len,
            to_move: Seat::P0,
            result: None,
        }
    }

    pub fn cell(&self, index: usize) -> Option<Seat> {
        self.cells.get(index).copied().flatten()
    }

    /// Longest line through `cell` for `seat`, scanning the four line
    /// directions out from the cell just played.
    fn line_through(&self, cell: usize, seat: Seat) -> usize {
        let size = self.size as isize;
        let row = (cell / self.size) as isize;
        let col = (cell % self.size) as isize;
        let mut best = 0;

        for (dr, dc) in [(0isize, 1isize), (1, 0), (1, 1), (1, -1)] {
            let mut count = 1;
            for dir in [1isize, -1] {
                let (mut r, mut c) = (row + dr * dir, col + dc * dir);
                while r >= 0 && r < size && c >= 0 && c < size {
                    if self.cells[(r * size + c) as usize] == Some(seat) {
                        count += 1;
                    } else {
                        break;
                    }
                    r += dr * dir;
                    c += dc * dir;
                }
            }
            best = best.max(count);
        }
        best
    }

    fn is_full(&self) -> bool {
        self.cells.iter().all(|c| c.is_some())
    }
}

impl Ruleset for TicTacToe {
    fn apply_move(&self, mv: &Move, seat: Seat) -> Result<MoveOutcome, MoveError> {
        let cell = match mv {
            Move::Place { cell } => *cell,
            _ => return Err(MoveError::WrongMoveKind),
        };

        if self.result.is_some() {
            return Err(MoveError::GameOver);
        }
        if seat != self.to_move {
            return Err(MoveError::NotYourTurn);
        }
        if cell >= self.cells.len() {
            return Err(MoveError::OutOfRange);
        }
        if self.cells[cell].is_some() {
            return Err(MoveError::CellOccupied);
        }

        let mut next = self.clone();
        next.cells[cell] = Some(seat);

        if next.line_through(cell, seat) >= next.win_len {
            next.result = Some(Terminal::Winner(seat));
        } else if next.is_full() {
            next.result = Some(Terminal::Draw);
        } else {
            next.to_move = seat.other();
        }

        let terminal = next.result;
        Ok(MoveOutcome {
            state: super::GameState::TicTacToe(next),
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
