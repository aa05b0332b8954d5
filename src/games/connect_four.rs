//! Connect-four rules on the standard 6-row, 7-column grid with
//! gravity-drop placement.

use serde::{Deserialize, Serialize};

use super::{Move, MoveError, MoveOutcome, Ruleset, Terminal};
use crate::protocol::Seat;

pub const ROWS: usize = 6;
pub const COLS: usize = 7;
const WIN_LEN: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectFour {
    /// Row 0 is the bottom of the board
    grid: Vec<Option<Seat>>,
    to_move: Seat,
    result: Option<Terminal>,
}

impl Default for ConnectFour {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectFour {
    pub fn new() -> Self {
        Self {
            grid: vec![None; ROWS * COLS],
            to_move: Seat::P0,
            result: None,
        }
    }

    pub fn at(&self, row: usize, col: usize) -> Option<Seat> {
        self.grid.get(row * COLS + col).copied().flatten()
    }

    /// Lowest empty row in a column, or `None` when the column is full
    fn drop_row(&self, col: usize) -> Option<usize> {
        (0..ROWS).find(|row| self.at(*row, col).is_none())
    }

    fn is_full(&self) -> bool {
        (0..COLS).all(|col| self.at(ROWS - 1, col).is_some())
    }

    /// Test-only board builder: `rows[0]` is the bottom row, `'A'`/`'B'`
    /// are seats, `'.'` is empty.
    #[cfg(test)]
    fn from_rows(rows: [&str; ROWS], to_move: Seat) -> Self {
        let mut board = Self::new();
        board.to_move = to_move;
        for (row, spec) in rows.iter().enumerate() {
            for (col, ch) in spec.chars().enumerate() {
                board.grid[row * COLS + col] = match ch {
                    'A' => Some(Seat::P0),
                    'B' => Some(Seat::P1),
                    _ => None,
                };
            }
        }
        board
    }

    fn line_through(&self, row: usize, col: usize, seat: Seat) -> usize {
        let (row, col) = (row as isize, col as isize);
        let mut best = 0;

        for (dr, dc) in [(0isize, 1isize), (1, 0), (1, 1), (1, -1)] {
            let mut count = 1;
            for dir in [1isize, -1] {
                let (mut r, mut c) = (row + dr * dir, col + dc * dir);
                while r >= 0 && (r as usize) < ROWS && c >= 0 && (c as usize) < COLS {
                    if self.at(r as usize, c as usize) == Some(seat) {
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
}

impl Ruleset for ConnectFour {
    fn apply_move(&self, mv: &Move, seat: Seat) -> Result<MoveOutcome, MoveError> {
        let col = match mv {
            Move::Drop { column } => *column,
            _ => return Err(MoveError::WrongMoveKind),
        };

        if self.result.is_some() {
            return Err(MoveError::GameOver);
        }
        if seat != self.to_move {
            return Err(MoveError::NotYourTurn);
        }
        if col >= COLS {
            return Err(MoveError::OutOfRange);
        }
        let row = self.drop_row(col).ok_or(MoveError::ColumnFull)?;

        let mut next = self.clone();
        next.grid[row * COLS + col] = Some(seat);

        if next.line_through(row, col, seat) >= WIN_LEN {
            next.result = Some(Terminal::Winner(seat));
        } else if next.is_full() {
            next.result = Some(Terminal::Draw);
        } else {
            next.to_move = seat.other();
        }

        let terminal = next.result;
        Ok(MoveOutcome {
            state: super::GameState::ConnectFour(next),
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
