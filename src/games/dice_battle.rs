//! Dice battle rules: best-of-5 rounds, two dice per player per round,
//! higher total takes the round, first to three round-wins ends the
//! match immediately.
//!
//! Dice values are rolled by the caller and arrive inside the move, so
//! this engine stays deterministic.

use serde::{Deserialize, Serialize};

use super::{Move, MoveError, MoveOutcome, Ruleset, Terminal};
use crate::protocol::Seat;

pub const MAX_ROUNDS: u8 = 5;
pub const ROUNDS_TO_WIN: u8 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiceBattle {
    /// Dice rolled so far in the current round, by seat index
    rolls: [Option<(u8, u8)>; 2],
    /// 1-based round counter
    round: u8,
    /// Round wins by seat index
    wins: [u8; 2],
    to_move: Seat,
    result: Option<Terminal>,
}

impl Default for DiceBattle {
    fn default() -> Self {
        Self::new()
    }
}

impl DiceBattle {
    pub fn new() -> Self {
        Self {
            rolls: [None, None],
            round: 1,
            wins: [0, 0],
            to_move: Seat::P0,
            result: None,
        }
    }

    /// Seat that opens a round; alternates so neither player always
    /// rolls first.
    fn round_starter(round: u8) -> Seat {
        if round % 2 == 1 {
            Seat::P0
        } else {
            Seat::P1
        }
    }

    pub fn round(&self) -> u8 {
        self.round
    }

    pub fn wins(&self, seat: Seat) -> u8 {
        self.wins[seat.index()]
    }

    fn resolve_round(&mut self) {
        let (a, b) = match (self.rolls[0], self.rolls[1]) {
            (Some(a), Some(b)) => (a, b),
            _ => return,
        };
        let total_a = a.0 + a.1;
        let total_b = b.0 + b.1;

        if total_a > total_b {
            self.wins[0] += 1;
        } else if total_b > total_a {
            self.wins[1] += 1;
        }
        // Tied totals award the round to neither player

        if self.wins[0] >= ROUNDS_TO_WIN {
            self.result = Some(Terminal::Winner(Seat::P0));
        } else if self.wins[1] >= ROUNDS_TO_WIN {
            self.result = Some(Terminal::Winner(Seat::P1));
        } else if self.round >= MAX_ROUNDS {
            self.result = match self.wins[0].cmp(&self.wins[1]) {
                std::cmp::Ordering::Greater => Some(Terminal::Winner(Seat::P0)),
                std::cmp::Ordering::Less => Some(Terminal::Winner(Seat::P1)),
                std::cmp::Ordering::Equal => Some(Terminal::Draw),
            };
        } else {
            self.round += 1;
            self.rolls = [None, None];
            self.to_move = Self::round_starter(self.round);
        }
    }
}

impl Ruleset for DiceBattle {
    fn apply_move(&self, mv: &Move, seat: Seat) -> Result<MoveOutcome, MoveError> {
        let (die1, die2) = match mv {
            Move::Roll { die1, die2 } => (*die1, *die2),
            _ => return Err(MoveError::WrongMoveKind),
        };

        if self.result.is_some() {
            return Err(MoveError::GameOver);
        }
        if self.rolls[seat.index()].is_some() {
            return Err(MoveError::AlreadyRolled);
        }
        if seat != self.to_move {
            return Err(MoveError::NotYourTurn);
        }
        if !(1..=6).contains(&die1) || !(1..=6).contains(&die2) {
            return Err(MoveError::OutOfRange);
        }

        let mut next = self.clone();
        next.rolls[seat.index()] = Some((die1, die2));
        next.to_move = seat.other();
        next.resolve_round();

        let terminal = next.result;
        Ok(MoveOutcome {
            state: super::GameState::DiceBattle(next),
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
