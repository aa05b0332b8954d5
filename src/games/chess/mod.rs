//! Chess rules: piece movement, promotion, check, checkmate, stalemate,
//! and the draw conditions (insufficient material, fifty-move rule,
//! threefold repetition). Castling and en passant are out of scope.

pub mod board;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Move, MoveError, MoveOutcome, Ruleset, Terminal};
use crate::protocol::Seat;

pub use board::{Board, Color, Piece, PieceKind};

/// Halfmoves without a pawn move or capture before the fifty-move draw
const FIFTY_MOVE_LIMIT: u32 = 100;
const REPETITION_LIMIT: u8 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChessGame {
    board: Board,
    to_move: Color,
    /// Halfmoves since the last pawn move or capture
    halfmove_clock: u32,
    /// How often each position (placement + side to move) has occurred
    position_counts: HashMap<String, u8>,
    history: Vec<(u8, u8)>,
    result: Option<Terminal>,
}

fn seat_color(seat: Seat) -> Color {
    match seat {
        Seat::P0 => Color::White,
        Seat::P1 => Color::Black,
    }
}

fn color_seat(color: Color) -> Seat {
    match color {
        Color::White => Seat::P0,
        Color::Black => Seat::P1,
    }
}

impl Default for ChessGame {
    fn default() -> Self {
        Self::new()
    }
}

impl ChessGame {
    pub fn new() -> Self {
        Self::from_board(Board::start(), Color::White)
    }

    /// Start from an arbitrary position. Used by tests.
    pub fn from_board(board: Board, to_move: Color) -> Self {
        let mut position_counts = HashMap::new();
        position_counts.insert(board.position_key(to_move), 1);
        Self {
            board,
            to_move,
            halfmove_clock: 0,
            position_counts,
            history: Vec::new(),
            result: None,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn history(&self) -> &[(u8, u8)] {
        &self.history
    }

    #[cfg(test)]
    fn set_halfmove_clock(&mut self, clock: u32) {
        self.halfmove_clock = clock;
    }

    fn validate(&self, from: usize, to: usize, promotion: Option<PieceKind>, mover: Color)
        -> Result<(Piece, Option<PieceKind>), MoveError>
    {
        if from >= 64 || to >= 64 {
            return Err(MoveError::OutOfRange);
        }
        if from == to {
            return Err(MoveError::IllegalMove("source and target are the same square".into()));
        }

        let piece = match self.board.get(from) {
            Some(p) if p.color == mover => p,
            Some(_) => return Err(MoveError::IllegalMove("that is not your piece".into())),
            None => return Err(MoveError::IllegalMove("no piece on the source square".into())),
        };

        if matches!(self.board.get(to), Some(p) if p.color == mover) {
            return Err(MoveError::CellOccupied);
        }

        if !self.board.move_shape_ok(piece, from, to) {
            return Err(MoveError::IllegalMove(format!(
                "{:?} cannot move like that",
                piece.kind
            )));
        }

        let promotion = if self.board.is_promotion(piece, to) {
            let kind = promotion.unwrap_or(PieceKind::Queen);
            if matches!(kind, PieceKind::King | PieceKind::Pawn) {
                return Err(MoveError::IllegalMove("invalid promotion piece".into()));
            }
            Some(kind)
        } else {
            if promotion.is_some() {
                return Err(MoveError::IllegalMove("move is not a promotion".into()));
            }
            None
        };

        Ok((piece, promotion))
    }
}

impl Ruleset for ChessGame {
    fn apply_move(&self, mv: &Move, seat: Seat) -> Result<MoveOutcome, MoveError> {
        let (from, to, promotion) = match mv {
            Move::Chess { from, to, promotion } => (*from as usize, *to as usize, *promotion),
            _ => return Err(MoveError::WrongMoveKind),
        };

        if self.result.is_some() {
            return Err(MoveError::GameOver);
        }
        let mover = seat_color(seat);
        if mover != self.to_move {
            return Err(MoveError::NotYourTurn);
        }

        let (piece, promotion) = self.validate(from, to, promotion, mover)?;

        let mut next = self.clone();
        let captured = next.board.apply(from, to, promotion);
        if next.board.in_check(mover) {
            return Err(MoveError::IllegalMove("move leaves your king in check".into()));
        }

        if captured || piece.kind == PieceKind::Pawn {
            next.halfmove_clock = 0;
        } else {
            next.halfmove_clock += 1;
        }
        next.history.push((from as u8, to as u8));
        next.to_move = mover.other();

        let key = next.board.position_key(next.to_move);
        let occurrences = {
            let entry = next.position_counts.entry(key).or_insert(0);
            *entry += 1;
            *entry
        };

        let opponent = next.to_move;
        next.result = if !next.board.has_legal_move(opponent) {
            if next.board.in_check(opponent) {
                Some(Terminal::Winner(seat))
            } else {
                Some(Terminal::Draw)
            }
        } else if next.board.insufficient_material()
            || next.halfmove_clock >= FIFTY_MOVE_LIMIT
            || occurrences >= REPETITION_LIMIT
        {
            Some(Terminal::Draw)
        } else {
            None
        };

        let terminal = next.result;
        Ok(MoveOutcome {
            state: super::GameState::Chess(next),
            terminal,
        })
    }

    fn to_move(&self) -> Option<Seat> {
        if self.result.is_some() {
            None
        } else {
            Some(color_seat(self.to_move))
        }
    }

    fn terminal(&self) -> Option<Terminal> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chess_move(from: u8, to: u8) -> Move {
        Move::Chess { from, to, promotion: None }
    }

    fn apply(game: &ChessGame, from: u8, to: u8, seat: Seat) -> ChessGame {
        match game.apply_move(&chess_move(from, to), seat).unwrap().state {
            super::super::GameState::Chess(g) => g,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_fools_mate_is_checkmate() {
        // 1. f3 e5  2. g4 Qh4#
        let mut g = ChessGame::new();
        g = apply(&g, 13, 21, Seat::P0); // f2-f3
        g = apply(&g, 52, 36, Seat::P1); // e7-e5
        g = apply(&g, 14, 30, Seat::P0); // g2-g4
        let outcome = g.apply_move(&chess_move(59, 31), Seat::P1).unwrap(); // Qd8-h4#
        assert_eq!(outcome.terminal, Some(Terminal::Winner(Seat::P1)));
    }

    #[test]
    fn test_stalemate_is_draw() {
        // White Kb6 + Qh7 vs lone black Ka8; Qh7-c7 stalemates
        let mut board = Board::empty();
        board.set(41, Some(Piece { color: Color::White, kind: PieceKind::King })); // b6
        board.set(55, Some(Piece { color: Color::White, kind: PieceKind::Queen })); // h7
        board.set(56, Some(Piece { color: Color::Black, kind: PieceKind::King })); // a8
        let g = ChessGame::from_board(board, Color::White);

        let outcome = g.apply_move(&chess_move(55, 50), Seat::P0).unwrap(); // Qh7-c7
        assert_eq!(outcome.terminal, Some(Terminal::Draw));
    }

    #[test]
    fn test_promotion_defaults_to_queen() {
        let mut board = Board::empty();
        board.set(4, Some(Piece { color: Color::White, kind: PieceKind::King })); // e1
        board.set(60, Some(Piece { color: Color::Black, kind: PieceKind::King })); // e8
        board.set(48, Some(Piece { color: Color::White, kind: PieceKind::Pawn })); // a7
        let g = ChessGame::from_board(board, Color::White);

        let outcome = g.apply_move(&chess_move(48, 56), Seat::P0).unwrap();
        let next = match outcome.state {
            super::super::GameState::Chess(g) => g,
            _ => unreachable!(),
        };
        assert_eq!(
            next.board().get(56),
            Some(Piece { color: Color::White, kind: PieceKind::Queen })
        );
    }

    #[test]
    fn test_underpromotion_to_knight() {
        let mut board = Board::empty();
        board.set(4, Some(Piece { color: Color::White, kind: PieceKind::King }));
        board.set(60, Some(Piece { color: Color::Black, kind: PieceKind::King }));
        board.set(48, Some(Piece { color: Color::White, kind: PieceKind::Pawn }));
        let g = ChessGame::from_board(board, Color::White);

        let mv = Move::Chess { from: 48, to: 56, promotion: Some(PieceKind::Knight) };
        let outcome = g.apply_move(&mv, Seat::P0).unwrap();
        let next = match outcome.state {
            super::super::GameState::Chess(g) => g,
            _ => unreachable!(),
        };
        assert_eq!(
            next.board().get(56),
            Some(Piece { color: Color::White, kind: PieceKind::Knight })
        );
    }

    #[test]
    fn test_cannot_move_into_check() {
        // Black rook on e8 pins the e-file; white king may not step onto e2
        let mut board = Board::empty();
        board.set(4, Some(Piece { color: Color::White, kind: PieceKind::King })); // e1
        board.set(60, Some(Piece { color: Color::Black, kind: PieceKind::Rook })); // e8
        board.set(63, Some(Piece { color: Color::Black, kind: PieceKind::King })); // h8
        let g = ChessGame::from_board(board, Color::White);

        let err = g.apply_move(&chess_move(4, 12), Seat::P0).unwrap_err(); // Ke1-e2
        assert!(matches!(err, MoveError::IllegalMove(_)));
    }

    #[test]
    fn test_pinned_piece_cannot_move() {
        // White Bd2 shields Ke1 from the e-file rook... place bishop on e2:
        // moving it away exposes the king.
        let mut board = Board::empty();
        board.set(4, Some(Piece { color: Color::White, kind: PieceKind::King })); // e1
        board.set(12, Some(Piece { color: Color::White, kind: PieceKind::Bishop })); // e2
        board.set(60, Some(Piece { color: Color::Black, kind: PieceKind::Rook })); // e8
        board.set(63, Some(Piece { color: Color::Black, kind: PieceKind::King })); // h8
        let g = ChessGame::from_board(board, Color::White);

        let err = g.apply_move(&chess_move(12, 21), Seat::P0).unwrap_err(); // Be2-f3
        assert!(matches!(err, MoveError::IllegalMove(_)));
    }

    #[test]
    fn test_capture_to_insufficient_material_is_draw() {
        // White Nc7xa8 removes the last black piece beyond the king,
        // leaving K+N vs K.
        let mut board = Board::empty();
        board.set(4, Some(Piece { color: Color::White, kind: PieceKind::King })); // e1
        board.set(50, Some(Piece { color: Color::White, kind: PieceKind::Knight })); // c7
        board.set(56, Some(Piece { color: Color::Black, kind: PieceKind::Rook })); // a8
        board.set(62, Some(Piece { color: Color::Black, kind: PieceKind::King })); // g8
        let g = ChessGame::from_board(board, Color::White);

        let outcome = g.apply_move(&chess_move(50, 56), Seat::P0).unwrap();
        assert_eq!(outcome.terminal, Some(Terminal::Draw));
    }

    #[test]
    fn test_fifty_move_rule() {
        let mut board = Board::empty();
        board.set(4, Some(Piece { color: Color::White, kind: PieceKind::King }));
        board.set(60, Some(Piece { color: Color::Black, kind: PieceKind::King }));
        board.set(0, Some(Piece { color: Color::White, kind: PieceKind::Rook }));
        let mut g = ChessGame::from_board(board, Color::White);
        g.set_halfmove_clock(99);

        let outcome = g.apply_move(&chess_move(0, 1), Seat::P0).unwrap(); // Ra1-b1
        assert_eq!(outcome.terminal, Some(Terminal::Draw));
    }

    #[test]
    fn test_threefold_repetition() {
        // Knights shuffle out and back twice; the third occurrence of the
        // starting position ends the game.
        let mut g = ChessGame::new();
        let shuffle = [
            (6u8, 21u8),  // Ng1-f3
            (62, 45),     // Ng8-f6
            (21, 6),      // Nf3-g1
            (45, 62),     // Nf6-g8
        ];
        let mut last = None;
        for cycle in 0..2 {
            for (i, (from, to)) in shuffle.into_iter().enumerate() {
                let seat = if i % 2 == 0 { Seat::P0 } else { Seat::P1 };
                let outcome = g.apply_move(&chess_move(from, to), seat).unwrap();
                last = outcome.terminal;
                g = match outcome.state {
                    super::super::GameState::Chess(g) => g,
                    _ => unreachable!(),
                };
                if cycle == 0 {
                    assert_eq!(last, None);
                }
            }
        }
        assert_eq!(last, Some(Terminal::Draw));
    }

    #[test]
    fn test_not_your_turn() {
        let g = ChessGame::new();
        assert_eq!(
            g.apply_move(&chess_move(52, 36), Seat::P1).unwrap_err(),
            MoveError::NotYourTurn
        );
    }

    #[test]
    fn test_capture_own_piece_rejected() {
        let g = ChessGame::new();
        assert_eq!(
            g.apply_move(&chess_move(0, 8), Seat::P0).unwrap_err(),
            MoveError::CellOccupied
        );
    }
}
