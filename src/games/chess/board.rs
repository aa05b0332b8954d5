//! Chess board representation and piece movement.
//!
//! Squares are indexed 0..64 with a1 = 0, h1 = 7, a8 = 56; rank and file
//! are `sq / 8` and `sq % 8`. White pawns move toward higher ranks.
//! Castling and en passant are not part of the supported rules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn other(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub color: Color,
    pub kind: PieceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    squares: Vec<Option<Piece>>,
}

fn rank(sq: usize) -> isize {
    (sq / 8) as isize
}

fn file(sq: usize) -> isize {
    (sq % 8) as isize
}

fn square(rank: isize, file: isize) -> Option<usize> {
    if (0..8).contains(&rank) && (0..8).contains(&file) {
        Some((rank * 8 + file) as usize)
    } else {
        None
    }
}

impl Board {
    pub fn empty() -> Self {
        Self {
            squares: vec![None; 64],
        }
    }

    /// Standard starting position
    pub fn start() -> Self {
        use PieceKind::*;
        let mut board = Self::empty();
        let back_rank = [Rook, Knight, Bishop, Queen, King, Bishop, Knight, Rook];

        for (f, kind) in back_rank.into_iter().enumerate() {
            board.set(f, Some(Piece { color: Color::White, kind }));
            board.set(56 + f, Some(Piece { color: Color::Black, kind }));
        }
        for f in 0..8 {
            board.set(8 + f, Some(Piece { color: Color::White, kind: Pawn }));
            board.set(48 + f, Some(Piece { color: Color::Black, kind: Pawn }));
        }
        board
    }

    pub fn get(&self, sq: usize) -> Option<Piece> {
        self.squares.get(sq).copied().flatten()
    }

    pub fn set(&mut self, sq: usize, piece: Option<Piece>) {
        self.squares[sq] = piece;
    }

    pub fn king_square(&self, color: Color) -> Option<usize> {
        self.squares.iter().position(|p| {
            matches!(p, Some(piece) if piece.color == color && piece.kind == PieceKind::King)
        })
    }

    /// All squares holding a piece of `color`
    pub fn pieces_of(&self, color: Color) -> impl Iterator<Item = (usize, Piece)> + '_ {
        self.squares
            .iter()
            .enumerate()
            .filter_map(move |(sq, p)| match p {
                Some(piece) if piece.color == color => Some((sq, *piece)),
                _ => None,
            })
    }

    /// Every square between `from` and `to` (exclusive) is empty. Assumes
    /// the two squares share a rank, file, or diagonal.
    fn path_clear(&self, from: usize, to: usize) -> bool {
        let dr = (rank(to) - rank(from)).signum();
        let df = (file(to) - file(from)).signum();
        let (mut r, mut f) = (rank(from) + dr, file(from) + df);

        while (r, f) != (rank(to), file(to)) {
            match square(r, f) {
                Some(sq) if self.get(sq).is_none() => {}
                _ => return false,
            }
            r += dr;
            f += df;
        }
        true
    }

    /// Whether a piece of the given kind standing on `from` attacks `to`.
    /// Pawn attacks are the two forward diagonals only.
    fn attacks(&self, piece: Piece, from: usize, to: usize) -> bool {
        let dr = rank(to) - rank(from);
        let df = file(to) - file(from);
        if dr == 0 && df == 0 {
            return false;
        }

        match piece.kind {
            PieceKind::Pawn => {
                let forward = if piece.color == Color::White { 1 } else { -1 };
                dr == forward && df.abs() == 1
            }
            PieceKind::Knight => (dr.abs() == 2 && df.abs() == 1) || (dr.abs() == 1 && df.abs() == 2),
            PieceKind::King => dr.abs() <= 1 && df.abs() <= 1,
            PieceKind::Bishop => dr.abs() == df.abs() && self.path_clear(from, to),
            PieceKind::Rook => (dr == 0 || df == 0) && self.path_clear(from, to),
            PieceKind::Queen => {
                (dr == 0 || df == 0 || dr.abs() == df.abs()) && self.path_clear(from, to)
            }
        }
    }

    /// Whether any piece of `by` attacks `sq`
    pub fn is_attacked(&self, sq: usize, by: Color) -> bool {
        self.pieces_of(by).any(|(from, piece)| self.attacks(piece, from, sq))
    }

    pub fn in_check(&self, color: Color) -> bool {
        match self.king_square(color) {
            Some(sq) => self.is_attacked(sq, color.other()),
            None => false,
        }
    }

    /// Movement-shape validation for a non-castling move: piece pattern,
    /// clear path, and pawn push/capture rules. Does not consider check.
    pub fn move_shape_ok(&self, piece: Piece, from: usize, to: usize) -> bool {
        if piece.kind != PieceKind::Pawn {
            return self.attacks(piece, from, to);
        }

        let forward = if piece.color == Color::White { 1 } else { -1 };
        let start_rank = if piece.color == Color::White { 1 } else { 6 };
        let dr = rank(to) - rank(from);
        let df = file(to) - file(from);

        if df == 0 {
            // Pushes require empty squares
            if dr == forward {
                return self.get(to).is_none();
            }
            if dr == 2 * forward && rank(from) == start_rank {
                let mid = square(rank(from) + forward, file(from));
                return mid.map_or(false, |m| self.get(m).is_none()) && self.get(to).is_none();
            }
            false
        } else {
            // Diagonal steps must capture
            dr == forward && df.abs() == 1 && matches!(self.get(to), Some(p) if p.color != piece.color)
        }
    }

    /// Pawn landing on its far rank
    pub fn is_promotion(&self, piece: Piece, to: usize) -> bool {
        piece.kind == PieceKind::Pawn
            && rank(to) == if piece.color == Color::White { 7 } else { 0 }
    }

    /// Apply a fully validated move, returning whether it captured
    pub fn apply(&mut self, from: usize, to: usize, promotion: Option<PieceKind>) -> bool {
        let captured = self.get(to).is_some();
        let mut piece = match self.get(from) {
            Some(p) => p,
            None => return false,
        };
        if let Some(kind) = promotion {
            piece.kind = kind;
        }
        self.set(to, Some(piece));
        self.set(from, None);
        captured
    }

    /// Whether `color` has any legal move (a shape-valid move that does
    /// not leave their own king attacked)
    pub fn has_legal_move(&self, color: Color) -> bool {
        for (from, piece) in self.pieces_of(color) {
            for to in 0..64 {
                if matches!(self.get(to), Some(p) if p.color == color) {
                    continue;
                }
                if !self.move_shape_ok(piece, from, to) {
                    continue;
                }
                let mut probe = self.clone();
                let promotion = if probe.is_promotion(piece, to) {
                    Some(PieceKind::Queen)
                } else {
                    None
                };
                probe.apply(from, to, promotion);
                if !probe.in_check(color) {
                    return true;
                }
            }
        }
        false
    }

    /// Draw by insufficient mating material: K vs K, K+B vs K, K+N vs K,
    /// and K+B vs K+B with both bishops on the same square colour.
    pub fn insufficient_material(&self) -> bool {
        let mut minors: Vec<(Color, PieceKind, usize)> = Vec::new();

        for (sq, piece) in self.squares.iter().enumerate() {
            let Some(piece) = piece else { continue };
            match piece.kind {
                PieceKind::King => {}
                PieceKind::Bishop | PieceKind::Knight => {
                    minors.push((piece.color, piece.kind, sq));
                    if minors.len() > 2 {
                        return false;
                    }
                }
                _ => return false,
            }
        }

        match minors.as_slice() {
            [] | [_] => true,
            [(c1, PieceKind::Bishop, s1), (c2, PieceKind::Bishop, s2)] if c1 != c2 => {
                // Same-colour bishops cannot force mate
                (rank(*s1) + file(*s1)) % 2 == (rank(*s2) + file(*s2)) % 2
            }
            _ => false,
        }
    }

    /// Stable key for repetition detection: piece placement plus side to
    /// move.
    pub fn position_key(&self, to_move: Color) -> String {
        let mut key = String::with_capacity(72);
        for piece in &self.squares {
            match piece {
                None => key.push('.'),
                Some(p) => {
                    let c = p.kind.letter();
                    key.push(if p.color == Color::White {
                        c.to_ascii_uppercase()
                    } else {
                        c
                    });
                }
            }
        }
        key.push(if to_move == Color::White { 'w' } else { 'b' });
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_position_setup() {
        let board = Board::start();
        assert_eq!(
            board.get(4),
            Some(Piece { color: Color::White, kind: PieceKind::King })
        );
        assert_eq!(
            board.get(60),
            Some(Piece { color: Color::Black, kind: PieceKind::King })
        );
        assert_eq!(board.pieces_of(Color::White).count(), 16);
        assert_eq!(board.pieces_of(Color::Black).count(), 16);
    }

    #[test]
    fn test_sliding_piece_blocked() {
        let board = Board::start();
        let rook = Piece { color: Color::White, kind: PieceKind::Rook };
        // a1 rook cannot jump the a2 pawn
        assert!(!board.move_shape_ok(rook, 0, 16));
    }

    #[test]
    fn test_knight_jumps() {
        let board = Board::start();
        let knight = Piece { color: Color::White, kind: PieceKind::Knight };
        // g1 -> f3 over the pawn wall
        assert!(board.move_shape_ok(knight, 6, 21));
    }

    #[test]
    fn test_pawn_cannot_capture_forward() {
        let mut board = Board::empty();
        let white_pawn = Piece { color: Color::White, kind: PieceKind::Pawn };
        board.set(12, Some(white_pawn)); // e2
        board.set(20, Some(Piece { color: Color::Black, kind: PieceKind::Rook })); // e3
        assert!(!board.move_shape_ok(white_pawn, 12, 20));
        // but it can capture diagonally
        board.set(21, Some(Piece { color: Color::Black, kind: PieceKind::Rook })); // f3
        assert!(board.move_shape_ok(white_pawn, 12, 21));
    }

    #[test]
    fn test_double_push_only_from_start_rank() {
        let board = Board::start();
        let pawn = Piece { color: Color::White, kind: PieceKind::Pawn };
        assert!(board.move_shape_ok(pawn, 12, 28)); // e2-e4
        let mut advanced = board.clone();
        advanced.apply(12, 28, None);
        assert!(!advanced.move_shape_ok(pawn, 28, 44)); // e4-e6
    }

    #[test]
    fn test_in_check_detection() {
        let mut board = Board::empty();
        board.set(4, Some(Piece { color: Color::White, kind: PieceKind::King }));
        board.set(60, Some(Piece { color: Color::Black, kind: PieceKind::King }));
        board.set(36, Some(Piece { color: Color::Black, kind: PieceKind::Rook })); // e5
        assert!(board.in_check(Color::White));
        assert!(!board.in_check(Color::Black));
    }

    #[test]
    fn test_insufficient_material_cases() {
        let mut kk = Board::empty();
        kk.set(4, Some(Piece { color: Color::White, kind: PieceKind::King }));
        kk.set(60, Some(Piece { color: Color::Black, kind: PieceKind::King }));
        assert!(kk.insufficient_material());

        let mut kbk = kk.clone();
        kbk.set(2, Some(Piece { color: Color::White, kind: PieceKind::Bishop }));
        assert!(kbk.insufficient_material());

        let mut krk = kk.clone();
        krk.set(0, Some(Piece { color: Color::White, kind: PieceKind::Rook }));
        assert!(!krk.insufficient_material());

        let mut kpk = kk.clone();
        kpk.set(8, Some(Piece { color: Color::White, kind: PieceKind::Pawn }));
        assert!(!kpk.insufficient_material());
    }
}
