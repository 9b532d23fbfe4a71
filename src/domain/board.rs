//! Board snapshot used by the replay engine.
//!
//! `Board` knows how to place pieces, play a move mechanically and enumerate
//! pseudo-legal moves (ignoring check). Legality filtering lives in
//! [`crate::domain::rules`].

use crate::domain::rules;
use crate::domain::shogi::{
    BOARD_SIZE, Color, HAND_KINDS, Move, NUM_SQUARES, Piece, PieceKind, Square,
};

/// SFEN of the standard starting position
pub const STARTPOS_SFEN: &str = "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1";

/// Errors raised when a move cannot be played mechanically
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("it is not {0:?}'s turn")]
    NotToMove(Color),
    #[error("no matching piece on {0}")]
    PieceMismatch(Square),
    #[error("{0:?} is not in hand")]
    NotInHand(PieceKind),
    #[error("destination {0} is occupied")]
    Occupied(Square),
    #[error("{0:?} cannot promote")]
    CannotPromote(PieceKind),
    #[error("invalid sfen: {0}")]
    Sfen(String),
}

// Offsets are written from Black's point of view (forward = rank - 1).
const GOLD_STEPS: &[(i8, i8)] = &[(0, -1), (-1, -1), (1, -1), (-1, 0), (1, 0), (0, 1)];
const SILVER_STEPS: &[(i8, i8)] = &[(0, -1), (-1, -1), (1, -1), (-1, 1), (1, 1)];
const KING_STEPS: &[(i8, i8)] = &[
    (0, -1),
    (-1, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (0, 1),
    (-1, 1),
    (1, 1),
];
const PAWN_STEPS: &[(i8, i8)] = &[(0, -1)];
const KNIGHT_STEPS: &[(i8, i8)] = &[(-1, -2), (1, -2)];
const ORTHOGONAL: &[(i8, i8)] = &[(0, -1), (0, 1), (-1, 0), (1, 0)];
const DIAGONAL: &[(i8, i8)] = &[(-1, -1), (1, -1), (-1, 1), (1, 1)];
const FORWARD: &[(i8, i8)] = &[(0, -1)];

fn steps(kind: PieceKind) -> &'static [(i8, i8)] {
    match kind {
        PieceKind::Pawn => PAWN_STEPS,
        PieceKind::Knight => KNIGHT_STEPS,
        PieceKind::Silver => SILVER_STEPS,
        PieceKind::Gold
        | PieceKind::ProPawn
        | PieceKind::ProLance
        | PieceKind::ProKnight
        | PieceKind::ProSilver => GOLD_STEPS,
        PieceKind::King => KING_STEPS,
        PieceKind::Horse => ORTHOGONAL,
        PieceKind::Dragon => DIAGONAL,
        PieceKind::Lance | PieceKind::Bishop | PieceKind::Rook => &[],
    }
}

fn slides(kind: PieceKind) -> &'static [(i8, i8)] {
    match kind {
        PieceKind::Lance => FORWARD,
        PieceKind::Bishop | PieceKind::Horse => DIAGONAL,
        PieceKind::Rook | PieceKind::Dragon => ORTHOGONAL,
        _ => &[],
    }
}

fn oriented(color: Color, (d_file, d_rank): (i8, i8)) -> (i8, i8) {
    match color {
        Color::Black => (d_file, d_rank),
        Color::White => (-d_file, -d_rank),
    }
}

/// A full position: pieces on the board, pieces in hand, side to move
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Board {
    squares: [Option<Piece>; NUM_SQUARES],
    hands: [[u8; HAND_KINDS.len()]; 2],
    side_to_move: Color,
}

impl Board {
    /// An empty board with empty hands
    pub fn empty(side_to_move: Color) -> Self {
        Self {
            squares: [None; NUM_SQUARES],
            hands: [[0; HAND_KINDS.len()]; 2],
            side_to_move,
        }
    }

    /// The standard starting position
    pub fn startpos() -> Self {
        let mut board = Board::empty(Color::Black);
        let back = [
            PieceKind::Lance,
            PieceKind::Knight,
            PieceKind::Silver,
            PieceKind::Gold,
            PieceKind::King,
            PieceKind::Gold,
            PieceKind::Silver,
            PieceKind::Knight,
            PieceKind::Lance,
        ];
        for (i, &kind) in back.iter().enumerate() {
            let file = i as u8 + 1;
            board.put(file, 9, Color::Black, kind);
            board.put(file, 1, Color::White, kind);
            board.put(file, 7, Color::Black, PieceKind::Pawn);
            board.put(file, 3, Color::White, PieceKind::Pawn);
        }
        board.put(8, 8, Color::Black, PieceKind::Bishop);
        board.put(2, 8, Color::Black, PieceKind::Rook);
        board.put(2, 2, Color::White, PieceKind::Bishop);
        board.put(8, 2, Color::White, PieceKind::Rook);
        board
    }

    fn put(&mut self, file: u8, rank: u8, color: Color, kind: PieceKind) {
        if let Some(sq) = Square::new(file, rank) {
            self.squares[sq.index()] = Some(Piece::new(color, kind));
        }
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.squares[sq.index()]
    }

    pub fn set_piece(&mut self, sq: Square, piece: Option<Piece>) {
        self.squares[sq.index()] = piece;
    }

    /// Number of `kind` pieces `color` holds; promoted kinds count as their base
    pub fn hand_count(&self, color: Color, kind: PieceKind) -> u8 {
        kind.unpromoted()
            .hand_index()
            .map(|i| self.hands[color.index()][i])
            .unwrap_or(0)
    }

    pub fn set_hand(&mut self, color: Color, kind: PieceKind, count: u8) {
        if let Some(i) = kind.unpromoted().hand_index() {
            self.hands[color.index()][i] = count;
        }
    }

    pub fn is_hand_empty(&self, color: Color) -> bool {
        self.hands[color.index()].iter().all(|&n| n == 0)
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        Square::all().find(|&sq| self.piece_at(sq) == Some(Piece::new(color, PieceKind::King)))
    }

    /// Squares currently occupied by `color`
    pub fn squares_of(&self, color: Color) -> impl Iterator<Item = Square> + '_ {
        Square::all().filter(move |&sq| self.piece_at(sq).is_some_and(|p| p.color == color))
    }

    pub fn empty_squares(&self) -> impl Iterator<Item = Square> + '_ {
        Square::all().filter(move |&sq| self.piece_at(sq).is_none())
    }

    /// Squares the piece on `from` reaches, stopping at the first occupied
    /// square of each slide (that square included, whoever owns it)
    pub fn attacks_from(&self, from: Square) -> Vec<Square> {
        let Some(piece) = self.piece_at(from) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for &delta in steps(piece.kind) {
            let (df, dr) = oriented(piece.color, delta);
            if let Some(to) = from.offset(df, dr) {
                out.push(to);
            }
        }
        for &delta in slides(piece.kind) {
            let (df, dr) = oriented(piece.color, delta);
            let mut cur = from;
            while let Some(to) = cur.offset(df, dr) {
                out.push(to);
                if self.piece_at(to).is_some() {
                    break;
                }
                cur = to;
            }
        }
        out
    }

    pub fn is_attacked(&self, target: Square, by: Color) -> bool {
        self.squares_of(by)
            .any(|from| self.attacks_from(from).contains(&target))
    }

    /// Whether `color`'s king is attacked. A side without a king is never in check.
    pub fn in_check(&self, color: Color) -> bool {
        match self.king_square(color) {
            Some(king) => self.is_attacked(king, color.opponent()),
            None => false,
        }
    }

    /// Moves of the piece on `from`, ignoring check.
    ///
    /// The promoting variant is included whenever promotion is allowed and the
    /// plain variant is left out when promotion is forced.
    pub fn pseudo_legal_moves_from(&self, from: Square) -> Vec<Move> {
        let Some(piece) = self.piece_at(from) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for to in self.attacks_from(from) {
            if self.piece_at(to).is_some_and(|p| p.color == piece.color) {
                continue;
            }
            let plain = Move::normal(piece.color, piece.kind, from, to, false);
            if rules::can_promote(&plain) {
                out.push(Move { promote: true, ..plain });
            }
            if !rules::must_promote(&plain) {
                out.push(plain);
            }
        }
        out
    }

    /// Drops of `kind` onto every empty square, with no placement constraints
    pub fn pseudo_legal_drops(&self, color: Color, kind: PieceKind) -> Vec<Move> {
        if kind.is_promoted() || self.hand_count(color, kind) == 0 {
            return Vec::new();
        }
        self.empty_squares()
            .map(|to| Move::drop(color, kind, to))
            .collect()
    }

    /// Play `mv` without checking legality. Returns the captured kind, if any.
    pub fn apply(&mut self, mv: &Move) -> Result<Option<PieceKind>, BoardError> {
        if mv.color != self.side_to_move {
            return Err(BoardError::NotToMove(mv.color));
        }
        if mv.promote && !rules::can_promote(mv) {
            return Err(BoardError::CannotPromote(mv.kind));
        }
        let target = self.piece_at(mv.to);
        if target.is_some_and(|p| p.color == mv.color) {
            return Err(BoardError::Occupied(mv.to));
        }

        let captured = match mv.from {
            None => {
                if target.is_some() {
                    return Err(BoardError::Occupied(mv.to));
                }
                let count = self.hand_count(mv.color, mv.kind);
                if count == 0 || mv.kind.is_promoted() {
                    return Err(BoardError::NotInHand(mv.kind));
                }
                self.set_hand(mv.color, mv.kind, count - 1);
                None
            }
            Some(from) => {
                if self.piece_at(from) != Some(Piece::new(mv.color, mv.kind)) {
                    return Err(BoardError::PieceMismatch(from));
                }
                self.set_piece(from, None);
                let captured = target.map(|p| p.kind);
                if let Some(kind) = captured {
                    if kind != PieceKind::King {
                        let held = self.hand_count(mv.color, kind);
                        self.set_hand(mv.color, kind, held.saturating_add(1));
                    }
                }
                captured
            }
        };

        self.set_piece(mv.to, Some(Piece::new(mv.color, mv.kind_after())));
        self.side_to_move = self.side_to_move.opponent();
        Ok(captured)
    }

    /// Parse an SFEN position (`<board> <side> <hands> [<move number>]`)
    pub fn from_sfen(sfen: &str) -> Result<Board, BoardError> {
        let err = |msg: &str| BoardError::Sfen(format!("{msg} in {sfen:?}"));
        let mut parts = sfen.split_whitespace();
        let placement = parts.next().ok_or_else(|| err("missing placement"))?;
        let side = parts.next().ok_or_else(|| err("missing side to move"))?;
        let hands = parts.next().unwrap_or("-");

        let side_to_move = match side {
            "b" => Color::Black,
            "w" => Color::White,
            _ => return Err(err("bad side to move")),
        };
        let mut board = Board::empty(side_to_move);

        let rows: Vec<&str> = placement.split('/').collect();
        if rows.len() != BOARD_SIZE as usize {
            return Err(err("expected 9 ranks"));
        }
        for (row, text) in rows.iter().enumerate() {
            let rank = row as u8 + 1;
            let mut file = BOARD_SIZE as i8;
            let mut promoted = false;
            for ch in text.chars() {
                if let Some(d) = ch.to_digit(10) {
                    if d as i8 > file {
                        return Err(err("rank covers more than 9 files"));
                    }
                    file -= d as i8;
                    continue;
                }
                if ch == '+' {
                    promoted = true;
                    continue;
                }
                let (color, base) = piece_from_sfen(ch).ok_or_else(|| err("bad piece letter"))?;
                let kind = if promoted {
                    base.promoted().ok_or_else(|| err("piece cannot promote"))?
                } else {
                    base
                };
                promoted = false;
                let sq = Square::new(file.max(0) as u8, rank).ok_or_else(|| err("rank overflow"))?;
                board.set_piece(sq, Some(Piece::new(color, kind)));
                file -= 1;
            }
            if file != 0 {
                return Err(err("rank does not cover 9 files"));
            }
        }

        if hands != "-" {
            let mut count: u32 = 0;
            for ch in hands.chars() {
                if let Some(d) = ch.to_digit(10) {
                    count = count
                        .checked_mul(10)
                        .and_then(|c| c.checked_add(d))
                        .ok_or_else(|| err("hand count overflow"))?;
                    continue;
                }
                let (color, kind) = piece_from_sfen(ch).ok_or_else(|| err("bad hand letter"))?;
                if kind == PieceKind::King {
                    return Err(err("king in hand"));
                }
                let n = if count == 0 { 1 } else { count };
                let total = board.hand_count(color, kind) as u32 + n;
                if total > piece_limit(kind) as u32 {
                    return Err(err("more pieces in hand than exist"));
                }
                board.set_hand(color, kind, total as u8);
                count = 0;
            }
        }
        Ok(board)
    }

    /// Serialize as SFEN with the given move number
    pub fn to_sfen(&self, move_number: u32) -> String {
        let mut placement = String::new();
        for rank in 1..=BOARD_SIZE {
            if rank > 1 {
                placement.push('/');
            }
            let mut empty = 0;
            for file in (1..=BOARD_SIZE).rev() {
                let sq = Square { file, rank };
                match self.piece_at(sq) {
                    None => empty += 1,
                    Some(piece) => {
                        if empty > 0 {
                            placement.push_str(&empty.to_string());
                            empty = 0;
                        }
                        if piece.kind.is_promoted() {
                            placement.push('+');
                        }
                        placement.push(sfen_letter(piece.color, piece.kind.unpromoted()));
                    }
                }
            }
            if empty > 0 {
                placement.push_str(&empty.to_string());
            }
        }

        let mut hands = String::new();
        for color in [Color::Black, Color::White] {
            for kind in HAND_KINDS {
                let n = self.hand_count(color, kind);
                if n > 1 {
                    hands.push_str(&n.to_string());
                }
                if n > 0 {
                    hands.push(sfen_letter(color, kind));
                }
            }
        }
        if hands.is_empty() {
            hands.push('-');
        }

        let side = match self.side_to_move {
            Color::Black => 'b',
            Color::White => 'w',
        };
        format!("{placement} {side} {hands} {move_number}")
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::startpos()
    }
}

/// Number of pieces of an unpromoted kind in a full set
fn piece_limit(kind: PieceKind) -> u8 {
    match kind.unpromoted() {
        PieceKind::Pawn => 18,
        PieceKind::Bishop | PieceKind::Rook | PieceKind::King => 2,
        _ => 4,
    }
}

fn piece_from_sfen(ch: char) -> Option<(Color, PieceKind)> {
    let color = if ch.is_ascii_uppercase() {
        Color::Black
    } else {
        Color::White
    };
    let kind = match ch.to_ascii_uppercase() {
        'P' => PieceKind::Pawn,
        'L' => PieceKind::Lance,
        'N' => PieceKind::Knight,
        'S' => PieceKind::Silver,
        'G' => PieceKind::Gold,
        'B' => PieceKind::Bishop,
        'R' => PieceKind::Rook,
        'K' => PieceKind::King,
        _ => return None,
    };
    Some((color, kind))
}

fn sfen_letter(color: Color, kind: PieceKind) -> char {
    let upper = match kind {
        PieceKind::Pawn => 'P',
        PieceKind::Lance => 'L',
        PieceKind::Knight => 'N',
        PieceKind::Silver => 'S',
        PieceKind::Gold => 'G',
        PieceKind::Bishop => 'B',
        PieceKind::Rook => 'R',
        _ => 'K',
    };
    match color {
        Color::Black => upper,
        Color::White => upper.to_ascii_lowercase(),
    }
}
