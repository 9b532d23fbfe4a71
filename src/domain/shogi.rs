//! Pure shogi domain types and utilities.
//! No I/O and no async - this is the domain layer.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Board width and height
pub const BOARD_SIZE: u8 = 9;

/// Number of squares on the board
pub const NUM_SQUARES: usize = 81;

/// Depth of the promotion zone, counted from the mover's far edge
pub const PROMOTION_ZONE_DEPTH: u8 = 3;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// Sente, moves first and advances toward rank 1
    Black,
    /// Gote
    White,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Color::Black => 0,
            Color::White => 1,
        }
    }

    /// Rank delta of a step "forward" for this color
    pub fn forward(self) -> i8 {
        match self {
            Color::Black => -1,
            Color::White => 1,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PieceKind {
    Pawn,
    Lance,
    Knight,
    Silver,
    Gold,
    Bishop,
    Rook,
    King,
    ProPawn,
    ProLance,
    ProKnight,
    ProSilver,
    Horse,
    Dragon,
}

/// Kinds that can be held in hand, in conventional display order
pub const HAND_KINDS: [PieceKind; 7] = [
    PieceKind::Rook,
    PieceKind::Bishop,
    PieceKind::Gold,
    PieceKind::Silver,
    PieceKind::Knight,
    PieceKind::Lance,
    PieceKind::Pawn,
];

impl PieceKind {
    /// The promoted form, or `None` for kinds that cannot promote
    pub fn promoted(self) -> Option<PieceKind> {
        match self {
            PieceKind::Pawn => Some(PieceKind::ProPawn),
            PieceKind::Lance => Some(PieceKind::ProLance),
            PieceKind::Knight => Some(PieceKind::ProKnight),
            PieceKind::Silver => Some(PieceKind::ProSilver),
            PieceKind::Bishop => Some(PieceKind::Horse),
            PieceKind::Rook => Some(PieceKind::Dragon),
            _ => None,
        }
    }

    /// The unpromoted form (identity for unpromoted kinds)
    pub fn unpromoted(self) -> PieceKind {
        match self {
            PieceKind::ProPawn => PieceKind::Pawn,
            PieceKind::ProLance => PieceKind::Lance,
            PieceKind::ProKnight => PieceKind::Knight,
            PieceKind::ProSilver => PieceKind::Silver,
            PieceKind::Horse => PieceKind::Bishop,
            PieceKind::Dragon => PieceKind::Rook,
            other => other,
        }
    }

    pub fn is_promoted(self) -> bool {
        self.unpromoted() != self
    }

    pub fn is_promotable(self) -> bool {
        self.promoted().is_some()
    }

    /// Slot in a hand array, or `None` for kinds that are never held
    pub fn hand_index(self) -> Option<usize> {
        HAND_KINDS.iter().position(|&k| k == self)
    }

    /// Two-letter CSA code
    pub fn csa(self) -> &'static str {
        match self {
            PieceKind::Pawn => "FU",
            PieceKind::Lance => "KY",
            PieceKind::Knight => "KE",
            PieceKind::Silver => "GI",
            PieceKind::Gold => "KI",
            PieceKind::Bishop => "KA",
            PieceKind::Rook => "HI",
            PieceKind::King => "OU",
            PieceKind::ProPawn => "TO",
            PieceKind::ProLance => "NY",
            PieceKind::ProKnight => "NK",
            PieceKind::ProSilver => "NG",
            PieceKind::Horse => "UM",
            PieceKind::Dragon => "RY",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, JsonSchema)]
pub struct Piece {
    pub color: Color,
    pub kind: PieceKind,
}

impl Piece {
    pub fn new(color: Color, kind: PieceKind) -> Self {
        Self { color, kind }
    }
}

/// A board square; both axes run 1..=9
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize, JsonSchema,
)]
#[serde(try_from = "SquareCoords")]
pub struct Square {
    #[schemars(range(min = 1, max = 9))]
    pub file: u8,
    #[schemars(range(min = 1, max = 9))]
    pub rank: u8,
}

/// Unchecked wire form of [`Square`]
#[derive(Deserialize, JsonSchema)]
struct SquareCoords {
    #[schemars(range(min = 1, max = 9))]
    file: u8,
    #[schemars(range(min = 1, max = 9))]
    rank: u8,
}

impl TryFrom<SquareCoords> for Square {
    type Error = String;

    fn try_from(coords: SquareCoords) -> Result<Self, Self::Error> {
        Square::new(coords.file, coords.rank)
            .ok_or_else(|| format!("square {}{} is off the board", coords.file, coords.rank))
    }
}

impl Square {
    pub fn new(file: u8, rank: u8) -> Option<Square> {
        if (1..=BOARD_SIZE).contains(&file) && (1..=BOARD_SIZE).contains(&rank) {
            Some(Square { file, rank })
        } else {
            None
        }
    }

    /// Row-major index into an 81-entry board array
    pub fn index(self) -> usize {
        (self.rank as usize - 1) * BOARD_SIZE as usize + (self.file as usize - 1)
    }

    pub fn from_index(index: usize) -> Option<Square> {
        if index >= NUM_SQUARES {
            return None;
        }
        let file = (index % BOARD_SIZE as usize) as u8 + 1;
        let rank = (index / BOARD_SIZE as usize) as u8 + 1;
        Some(Square { file, rank })
    }

    pub fn offset(self, d_file: i8, d_rank: i8) -> Option<Square> {
        let file = self.file as i8 + d_file;
        let rank = self.rank as i8 + d_rank;
        if file < 1 || rank < 1 {
            return None;
        }
        Square::new(file as u8, rank as u8)
    }

    /// Rank as seen by `color`: 1 is the far edge the color advances toward
    pub fn relative_rank(self, color: Color) -> u8 {
        match color {
            Color::Black => self.rank,
            Color::White => BOARD_SIZE + 1 - self.rank,
        }
    }

    pub fn in_promotion_zone(self, color: Color) -> bool {
        self.relative_rank(color) <= PROMOTION_ZONE_DEPTH
    }

    /// All 81 squares in index order
    pub fn all() -> impl Iterator<Item = Square> {
        (0..NUM_SQUARES).filter_map(Square::from_index)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file, self.rank)
    }
}

/// One move: a board move when `from` is set, a drop otherwise
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, JsonSchema)]
pub struct Move {
    pub color: Color,
    /// Kind of the moving piece before the move
    pub kind: PieceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Square>,
    pub to: Square,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub promote: bool,
}

impl Move {
    pub fn normal(color: Color, kind: PieceKind, from: Square, to: Square, promote: bool) -> Self {
        Self {
            color,
            kind,
            from: Some(from),
            to,
            promote,
        }
    }

    pub fn drop(color: Color, kind: PieceKind, to: Square) -> Self {
        Self {
            color,
            kind,
            from: None,
            to,
            promote: false,
        }
    }

    pub fn is_drop(&self) -> bool {
        self.from.is_none()
    }

    /// Kind of the piece standing on `to` after the move
    pub fn kind_after(&self) -> PieceKind {
        if self.promote {
            self.kind.promoted().unwrap_or(self.kind)
        } else {
            self.kind
        }
    }

    /// Whether two moves would produce the same ply in a record
    pub fn same_play(&self, other: &Move) -> bool {
        self.color == other.color
            && self.kind == other.kind
            && self.from == other.from
            && self.to == other.to
            && self.promote == other.promote
    }
}

impl fmt::Display for Move {
    /// CSA notation, e.g. `+7776FU` or `-0055KA`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.color {
            Color::Black => '+',
            Color::White => '-',
        };
        let from = self.from.map(|sq| sq.to_string()).unwrap_or_else(|| "00".to_string());
        write!(f, "{}{}{}{}", sign, from, self.to, self.kind_after().csa())
    }
}

/// Special plies that end or suspend a game
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Resign,
    Interrupt,
    Repetition,
    Impasse,
    TimeUp,
    Checkmate,
    IllegalWin,
    IllegalLoss,
    NoCheckmate,
}

impl Terminal {
    pub const ALL: [Terminal; 9] = [
        Terminal::Resign,
        Terminal::Interrupt,
        Terminal::Repetition,
        Terminal::Impasse,
        Terminal::TimeUp,
        Terminal::Checkmate,
        Terminal::IllegalWin,
        Terminal::IllegalLoss,
        Terminal::NoCheckmate,
    ];

    /// KIF label
    pub fn label(self) -> &'static str {
        match self {
            Terminal::Resign => "投了",
            Terminal::Interrupt => "中断",
            Terminal::Repetition => "千日手",
            Terminal::Impasse => "持将棋",
            Terminal::TimeUp => "切れ負け",
            Terminal::Checkmate => "詰み",
            Terminal::IllegalWin => "反則勝ち",
            Terminal::IllegalLoss => "反則負け",
            Terminal::NoCheckmate => "不詰",
        }
    }

    pub fn from_label(label: &str) -> Option<Terminal> {
        Terminal::ALL.into_iter().find(|t| t.label() == label)
    }
}

/// What a record node holds: a move or a terminal marker
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Play {
    Move(Move),
    Terminal(Terminal),
}

impl Play {
    pub fn as_move(&self) -> Option<&Move> {
        match self {
            Play::Move(mv) => Some(mv),
            Play::Terminal(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Play::Terminal(_))
    }

    /// Equality used when deciding whether a ply already exists
    pub fn same_play(&self, other: &Play) -> bool {
        match (self, other) {
            (Play::Move(a), Play::Move(b)) => a.same_play(b),
            (Play::Terminal(a), Play::Terminal(b)) => a == b,
            _ => false,
        }
    }
}
