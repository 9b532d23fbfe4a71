pub mod board;
pub mod cursor;
pub mod format;
pub mod kif;
pub mod move_tree;
pub mod mutation;
pub mod record;
pub mod replay;
pub mod rules;
pub mod shogi;

pub use board::{Board, BoardError};
pub use cursor::{Cursor, ForkPointer, PathIdentity};
pub use format::KifuFormat;
pub use move_tree::{MoveNode, MoveTree, NodeId, SequenceId};
pub use mutation::Edit;
pub use record::KifuRecord;
pub use replay::{PositionView, ReplayEngine, ReplayError, TreeReplayer};
pub use shogi::{Color, Move, Piece, PieceKind, Play, Square, Terminal};
