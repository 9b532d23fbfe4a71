//! Replay binding: turn a `(tree, cursor)` pair into a board position.
//!
//! The [`ReplayEngine`] trait is the capability set a board replayer must
//! offer. [`seek`], [`commit`] and [`resolve_nearest`] drive any engine along
//! a cursor and translate its failures into [`KifuError`]s.

use tracing::{debug, warn};

use crate::domain::board::{Board, BoardError};
use crate::domain::cursor::{self, Cursor, ForkPointer, PathIdentity};
use crate::domain::move_tree::{MAIN_SEQUENCE, MoveTree, ROOT_NODE, Step};
use crate::domain::shogi::Play;
use crate::error::{KifuError, KifuResult};

/// Failures reported by a replay engine while stepping
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplayError {
    #[error("no move after ply {ply}")]
    EndOfLine { ply: u32 },

    #[error("no fork {index} at ply {ply}")]
    NoSuchFork { ply: u32, index: usize },

    #[error("already at the initial position")]
    AtStart,

    #[error("cannot play ply {ply}: {source}")]
    Apply {
        ply: u32,
        #[source]
        source: BoardError,
    },
}

impl From<ReplayError> for KifuError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::Apply { ply, source } => KifuError::EngineSeekFailure {
                ply,
                message: source.to_string(),
            },
            ReplayError::EndOfLine { ply } => KifuError::invalid_cursor(ply + 1, err.to_string()),
            ReplayError::NoSuchFork { ply, .. } => KifuError::invalid_cursor(ply, err.to_string()),
            ReplayError::AtStart => KifuError::invalid_cursor(0, err.to_string()),
        }
    }
}

/// A stepwise board replayer over a loaded move tree
pub trait ReplayEngine {
    /// Replace the loaded tree and return to its initial position
    fn load(&mut self, tree: &MoveTree);
    /// Return to the initial position, forgetting fork choices
    fn reset(&mut self);
    /// Play the next ply of the active line
    fn forward(&mut self) -> Result<(), ReplayError>;
    /// Undo the last ply
    fn backward(&mut self) -> Result<(), ReplayError>;
    /// Play the first ply of fork `index` at the next ply
    fn enter_fork(&mut self, index: usize) -> Result<(), ReplayError>;
    fn move_number(&self) -> u32;
    /// Forks entered on the way to the current ply
    fn active_forks(&self) -> Vec<ForkPointer>;
    fn board(&self) -> &Board;
    fn last_move(&self) -> Option<Play>;
    fn snapshot(&self) -> Board;
}

/// What a resolved cursor looks like on the board
#[derive(Clone, Debug, PartialEq)]
pub struct PositionView {
    pub board: Board,
    pub last_move: Option<Play>,
    pub move_number: u32,
    pub identity: PathIdentity,
}

impl PositionView {
    /// The initial position of `tree`
    pub fn initial(tree: &MoveTree) -> Self {
        Self {
            board: tree.initial().clone(),
            last_move: None,
            move_number: 0,
            identity: PathIdentity::root(),
        }
    }
}

/// Replayer that walks the arena directly and keeps one board per ply
#[derive(Clone, Debug, Default)]
pub struct TreeReplayer {
    tree: MoveTree,
    steps: Vec<Step>,
    boards: Vec<Board>,
}

impl TreeReplayer {
    pub fn new() -> Self {
        let mut replayer = Self::default();
        replayer.reset();
        replayer
    }

    fn current(&self) -> Step {
        self.steps.last().copied().unwrap_or(Step {
            ply: 0,
            sequence: MAIN_SEQUENCE,
            node: ROOT_NODE,
            via: None,
        })
    }

    fn play_node(&mut self, step: Step) -> Result<(), ReplayError> {
        let mut board = self.board().clone();
        let play = self.tree.get(step.node).and_then(|n| n.play);
        if let Some(Play::Move(mv)) = play {
            board.apply(&mv).map_err(|source| ReplayError::Apply {
                ply: step.ply,
                source,
            })?;
        }
        self.steps.push(step);
        self.boards.push(board);
        Ok(())
    }
}

impl ReplayEngine for TreeReplayer {
    fn load(&mut self, tree: &MoveTree) {
        self.tree = tree.clone();
        self.reset();
    }

    fn reset(&mut self) {
        self.steps.clear();
        self.boards.clear();
        self.steps.push(Step {
            ply: 0,
            sequence: MAIN_SEQUENCE,
            node: ROOT_NODE,
            via: None,
        });
        self.boards.push(self.tree.initial().clone());
    }

    fn forward(&mut self) -> Result<(), ReplayError> {
        let current = self.current();
        let node = self
            .tree
            .next_after(&current)
            .ok_or(ReplayError::EndOfLine { ply: current.ply })?;
        self.play_node(Step {
            ply: current.ply + 1,
            sequence: current.sequence,
            node,
            via: None,
        })
    }

    fn backward(&mut self) -> Result<(), ReplayError> {
        if self.steps.len() <= 1 {
            return Err(ReplayError::AtStart);
        }
        self.steps.pop();
        self.boards.pop();
        Ok(())
    }

    fn enter_fork(&mut self, index: usize) -> Result<(), ReplayError> {
        let current = self.current();
        let ply = current.ply + 1;
        let no_fork = ReplayError::NoSuchFork { ply, index };
        let owner = self
            .tree
            .next_after(&current)
            .ok_or_else(|| no_fork.clone())?;
        let sequence = self
            .tree
            .get(owner)
            .and_then(|n| n.forks.get(index))
            .copied()
            .ok_or_else(|| no_fork.clone())?;
        let node = self
            .tree
            .sequence(sequence)
            .and_then(|s| s.first())
            .ok_or(no_fork)?;
        self.play_node(Step {
            ply,
            sequence,
            node,
            via: Some(ForkPointer::new(ply, index)),
        })
    }

    fn move_number(&self) -> u32 {
        self.current().ply
    }

    fn active_forks(&self) -> Vec<ForkPointer> {
        self.steps.iter().filter_map(|s| s.via).collect()
    }

    fn board(&self) -> &Board {
        self.boards.last().unwrap_or_else(|| self.tree.initial())
    }

    fn last_move(&self) -> Option<Play> {
        self.tree.get(self.current().node).and_then(|n| n.play)
    }

    fn snapshot(&self) -> Board {
        self.board().clone()
    }
}

/// Replay `cursor` from the root of `tree`.
///
/// At each ply up to the cursor's move number the pointed fork is entered when
/// a pointer names that ply, otherwise the active line continues.
pub fn seek<E: ReplayEngine + ?Sized>(
    engine: &mut E,
    tree: &MoveTree,
    cursor: &Cursor,
) -> KifuResult<PositionView> {
    engine.load(tree);
    for ply in 1..=cursor.move_number {
        match cursor.pointer_at(ply) {
            Some(index) => engine.enter_fork(index)?,
            None => engine.forward()?,
        }
    }
    let identity = PathIdentity::compute(engine.move_number(), &engine.active_forks());
    debug!(move_number = cursor.move_number, %identity, "seek");
    Ok(PositionView {
        board: engine.snapshot(),
        last_move: engine.last_move(),
        move_number: engine.move_number(),
        identity,
    })
}

/// Seek, then rebuild the cursor from the forks the engine actually entered.
/// Planned pointers of the input cursor are carried over.
pub fn commit<E: ReplayEngine + ?Sized>(
    engine: &mut E,
    tree: &MoveTree,
    cursor: &Cursor,
) -> KifuResult<(Cursor, PositionView)> {
    let view = seek(engine, tree, cursor)?;
    let pointers = cursor::merge(
        &engine.active_forks(),
        &cursor.fork_pointers,
        cursor.move_number,
    );
    Ok((Cursor::new(cursor.move_number, pointers), view))
}

/// Commit the deepest prefix of `cursor` that still resolves.
///
/// When the path breaks at some ply, the cursor falls back to the ply before
/// it and every pointer past that ply is dropped.
pub fn resolve_nearest<E: ReplayEngine + ?Sized>(
    engine: &mut E,
    tree: &MoveTree,
    cursor: &Cursor,
) -> KifuResult<(Cursor, PositionView)> {
    let mut candidate = cursor.clone();
    loop {
        match commit(engine, tree, &candidate) {
            Err(KifuError::InvalidCursor { ply, reason }) => {
                let fallback = ply.saturating_sub(1).min(candidate.move_number.saturating_sub(1));
                warn!(ply, %reason, fallback, "cursor no longer resolves");
                candidate = cursor::trim_to_move_number(&candidate, fallback);
            }
            result => return result,
        }
    }
}
