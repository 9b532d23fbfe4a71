//! Branch-aware edits.
//!
//! Every operation takes the committed tree and cursor by reference and
//! returns a new pair in an [`Edit`]; nothing is changed in place. The caller
//! commits the returned cursor against the returned tree before swapping it
//! in, so a rejected edit leaves the committed state as it was.

use tracing::debug;

use crate::domain::board::Board;
use crate::domain::cursor::{Cursor, ForkPointer, trim_to_move_number};
use crate::domain::move_tree::{MoveTree, NodeId};
use crate::domain::rules;
use crate::domain::shogi::{Move, Play};
use crate::error::{KifuError, KifuResult};

/// A new `(tree, cursor)` pair produced by an edit
#[derive(Clone, Debug)]
pub struct Edit {
    pub tree: MoveTree,
    /// Provisional cursor, still to be committed against `tree`
    pub cursor: Cursor,
    /// False when the edit only moved the cursor
    pub changed: bool,
}

/// The innermost fork the cursor has entered
pub fn current_branch(cursor: &Cursor) -> KifuResult<ForkPointer> {
    cursor
        .applied_pointers()
        .last()
        .copied()
        .ok_or(KifuError::BranchIsMainLine)
}

fn resolve_target(cursor: &Cursor, target: Option<ForkPointer>) -> KifuResult<ForkPointer> {
    match target {
        Some(pointer) => Ok(pointer),
        None => current_branch(cursor),
    }
}

/// The node holding the forks at `ply` along the cursor's path
fn owner_at(tree: &MoveTree, cursor: &Cursor, ply: u32, fork_index: usize) -> KifuResult<NodeId> {
    let not_found = || KifuError::BranchNotFound { ply, fork_index };
    if ply == 0 {
        return Err(not_found());
    }
    let steps = tree
        .walk(&cursor.fork_pointers, ply - 1)
        .map_err(|_| not_found())?;
    steps
        .last()
        .and_then(|step| tree.next_after(step))
        .ok_or_else(not_found)
}

/// Play `mv` from the cursor's position.
///
/// If the next ply already holds the same move, on the active line or as the
/// first move of a fork, the cursor moves onto it and the tree is unchanged.
/// Otherwise the move becomes a new fork of the next ply, or extends the line
/// when the cursor sits on its last ply.
pub fn insert_move(tree: &MoveTree, cursor: &Cursor, board: &Board, mv: Move) -> KifuResult<Edit> {
    if !rules::is_legal_move(board, &mv) {
        return Err(KifuError::illegal(format!("{mv} is not legal here")));
    }
    let ply = cursor.move_number + 1;
    let steps = tree.walk(&cursor.fork_pointers, cursor.move_number)?;
    let Some(current) = steps.last() else {
        return Err(KifuError::invalid_cursor(cursor.move_number, "empty path"));
    };
    if tree
        .get(current.node)
        .and_then(|n| n.play)
        .is_some_and(|p| p.is_terminal())
    {
        return Err(KifuError::illegal(format!(
            "the game has ended at ply {}",
            cursor.move_number
        )));
    }

    let play = Play::Move(mv);
    let mut new_tree = tree.clone();
    let Some(owner) = tree.next_after(current) else {
        new_tree.append(current.sequence, play);
        debug!(ply, %mv, "extended line");
        let cursor = trim_to_move_number(cursor, cursor.move_number).at_move_number(ply);
        return Ok(Edit {
            tree: new_tree,
            cursor,
            changed: true,
        });
    };

    let Some(node) = tree.get(owner) else {
        return Err(KifuError::invalid_cursor(ply, "dangling node"));
    };
    let existing = if node.play.is_some_and(|p| p.same_play(&play)) {
        Some(None)
    } else {
        node.forks
            .iter()
            .position(|&f| {
                tree.sequence(f)
                    .and_then(|s| s.first())
                    .and_then(|n| tree.get(n))
                    .and_then(|n| n.play)
                    .is_some_and(|p| p.same_play(&play))
            })
            .map(Some)
    };

    if let Some(choice) = existing {
        debug!(ply, %mv, ?choice, "move already recorded");
        let base = if cursor.pointer_at(ply) == choice {
            cursor.clone()
        } else {
            trim_to_move_number(cursor, cursor.move_number)
        };
        let moved = match choice {
            Some(index) => base.with_pointer(ForkPointer::new(ply, index)),
            None => base.without_pointer(ply),
        };
        return Ok(Edit {
            tree: new_tree,
            cursor: moved.at_move_number(ply),
            changed: false,
        });
    }

    let (_, index) = new_tree.add_fork(owner, play)?;
    debug!(ply, %mv, index, "created fork");
    let cursor = trim_to_move_number(cursor, cursor.move_number)
        .with_pointer(ForkPointer::new(ply, index))
        .at_move_number(ply);
    Ok(Edit {
        tree: new_tree,
        cursor,
        changed: true,
    })
}

/// Remove one fork. `None` targets the innermost fork the cursor is on.
///
/// The cursor lands on the ply before the divergence. A pointer that selected
/// a later fork at the same node is shifted down with it.
pub fn delete_branch(
    tree: &MoveTree,
    cursor: &Cursor,
    target: Option<ForkPointer>,
) -> KifuResult<Edit> {
    let target = resolve_target(cursor, target)?;
    let ply = target.branch_move_number;
    let owner = owner_at(tree, cursor, ply, target.fork_index)?;
    let mut new_tree = tree.clone();
    new_tree.remove_fork(owner, target.fork_index)?;
    new_tree.compact();

    let selected = cursor.pointer_at(ply);
    let cursor = match selected {
        Some(index) if index == target.fork_index => trim_to_move_number(cursor, ply - 1),
        Some(index) if index > target.fork_index => cursor
            .with_pointer(ForkPointer::new(ply, index - 1))
            .at_move_number(ply - 1),
        _ => cursor.at_move_number(ply - 1),
    };
    debug!(%target, "deleted branch");
    Ok(Edit {
        tree: new_tree,
        cursor,
        changed: true,
    })
}

/// Exchange forks `a` and `b` at `ply`; a pointer selecting either follows it
pub fn swap_branches(
    tree: &MoveTree,
    cursor: &Cursor,
    ply: u32,
    a: usize,
    b: usize,
) -> KifuResult<Edit> {
    let owner = owner_at(tree, cursor, ply, a)?;
    let mut new_tree = tree.clone();
    new_tree.swap_forks(owner, a, b)?;

    let cursor = match cursor.pointer_at(ply) {
        Some(index) if index == a => cursor.with_pointer(ForkPointer::new(ply, b)),
        Some(index) if index == b => cursor.with_pointer(ForkPointer::new(ply, a)),
        _ => cursor.clone(),
    };
    debug!(ply, a, b, "swapped branches");
    Ok(Edit {
        tree: new_tree,
        cursor,
        changed: a != b,
    })
}

/// Make a fork the continuation of the line it branches from.
/// `None` targets the innermost fork the cursor is on.
pub fn promote_variation(
    tree: &MoveTree,
    cursor: &Cursor,
    target: Option<ForkPointer>,
) -> KifuResult<Edit> {
    let target = resolve_target(cursor, target)?;
    let ply = target.branch_move_number;
    let owner = owner_at(tree, cursor, ply, target.fork_index)?;
    let mut new_tree = tree.clone();
    let demoted = new_tree.promote_fork(owner, target.fork_index)?;

    let cursor = match cursor.pointer_at(ply) {
        Some(index) if index == target.fork_index => cursor.without_pointer(ply),
        Some(index) if index > target.fork_index => {
            cursor.with_pointer(ForkPointer::new(ply, index - 1))
        }
        Some(_) => cursor.clone(),
        None => cursor.with_pointer(ForkPointer::new(ply, demoted)),
    };
    debug!(%target, demoted, "promoted variation");
    Ok(Edit {
        tree: new_tree,
        cursor,
        changed: true,
    })
}
