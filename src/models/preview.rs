//! Preview model - keyboard-driven exploration that commits only on confirm.
//!
//! While previewing, the model holds its own clone of the tree and a cursor
//! of its own. Navigation is synchronous; the board snapshot and option labels
//! for the current preview position are regenerated behind a [`Debouncer`] so
//! that a burst of key presses renders once.

use std::time::Duration;

use tracing::debug;

use crate::domain::cursor::{Cursor, ForkPointer, trim_to_move_number};
use crate::domain::kif;
use crate::domain::move_tree::MoveTree;
use crate::domain::replay::{self, PositionView, ReplayEngine, TreeReplayer};
use crate::domain::shogi::Play;
use crate::error::KifuResult;
use crate::models::debounce::Debouncer;

/// One way to continue from a position
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BranchOption {
    pub play: Play,
    /// Fork to enter, or `None` for the continuation of the active line
    pub fork_index: Option<usize>,
}

/// The continuation of the active line followed by each fork's first move.
/// Forks whose first move repeats the continuation are left out.
pub fn branch_options(tree: &MoveTree, cursor: &Cursor) -> KifuResult<Vec<BranchOption>> {
    let steps = tree.walk(&cursor.fork_pointers, cursor.move_number)?;
    let Some(next) = steps.last().and_then(|s| tree.next_after(s)) else {
        return Ok(Vec::new());
    };
    let Some(node) = tree.get(next) else {
        return Ok(Vec::new());
    };
    let mut options = Vec::with_capacity(node.forks.len() + 1);
    let continuation = node.play;
    if let Some(play) = continuation {
        options.push(BranchOption {
            play,
            fork_index: None,
        });
    }
    for (index, &fork) in node.forks.iter().enumerate() {
        let first = tree
            .sequence(fork)
            .and_then(|s| s.first())
            .and_then(|id| tree.get(id))
            .and_then(|n| n.play);
        let Some(play) = first else { continue };
        if continuation.is_some_and(|c| c.same_play(&play)) {
            continue;
        }
        options.push(BranchOption {
            play,
            fork_index: Some(index),
        });
    }
    Ok(options)
}

/// Index of the option a cursor would follow from its position
fn planned_option(options: &[BranchOption], cursor: &Cursor) -> usize {
    let planned = cursor.pointer_at(cursor.move_number + 1);
    options
        .iter()
        .position(|o| o.fork_index == planned)
        .unwrap_or(0)
}

/// Rendered state of a preview position
#[derive(Clone, Debug)]
pub struct PreviewFrame {
    pub cursor: Cursor,
    pub view: PositionView,
    pub options: Vec<BranchOption>,
    /// KIF notation of each option
    pub labels: Vec<String>,
    pub selected: usize,
}

fn render_frame(
    tree: &MoveTree,
    cursor: Cursor,
    options: Vec<BranchOption>,
    selected: usize,
) -> KifuResult<PreviewFrame> {
    let view = replay::seek(&mut TreeReplayer::new(), tree, &cursor)?;
    let previous = view.last_move.and_then(|p| p.as_move().map(|m| m.to));
    let labels = options
        .iter()
        .map(|o| kif::play_notation(&o.play, previous))
        .collect();
    Ok(PreviewFrame {
        cursor,
        view,
        options,
        labels,
        selected,
    })
}

/// An exploration in progress
#[derive(Clone, Debug)]
pub struct Preview {
    tree: MoveTree,
    cursor: Cursor,
    options: Vec<BranchOption>,
    selected: usize,
}

impl Preview {
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn options(&self) -> &[BranchOption] {
        &self.options
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    fn move_to(&mut self, cursor: Cursor) -> KifuResult<()> {
        self.options = branch_options(&self.tree, &cursor)?;
        self.selected = planned_option(&self.options, &cursor);
        self.cursor = cursor;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub enum PreviewState {
    #[default]
    Idle,
    Previewing(Preview),
}

/// The preview state machine and its frame debouncer
pub struct PreviewModel {
    state: PreviewState,
    frames: Debouncer<KifuResult<PreviewFrame>>,
}

impl PreviewModel {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: PreviewState::Idle,
            frames: Debouncer::new(delay),
        }
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn is_previewing(&self) -> bool {
        matches!(self.state, PreviewState::Previewing(_))
    }

    pub fn preview(&self) -> Option<&Preview> {
        match &self.state {
            PreviewState::Previewing(preview) => Some(preview),
            PreviewState::Idle => None,
        }
    }

    fn schedule_frame(&mut self) {
        let Some(preview) = self.preview() else {
            return;
        };
        let tree = preview.tree.clone();
        let cursor = preview.cursor.clone();
        let options = preview.options.clone();
        let selected = preview.selected;
        self.frames
            .schedule(move || render_frame(&tree, cursor, options, selected));
    }

    /// Start previewing from the committed pair
    pub fn enter(&mut self, tree: &MoveTree, cursor: &Cursor) -> KifuResult<()> {
        let options = branch_options(tree, cursor)?;
        let selected = planned_option(&options, cursor);
        debug!(identity = %cursor.path_identity, options = options.len(), "preview started");
        self.state = PreviewState::Previewing(Preview {
            tree: tree.clone(),
            cursor: cursor.clone(),
            options,
            selected,
        });
        self.schedule_frame();
        Ok(())
    }

    /// Move the selection by `delta` options, clamped to the available range
    pub fn select_sibling(&mut self, delta: isize) {
        let PreviewState::Previewing(preview) = &mut self.state else {
            return;
        };
        if preview.options.is_empty() {
            return;
        }
        let last = preview.options.len() - 1;
        preview.selected = preview.selected.saturating_add_signed(delta).min(last);
        self.schedule_frame();
    }

    /// Follow the selected option one ply. Does nothing at the end of a line.
    pub fn step_forward(&mut self) -> KifuResult<()> {
        let PreviewState::Previewing(preview) = &mut self.state else {
            return Ok(());
        };
        let Some(option) = preview.options.get(preview.selected).copied() else {
            return Ok(());
        };
        let ply = preview.cursor.move_number + 1;
        let base = if preview.cursor.pointer_at(ply) == option.fork_index {
            preview.cursor.clone()
        } else {
            trim_to_move_number(&preview.cursor, preview.cursor.move_number)
        };
        let next = match option.fork_index {
            Some(index) => base.with_pointer(ForkPointer::new(ply, index)),
            None => base.without_pointer(ply),
        };
        preview.move_to(next.at_move_number(ply))?;
        self.schedule_frame();
        Ok(())
    }

    /// Step back one ply; the choice just left stays planned and selected
    pub fn step_backward(&mut self) -> KifuResult<()> {
        let PreviewState::Previewing(preview) = &mut self.state else {
            return Ok(());
        };
        if preview.cursor.is_root() {
            return Ok(());
        }
        let previous = preview
            .cursor
            .at_move_number(preview.cursor.move_number - 1);
        preview.move_to(previous)?;
        self.schedule_frame();
        Ok(())
    }

    /// Commit the preview cursor against the live tree and leave preview.
    /// Returns `None` when not previewing. On error the preview stays open.
    pub fn confirm<E: ReplayEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        live: &MoveTree,
    ) -> KifuResult<Option<(Cursor, PositionView)>> {
        let Some(preview) = self.preview() else {
            return Ok(None);
        };
        let committed = replay::commit(engine, live, &preview.cursor)?;
        debug!(identity = %committed.0.path_identity, "preview confirmed");
        self.frames.cancel();
        self.state = PreviewState::Idle;
        Ok(Some(committed))
    }

    /// Drop the preview; committed state is untouched
    pub fn cancel(&mut self) {
        self.frames.cancel();
        self.state = PreviewState::Idle;
    }

    /// The latest rendered frame, if one is ready
    pub fn poll_frame(&mut self) -> Option<KifuResult<PreviewFrame>> {
        self.frames.poll()
    }

    /// Wait for the pending frame
    pub async fn next_frame(&mut self) -> Option<KifuResult<PreviewFrame>> {
        self.frames.next().await
    }
}
