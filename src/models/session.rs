//! Session model - the application layer for an open kifu.
//!
//! The session owns the committed `(tree, cursor)` pair and the board view it
//! resolves to. Every change goes through the same path: compute a new pair,
//! commit it with the replay engine, then replace the old pair in one
//! assignment. A failed step leaves the committed pair as it was.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::board::Board;
use crate::domain::cursor::{Cursor, ForkPointer};
use crate::domain::move_tree::MoveTree;
use crate::domain::mutation::{self, Edit};
use crate::domain::replay::{self, PositionView, ReplayEngine, TreeReplayer};
use crate::domain::rules;
use crate::domain::shogi::{Move, PieceKind, Square};
use crate::error::{KifuError, KifuResult};
use crate::models::persist::{KifuStore, PersistModel, SaveTarget};
use crate::models::preview::{BranchOption, PreviewFrame, PreviewModel, branch_options};

/// The main session model containing all kifu state
pub struct KifuSession<E: ReplayEngine = TreeReplayer> {
    /// The committed move tree
    tree: MoveTree,
    /// The committed cursor
    cursor: Cursor,
    /// Board at the committed cursor
    view: PositionView,
    engine: E,
    preview: PreviewModel,
    persist: PersistModel,
    /// Where edits are saved, if anywhere
    target: Option<SaveTarget>,
    autosave: bool,
    /// Save error raised before the request reached the writer
    save_error: Option<KifuError>,
}

impl KifuSession<TreeReplayer> {
    pub fn new(tree: MoveTree) -> Self {
        Self::with_engine(tree, TreeReplayer::new(), &Config::default())
    }
}

impl<E: ReplayEngine> KifuSession<E> {
    pub fn with_engine(tree: MoveTree, mut engine: E, config: &Config) -> Self {
        engine.load(&tree);
        Self {
            view: PositionView::initial(&tree),
            tree,
            cursor: Cursor::root(),
            engine,
            preview: PreviewModel::new(config.preview_debounce()),
            persist: PersistModel::new(),
            target: None,
            autosave: config.autosave,
            save_error: None,
        }
    }

    /// Replace the open kifu, returning to its initial position
    pub fn load(&mut self, tree: MoveTree) {
        self.preview.cancel();
        self.engine.load(&tree);
        self.view = PositionView::initial(&tree);
        self.cursor = Cursor::root();
        self.tree = tree;
    }

    /// Get a reference to the move tree
    pub fn tree(&self) -> &MoveTree {
        &self.tree
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn view(&self) -> &PositionView {
        &self.view
    }

    /// Get the currently viewed position
    pub fn board(&self) -> &Board {
        &self.view.board
    }

    /// Check if we're at the root (starting position)
    pub fn is_at_root(&self) -> bool {
        self.cursor.is_root()
    }

    /// Continuations available from the current position
    pub fn options(&self) -> KifuResult<Vec<BranchOption>> {
        branch_options(&self.tree, &self.cursor)
    }

    /// Check if we're at the end of the active line
    pub fn is_at_end(&self) -> bool {
        self.options().map(|o| o.is_empty()).unwrap_or(true)
    }

    fn commit(&mut self, cursor: &Cursor) -> KifuResult<()> {
        let (cursor, view) = replay::commit(&mut self.engine, &self.tree, cursor)?;
        self.cursor = cursor;
        self.view = view;
        Ok(())
    }

    /// Navigate to `cursor`
    pub fn go_to(&mut self, cursor: &Cursor) -> KifuResult<()> {
        self.commit(cursor).inspect_err(|e| warn!(error = %e, "navigation failed"))
    }

    /// Navigate to the nearest position along `cursor` that still resolves
    pub fn go_to_nearest(&mut self, cursor: &Cursor) -> KifuResult<()> {
        let (cursor, view) = replay::resolve_nearest(&mut self.engine, &self.tree, cursor)?;
        self.cursor = cursor;
        self.view = view;
        Ok(())
    }

    /// Go forward one move along planned branches. Returns false at the end.
    pub fn go_forward(&mut self) -> KifuResult<bool> {
        if self.is_at_end() {
            return Ok(false);
        }
        let next = self.cursor.at_move_number(self.cursor.move_number + 1);
        match self.commit(&next) {
            Ok(()) => Ok(true),
            Err(KifuError::InvalidCursor { .. }) => {
                // a stale planned pointer; fall back to the active line
                let ply = self.cursor.move_number + 1;
                let next = self.cursor.without_pointer(ply).at_move_number(ply);
                self.commit(&next).map(|()| true)
            }
            Err(e) => Err(e),
        }
    }

    /// Go back one move, keeping the branch just left as planned
    pub fn go_back(&mut self) -> KifuResult<bool> {
        if self.cursor.is_root() {
            return Ok(false);
        }
        let previous = self.cursor.at_move_number(self.cursor.move_number - 1);
        self.commit(&previous).map(|()| true)
    }

    /// Go to the starting position
    pub fn go_to_start(&mut self) -> KifuResult<()> {
        let start = self.cursor.at_move_number(0);
        self.commit(&start)
    }

    /// Go to the end of the active line
    pub fn go_to_end(&mut self) -> KifuResult<()> {
        while self.go_forward()? {}
        Ok(())
    }

    /// Step onto option `index` of [`Self::options`]
    pub fn select_branch(&mut self, index: usize) -> KifuResult<()> {
        let options = self.options()?;
        let ply = self.cursor.move_number + 1;
        let option = options.get(index).ok_or(KifuError::BranchNotFound {
            ply,
            fork_index: index,
        })?;
        let next = match option.fork_index {
            Some(fork) => self.cursor.with_pointer(ForkPointer::new(ply, fork)),
            None => self.cursor.without_pointer(ply),
        };
        self.commit(&next.at_move_number(ply))
    }

    fn apply_edit(&mut self, edit: KifuResult<Edit>) -> KifuResult<()> {
        let edit = edit.inspect_err(|e| warn!(error = %e, "edit rejected"))?;
        let (cursor, view) = replay::commit(&mut self.engine, &edit.tree, &edit.cursor)
            .inspect_err(|e| warn!(error = %e, "edit did not replay"))?;
        self.tree = edit.tree;
        self.cursor = cursor;
        self.view = view;
        debug!(identity = %self.cursor.path_identity, changed = edit.changed, "edit committed");
        if edit.changed {
            self.autosave();
        }
        Ok(())
    }

    /// Play `mv` from the current position
    pub fn insert_move(&mut self, mv: Move) -> KifuResult<()> {
        let edit = mutation::insert_move(&self.tree, &self.cursor, &self.view.board, mv);
        self.apply_edit(edit)
    }

    /// Delete a fork; `None` deletes the branch the cursor is on
    pub fn delete_branch(&mut self, target: Option<ForkPointer>) -> KifuResult<()> {
        let edit = mutation::delete_branch(&self.tree, &self.cursor, target);
        self.apply_edit(edit)
    }

    pub fn swap_branches(&mut self, ply: u32, a: usize, b: usize) -> KifuResult<()> {
        let edit = mutation::swap_branches(&self.tree, &self.cursor, ply, a, b);
        self.apply_edit(edit)
    }

    /// Promote a fork; `None` promotes the branch the cursor is on
    pub fn promote_variation(&mut self, target: Option<ForkPointer>) -> KifuResult<()> {
        let edit = mutation::promote_variation(&self.tree, &self.cursor, target);
        self.apply_edit(edit)
    }

    pub fn enter_preview(&mut self) -> KifuResult<()> {
        self.preview.enter(&self.tree, &self.cursor)
    }

    pub fn preview_select(&mut self, delta: isize) {
        self.preview.select_sibling(delta);
    }

    pub fn preview_forward(&mut self) -> KifuResult<()> {
        self.preview.step_forward()
    }

    pub fn preview_backward(&mut self) -> KifuResult<()> {
        self.preview.step_backward()
    }

    /// Commit the preview position. Returns false when not previewing.
    pub fn confirm_preview(&mut self) -> KifuResult<bool> {
        match self.preview.confirm(&mut self.engine, &self.tree)? {
            Some((cursor, view)) => {
                self.cursor = cursor;
                self.view = view;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn cancel_preview(&mut self) {
        self.preview.cancel();
    }

    pub fn preview(&self) -> &PreviewModel {
        &self.preview
    }

    pub fn poll_preview_frame(&mut self) -> Option<KifuResult<PreviewFrame>> {
        self.preview.poll_frame()
    }

    pub async fn next_preview_frame(&mut self) -> Option<KifuResult<PreviewFrame>> {
        self.preview.next_frame().await
    }

    /// Legal moves of the piece on `from` in the current position
    pub fn legal_moves_from(&self, from: Square) -> Vec<Move> {
        rules::legal_moves_from(self.board(), from)
    }

    /// Legal drops of `kind` for the side to move
    pub fn legal_drops(&self, kind: PieceKind) -> Vec<Move> {
        rules::legal_drops(self.board(), self.board().side_to_move(), kind)
    }

    pub fn can_promote(&self, mv: &Move) -> bool {
        rules::can_promote(mv)
    }

    pub fn must_promote(&self, mv: &Move) -> bool {
        rules::must_promote(mv)
    }

    pub fn is_legal_move(&self, mv: &Move) -> bool {
        rules::is_legal_move(self.board(), mv)
    }

    /// Set where edits are saved
    pub fn set_target(&mut self, target: Option<SaveTarget>) {
        self.target = target;
    }

    pub fn target(&self) -> Option<&SaveTarget> {
        self.target.as_ref()
    }

    /// Start the background writer. Must be called from within a tokio runtime.
    pub fn start_persistence(&mut self, store: Arc<dyn KifuStore>) {
        self.persist.start(store);
    }

    /// Queue the committed tree for saving. Returns the request's sequence
    /// number, or `None` without a target.
    pub fn save(&mut self) -> KifuResult<Option<u64>> {
        let Some(target) = &self.target else {
            return Ok(None);
        };
        self.persist.enqueue(&self.tree, target).map(Some)
    }

    fn autosave(&mut self) {
        if !self.autosave || !self.persist.is_running() {
            return;
        }
        if let Err(e) = self.save() {
            warn!(error = %e, "autosave failed");
            self.save_error = Some(e);
        }
    }

    /// Drain save results. Returns the newest failure, if any.
    pub fn process_persistence_events(&mut self) -> Option<KifuError> {
        self.persist.process_pending_events();
        self.save_error.take().or_else(|| self.persist.take_failure())
    }

    /// Wait until the latest save has finished, then report its failure
    pub async fn flush(&mut self) -> Option<KifuError> {
        self.persist.flush().await;
        self.process_persistence_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::KifuFormat;
    use crate::domain::move_tree::tests::{mv, sample_tree};
    use crate::domain::shogi::{Color, Play};
    use crate::models::persist::FsStore;
    use async_trait::async_trait;

    fn sq(file: u8, rank: u8) -> Square {
        Square::new(file, rank).unwrap()
    }

    fn play_move(play: Play) -> Move {
        *play.as_move().unwrap()
    }

    #[test]
    fn test_navigation() {
        let mut session = KifuSession::new(sample_tree());
        assert!(session.is_at_root());
        assert!(!session.go_back().unwrap());
        assert!(session.go_forward().unwrap());
        assert_eq!(session.cursor().move_number, 1);
        session.go_to_end().unwrap();
        assert_eq!(session.cursor().move_number, 3);
        assert!(session.is_at_end());
        session.go_to_start().unwrap();
        assert_eq!(session.board(), &Board::startpos());
    }

    #[test]
    fn test_planned_branch_survives_going_back() {
        let mut session = KifuSession::new(sample_tree());
        session.go_forward().unwrap();
        session.select_branch(1).unwrap();
        assert_eq!(session.cursor().pointer_at(2), Some(0));
        session.go_to_start().unwrap();
        session.go_to_end().unwrap();
        assert_eq!(session.cursor().move_number, 3);
        assert_eq!(session.cursor().applied_pointers(), vec![ForkPointer::new(2, 0)]);
    }

    #[test]
    fn test_select_missing_branch() {
        let mut session = KifuSession::new(sample_tree());
        assert!(matches!(
            session.select_branch(4),
            Err(KifuError::BranchNotFound { ply: 1, fork_index: 4 })
        ));
        assert!(session.is_at_root());
    }

    #[test]
    fn test_insert_move_commits_pair() {
        let mut session = KifuSession::new(sample_tree());
        session.go_forward().unwrap();
        let reply = Move::normal(Color::White, PieceKind::Pawn, sq(4, 3), sq(4, 4), false);
        session.insert_move(reply).unwrap();
        assert_eq!(session.cursor(), &Cursor::new(2, [ForkPointer::new(2, 1)]));
        assert_eq!(session.view().last_move, Some(Play::Move(reply)));
        assert!(session.board().piece_at(sq(4, 4)).is_some());
    }

    #[test]
    fn test_rejected_edit_leaves_state() {
        let mut session = KifuSession::new(sample_tree());
        session.go_forward().unwrap();
        let before_tree = session.tree().clone();
        let before_cursor = session.cursor().clone();
        let illegal = Move::normal(Color::White, PieceKind::Rook, sq(8, 2), sq(8, 8), false);
        assert!(!session.is_legal_move(&illegal));
        assert!(matches!(
            session.insert_move(illegal),
            Err(KifuError::IllegalMove { .. })
        ));
        assert!(matches!(
            session.delete_branch(None),
            Err(KifuError::BranchIsMainLine)
        ));
        assert_eq!(session.tree(), &before_tree);
        assert_eq!(session.cursor(), &before_cursor);
    }

    #[test]
    fn test_branch_edits() {
        let mut session = KifuSession::new(sample_tree());
        session
            .go_to(&Cursor::new(3, [ForkPointer::new(2, 0)]))
            .unwrap();
        let board = session.board().clone();
        session.promote_variation(None).unwrap();
        assert_eq!(session.cursor(), &Cursor::new(3, []));
        assert_eq!(session.board(), &board);

        session.go_to(&Cursor::new(2, [ForkPointer::new(2, 0)])).unwrap();
        session.delete_branch(None).unwrap();
        assert_eq!(session.cursor(), &Cursor::new(1, []));
        assert_eq!(session.tree().lines().len(), 3);
    }

    #[test]
    fn test_unplayable_record_keeps_last_good_cursor() {
        let tree = MoveTree::from_main_line(
            Board::startpos(),
            [
                mv(Color::Black, PieceKind::Pawn, (7, 7), (7, 6)),
                mv(Color::White, PieceKind::Pawn, (5, 5), (5, 6)),
            ],
        );
        let mut session = KifuSession::new(tree);
        session.go_forward().unwrap();
        let err = session.go_forward().unwrap_err();
        assert!(matches!(err, KifuError::EngineSeekFailure { ply: 2, .. }));
        assert_eq!(session.cursor().move_number, 1);
    }

    #[test]
    fn test_go_to_nearest() {
        let mut session = KifuSession::new(sample_tree());
        session
            .go_to_nearest(&Cursor::new(3, [ForkPointer::new(2, 7)]))
            .unwrap();
        assert_eq!(session.cursor(), &Cursor::new(1, []));
    }

    #[test]
    fn test_validator_queries_use_current_board() {
        let mut session = KifuSession::new(sample_tree());
        assert_eq!(session.legal_moves_from(sq(7, 7)).len(), 1);
        session.go_forward().unwrap();
        assert!(session.legal_moves_from(sq(7, 6)).is_empty());
        assert!(session.legal_drops(PieceKind::Pawn).is_empty());
        let step = play_move(mv(Color::Black, PieceKind::Pawn, (7, 6), (7, 5)));
        assert!(!session.can_promote(&step));
        assert!(!session.must_promote(&step));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_confirm_moves_committed_cursor() {
        let mut session = KifuSession::new(sample_tree());
        session.enter_preview().unwrap();
        session.preview_select(1);
        session.preview_forward().unwrap();
        assert!(session.is_at_root());

        let frame = session.next_preview_frame().await.unwrap().unwrap();
        assert_eq!(frame.cursor, Cursor::new(1, [ForkPointer::new(1, 0)]));

        assert!(session.confirm_preview().unwrap());
        assert_eq!(session.cursor(), &Cursor::new(1, [ForkPointer::new(1, 0)]));
        assert!(!session.confirm_preview().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_cancel_keeps_committed_cursor() {
        let mut session = KifuSession::new(sample_tree());
        session.enter_preview().unwrap();
        session.preview_forward().unwrap();
        session.preview_backward().unwrap();
        session.preview_forward().unwrap();
        session.cancel_preview();
        assert!(session.is_at_root());
        assert!(!session.preview().is_previewing());
    }

    #[tokio::test]
    async fn test_autosave_writes_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.kif");
        let mut session = KifuSession::new(sample_tree());
        session.set_target(Some(SaveTarget::new(&path, KifuFormat::Kif)));
        session.start_persistence(Arc::new(FsStore));

        session.go_to(&Cursor::new(3, [])).unwrap();
        let reply = Move::normal(Color::White, PieceKind::Pawn, sq(8, 3), sq(8, 4), false);
        session.insert_move(reply).unwrap();
        assert!(session.flush().await.is_none());
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("   4 ８四歩(83)"));
    }

    struct FailingStore;

    #[async_trait]
    impl KifuStore for FailingStore {
        async fn save(&self, _target: &SaveTarget, _payload: &str) -> Result<(), String> {
            Err("read-only".to_string())
        }
    }

    #[tokio::test]
    async fn test_save_failure_keeps_committed_state() {
        let mut session = KifuSession::new(sample_tree());
        session.set_target(Some(SaveTarget::new("unused.kif", KifuFormat::Kif)));
        session.start_persistence(Arc::new(FailingStore));
        session.go_to(&Cursor::new(3, [])).unwrap();
        let reply = Move::normal(Color::White, PieceKind::Pawn, sq(8, 3), sq(8, 4), false);
        session.insert_move(reply).unwrap();
        assert!(matches!(
            session.flush().await,
            Some(KifuError::PersistenceFailure { .. })
        ));
        assert_eq!(session.cursor().move_number, 4);
    }
}
