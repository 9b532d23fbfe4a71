//! Move tree data structure for representing kifu with variations.
//!
//! Nodes and sequences live in flat arenas and refer to each other by index,
//! so cloning a tree for an edit is a flat copy.
//!
//! The layout follows the usual kifu convention: sequence 0 is the main line
//! and starts with the empty root node at ply 0. A node may own forks, each an
//! alternative sequence whose first node replaces the owner at the owner's ply.
//! The first node of a fork never owns forks itself; alternatives to it are
//! listed on its owner.

use std::collections::BTreeMap;

use crate::domain::board::Board;
use crate::domain::cursor::ForkPointer;
use crate::domain::shogi::Play;
use crate::error::{KifuError, KifuResult};

/// Index of a node in the tree's node arena
pub type NodeId = usize;

/// Index of a sequence in the tree's sequence arena
pub type SequenceId = usize;

/// The empty root node
pub const ROOT_NODE: NodeId = 0;

/// The main line
pub const MAIN_SEQUENCE: SequenceId = 0;

/// One ply of a kifu
#[derive(Clone, Debug, PartialEq)]
pub struct MoveNode {
    /// The move or terminal marker (None only for the root)
    pub play: Option<Play>,
    /// Free-text annotations
    pub comments: Vec<String>,
    /// Alternative sequences diverging at this ply, in display order
    pub forks: Vec<SequenceId>,
    /// Sequence this node belongs to
    sequence: SequenceId,
}

impl MoveNode {
    fn new(play: Option<Play>, sequence: SequenceId) -> Self {
        Self {
            play,
            comments: Vec::new(),
            forks: Vec::new(),
            sequence,
        }
    }

    /// Check if this is the root node
    pub fn is_root(&self) -> bool {
        self.play.is_none()
    }

    /// Check if this node has variations
    pub fn has_forks(&self) -> bool {
        !self.forks.is_empty()
    }

    /// The sequence holding this node
    pub fn sequence(&self) -> SequenceId {
        self.sequence
    }
}

/// A run of consecutive plies
#[derive(Clone, Debug, PartialEq)]
pub struct Sequence {
    pub nodes: Vec<NodeId>,
    /// Ply of the first node
    pub start_ply: u32,
    /// Node this sequence is an alternative to (None for the main line)
    pub owner: Option<NodeId>,
}

impl Sequence {
    /// Node of this sequence at `ply`, if the sequence covers it
    pub fn node_at(&self, ply: u32) -> Option<NodeId> {
        let offset = ply.checked_sub(self.start_ply)?;
        self.nodes.get(offset as usize).copied()
    }

    /// Ply of the last node
    pub fn last_ply(&self) -> u32 {
        self.start_ply + self.nodes.len().saturating_sub(1) as u32
    }

    pub fn contains(&self, ply: u32) -> bool {
        ply >= self.start_ply && ply <= self.last_ply() && !self.nodes.is_empty()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }
}

/// One resolved ply along a path through the tree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub ply: u32,
    pub sequence: SequenceId,
    pub node: NodeId,
    /// The pointer that entered `sequence` at this ply, if any
    pub via: Option<ForkPointer>,
}

/// A kifu: initial position, header fields and the move tree
#[derive(Clone, Debug, PartialEq)]
pub struct MoveTree {
    initial: Board,
    header: BTreeMap<String, String>,
    nodes: Vec<MoveNode>,
    sequences: Vec<Sequence>,
}

impl MoveTree {
    /// Create a new tree with just the root (starting position)
    pub fn new() -> Self {
        Self::with_initial(Board::startpos())
    }

    /// Create a new tree starting from `initial`
    pub fn with_initial(initial: Board) -> Self {
        Self {
            initial,
            header: BTreeMap::new(),
            nodes: vec![MoveNode::new(None, MAIN_SEQUENCE)],
            sequences: vec![Sequence {
                nodes: vec![ROOT_NODE],
                start_ply: 0,
                owner: None,
            }],
        }
    }

    /// Build a tree holding a single line of plays
    pub fn from_main_line(initial: Board, plays: impl IntoIterator<Item = Play>) -> Self {
        let mut tree = Self::with_initial(initial);
        for play in plays {
            tree.append(MAIN_SEQUENCE, play);
        }
        tree
    }

    pub fn initial(&self) -> &Board {
        &self.initial
    }

    pub fn header(&self) -> &BTreeMap<String, String> {
        &self.header
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.header.insert(key.into(), value.into());
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&MoveNode> {
        self.nodes.get(id)
    }

    /// Get a mutable reference to a node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut MoveNode> {
        self.nodes.get_mut(id)
    }

    /// Get the root node
    pub fn root(&self) -> &MoveNode {
        &self.nodes[ROOT_NODE]
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(id)
    }

    /// Get the main line as a sequence of node IDs (from root to end)
    pub fn main_line(&self) -> &[NodeId] {
        &self.sequences[MAIN_SEQUENCE].nodes
    }

    /// Node of the main line at `ply`
    pub fn main_node_at(&self, ply: u32) -> Option<NodeId> {
        self.sequences[MAIN_SEQUENCE].node_at(ply)
    }

    /// Ply of a node, derived from its sequence
    pub fn ply_of(&self, id: NodeId) -> Option<u32> {
        let node = self.nodes.get(id)?;
        let seq = &self.sequences[node.sequence];
        let offset = seq.nodes.iter().position(|&n| n == id)?;
        Some(seq.start_ply + offset as u32)
    }

    /// Append a play to the end of a sequence
    pub fn append(&mut self, sequence: SequenceId, play: Play) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(MoveNode::new(Some(play), sequence));
        self.sequences[sequence].nodes.push(id);
        id
    }

    pub fn add_comment(&mut self, node: NodeId, text: impl Into<String>) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.comments.push(text.into());
        }
    }

    /// The node whose fork list holds alternatives to `node`: the node itself,
    /// or the owner of its sequence when it opens a fork
    pub fn fork_holder(&self, node: NodeId) -> NodeId {
        let mut current = node;
        loop {
            let seq = &self.sequences[self.nodes[current].sequence];
            match (seq.first(), seq.owner) {
                (Some(first), Some(owner)) if first == current => current = owner,
                _ => return current,
            }
        }
    }

    /// Add a new fork starting with `first` as an alternative to `owner`.
    /// Returns the new fork's sequence and its index in the holder's list.
    pub fn add_fork(&mut self, owner: NodeId, first: Play) -> KifuResult<(SequenceId, usize)> {
        if owner >= self.nodes.len() {
            return Err(KifuError::invalid_cursor(0, format!("node {owner} does not exist")));
        }
        let holder = self.fork_holder(owner);
        let start_ply = self
            .ply_of(holder)
            .ok_or_else(|| KifuError::invalid_cursor(0, "orphaned node"))?;
        if start_ply == 0 {
            return Err(KifuError::invalid_cursor(0, "the root has no alternatives"));
        }
        let seq = self.sequences.len();
        self.sequences.push(Sequence {
            nodes: Vec::new(),
            start_ply,
            owner: Some(holder),
        });
        self.append(seq, first);
        let forks = &mut self.nodes[holder].forks;
        forks.push(seq);
        Ok((seq, forks.len() - 1))
    }

    fn fork_list(&self, owner: NodeId) -> KifuResult<&Vec<SequenceId>> {
        let ply = self.ply_of(owner).unwrap_or(0);
        self.nodes
            .get(owner)
            .map(|n| &n.forks)
            .ok_or(KifuError::BranchNotFound { ply, fork_index: 0 })
    }

    fn check_fork(&self, owner: NodeId, index: usize) -> KifuResult<SequenceId> {
        let ply = self.ply_of(owner).unwrap_or(0);
        self.fork_list(owner)?
            .get(index)
            .copied()
            .ok_or(KifuError::BranchNotFound {
                ply,
                fork_index: index,
            })
    }

    /// Detach fork `index` from `owner`; later forks shift down by one
    pub fn remove_fork(&mut self, owner: NodeId, index: usize) -> KifuResult<SequenceId> {
        let seq = self.check_fork(owner, index)?;
        self.nodes[owner].forks.remove(index);
        Ok(seq)
    }

    /// Exchange the positions of forks `a` and `b` of `owner`
    pub fn swap_forks(&mut self, owner: NodeId, a: usize, b: usize) -> KifuResult<()> {
        self.check_fork(owner, a)?;
        self.check_fork(owner, b)?;
        self.nodes[owner].forks.swap(a, b);
        Ok(())
    }

    /// Make fork `index` of `owner` the continuation of `owner`'s sequence.
    ///
    /// The old continuation (from `owner` onward) becomes a fork appended to
    /// the list, which now hangs off the promoted fork's first node. Returns
    /// the index of that appended fork.
    pub fn promote_fork(&mut self, owner: NodeId, index: usize) -> KifuResult<usize> {
        let fork = self.check_fork(owner, index)?;
        let parent_seq = self.nodes[owner].sequence;
        let split = self.sequences[parent_seq]
            .nodes
            .iter()
            .position(|&n| n == owner)
            .ok_or_else(|| KifuError::invalid_cursor(0, "owner is not in its sequence"))?;

        let promoted_nodes = std::mem::take(&mut self.sequences[fork].nodes);
        let new_holder = promoted_nodes[0];
        let old_tail = self.sequences[parent_seq].nodes.split_off(split);

        for &n in &promoted_nodes {
            self.nodes[n].sequence = parent_seq;
        }
        for &n in &old_tail {
            self.nodes[n].sequence = fork;
        }
        self.sequences[parent_seq].nodes.extend(promoted_nodes);
        self.sequences[fork].nodes = old_tail;
        self.sequences[fork].owner = Some(new_holder);

        let mut forks = std::mem::take(&mut self.nodes[owner].forks);
        forks.remove(index);
        forks.push(fork);
        for &f in &forks {
            self.sequences[f].owner = Some(new_holder);
        }
        let appended = forks.len() - 1;
        self.nodes[new_holder].forks = forks;
        Ok(appended)
    }

    /// Resolve a path ply by ply up to `move_number`.
    ///
    /// At each ply the node of the active sequence is taken, unless a pointer
    /// names that ply, in which case the pointed fork of that node is entered.
    pub fn walk(&self, pointers: &[ForkPointer], move_number: u32) -> KifuResult<Vec<Step>> {
        let mut steps = Vec::with_capacity(move_number as usize + 1);
        steps.push(Step {
            ply: 0,
            sequence: MAIN_SEQUENCE,
            node: ROOT_NODE,
            via: None,
        });
        let mut sequence = MAIN_SEQUENCE;
        for ply in 1..=move_number {
            let owner = self.sequences[sequence].node_at(ply).ok_or_else(|| {
                KifuError::invalid_cursor(ply, format!("line ends at ply {}", ply - 1))
            })?;
            let pointer = pointers.iter().rev().find(|p| p.branch_move_number == ply);
            let step = match pointer {
                None => Step {
                    ply,
                    sequence,
                    node: owner,
                    via: None,
                },
                Some(p) => {
                    let fork = self.nodes[owner].forks.get(p.fork_index).copied().ok_or_else(
                        || KifuError::invalid_cursor(ply, format!("no fork {}", p.fork_index)),
                    )?;
                    sequence = fork;
                    Step {
                        ply,
                        sequence,
                        node: self.sequences[fork].nodes[0],
                        via: Some(*p),
                    }
                }
            };
            steps.push(step);
        }
        Ok(steps)
    }

    /// The node that would be played next from `step`, before any fork choice
    pub fn next_after(&self, step: &Step) -> Option<NodeId> {
        self.sequences[step.sequence].node_at(step.ply + 1)
    }

    /// Every reachable line from the root to the end of a sequence
    pub fn lines(&self) -> Vec<Vec<Play>> {
        let mut out = Vec::new();
        self.collect_lines(MAIN_SEQUENCE, Vec::new(), &mut out);
        out
    }

    fn collect_lines(&self, sequence: SequenceId, prefix: Vec<Play>, out: &mut Vec<Vec<Play>>) {
        let mut line = prefix;
        for &id in &self.sequences[sequence].nodes {
            let node = &self.nodes[id];
            for &fork in &node.forks {
                self.collect_lines(fork, line.clone(), out);
            }
            if let Some(play) = node.play {
                line.push(play);
            }
        }
        out.push(line);
    }

    /// Rebuild the arenas keeping only reachable nodes and sequences
    pub fn compact(&mut self) {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut sequences = Vec::with_capacity(self.sequences.len());
        self.copy_sequence(MAIN_SEQUENCE, None, &mut nodes, &mut sequences);
        self.nodes = nodes;
        self.sequences = sequences;
    }

    fn copy_sequence(
        &self,
        old: SequenceId,
        owner: Option<NodeId>,
        nodes: &mut Vec<MoveNode>,
        sequences: &mut Vec<Sequence>,
    ) -> SequenceId {
        let id = sequences.len();
        sequences.push(Sequence {
            nodes: Vec::new(),
            start_ply: self.sequences[old].start_ply,
            owner,
        });
        for &old_node in &self.sequences[old].nodes {
            let source = &self.nodes[old_node];
            let new_node = nodes.len();
            nodes.push(MoveNode {
                play: source.play,
                comments: source.comments.clone(),
                forks: Vec::new(),
                sequence: id,
            });
            sequences[id].nodes.push(new_node);
            let forks = source
                .forks
                .iter()
                .map(|&f| self.copy_sequence(f, Some(new_node), nodes, sequences))
                .collect();
            nodes[new_node].forks = forks;
        }
        id
    }

    /// Number of nodes in the arena, reachable or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty (only root)
    pub fn is_empty(&self) -> bool {
        self.sequences[MAIN_SEQUENCE].nodes.len() == 1 && self.root().forks.is_empty()
    }
}

impl Default for MoveTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::shogi::{Color, Move, PieceKind, Square, Terminal};

    pub(crate) fn mv(color: Color, kind: PieceKind, from: (u8, u8), to: (u8, u8)) -> Play {
        Play::Move(Move::normal(
            color,
            kind,
            Square::new(from.0, from.1).unwrap(),
            Square::new(to.0, to.1).unwrap(),
            false,
        ))
    }

    /// Main line 7g7f 3c3d 2g2f with alternatives 2g2f at ply 1 and
    /// 8c8d at ply 2, the latter carrying a nested alternative at ply 3
    pub(crate) fn sample_tree() -> MoveTree {
        let mut tree = MoveTree::from_main_line(
            Board::startpos(),
            [
                mv(Color::Black, PieceKind::Pawn, (7, 7), (7, 6)),
                mv(Color::White, PieceKind::Pawn, (3, 3), (3, 4)),
                mv(Color::Black, PieceKind::Pawn, (2, 7), (2, 6)),
            ],
        );
        let ply1 = tree.main_node_at(1).unwrap();
        tree.add_fork(ply1, mv(Color::Black, PieceKind::Pawn, (2, 7), (2, 6)))
            .unwrap();
        let ply2 = tree.main_node_at(2).unwrap();
        let (fork, _) = tree
            .add_fork(ply2, mv(Color::White, PieceKind::Pawn, (8, 3), (8, 4)))
            .unwrap();
        let fork_ply3 = tree.append(fork, mv(Color::Black, PieceKind::Pawn, (2, 7), (2, 6)));
        tree.add_fork(fork_ply3, mv(Color::Black, PieceKind::Pawn, (6, 7), (6, 6)))
            .unwrap();
        tree
    }

    #[test]
    fn test_new_tree() {
        let tree = MoveTree::new();
        assert_eq!(tree.len(), 1);
        assert!(tree.is_empty());
        assert!(tree.root().is_root());
        assert_eq!(tree.main_line(), &[ROOT_NODE]);
    }

    #[test]
    fn test_append() {
        let mut tree = MoveTree::new();
        let id1 = tree.append(MAIN_SEQUENCE, mv(Color::Black, PieceKind::Pawn, (7, 7), (7, 6)));
        assert_eq!(id1, 1);
        let id2 = tree.append(MAIN_SEQUENCE, Play::Terminal(Terminal::Resign));
        assert_eq!(id2, 2);
        assert_eq!(tree.main_node_at(2), Some(id2));
        assert_eq!(tree.ply_of(id2), Some(2));
        assert!(!tree.is_empty());
    }

    #[test]
    fn test_variations() {
        let tree = sample_tree();
        let ply1 = tree.main_node_at(1).unwrap();
        assert!(tree.get(ply1).unwrap().has_forks());
        let fork = tree.get(ply1).unwrap().forks[0];
        assert_eq!(tree.sequence(fork).unwrap().start_ply, 1);
        assert_eq!(tree.sequence(fork).unwrap().owner, Some(ply1));
        assert_eq!(tree.lines().len(), 4);
    }

    #[test]
    fn test_root_has_no_alternatives() {
        let mut tree = MoveTree::new();
        let play = mv(Color::Black, PieceKind::Pawn, (7, 7), (7, 6));
        assert!(tree.add_fork(ROOT_NODE, play).is_err());
    }

    #[test]
    fn test_fork_on_first_node_is_rehomed() {
        let mut tree = sample_tree();
        let ply1 = tree.main_node_at(1).unwrap();
        let fork = tree.get(ply1).unwrap().forks[0];
        let first = tree.sequence(fork).unwrap().nodes[0];
        let (_, index) = tree
            .add_fork(first, mv(Color::Black, PieceKind::Pawn, (1, 7), (1, 6)))
            .unwrap();
        assert_eq!(index, 1);
        assert!(tree.get(first).unwrap().forks.is_empty());
        assert_eq!(tree.get(ply1).unwrap().forks.len(), 2);
    }

    #[test]
    fn test_walk_follows_pointers() {
        let tree = sample_tree();
        let steps = tree.walk(&[], 3).unwrap();
        assert_eq!(steps.len(), 4);
        assert!(steps.iter().all(|s| s.sequence == MAIN_SEQUENCE));

        let steps = tree.walk(&[ForkPointer::new(2, 0)], 3).unwrap();
        assert_ne!(steps[2].sequence, MAIN_SEQUENCE);
        assert_eq!(steps[2].via, Some(ForkPointer::new(2, 0)));
        assert_eq!(steps[3].sequence, steps[2].sequence);
    }

    #[test]
    fn test_walk_rejects_stale_paths() {
        let tree = sample_tree();
        assert!(matches!(
            tree.walk(&[ForkPointer::new(2, 5)], 2),
            Err(KifuError::InvalidCursor { ply: 2, .. })
        ));
        assert!(matches!(
            tree.walk(&[], 9),
            Err(KifuError::InvalidCursor { ply: 4, .. })
        ));
        assert!(tree.walk(&[ForkPointer::new(3, 0)], 3).is_err());
    }

    #[test]
    fn test_promote_fork_swaps_lines() {
        let mut tree = sample_tree();
        let before = tree.lines();
        let ply2 = tree.main_node_at(2).unwrap();
        let appended = tree.promote_fork(ply2, 0).unwrap();
        assert_eq!(appended, 0);

        let new_ply2 = tree.main_node_at(2).unwrap();
        assert_ne!(new_ply2, ply2);
        assert_eq!(tree.get(new_ply2).unwrap().forks.len(), 1);
        assert!(tree.get(ply2).unwrap().forks.is_empty());
        assert_eq!(tree.main_line().len(), 4);

        let mut after = tree.lines();
        let mut expected = before;
        after.sort_by_key(|l| format!("{l:?}"));
        expected.sort_by_key(|l| format!("{l:?}"));
        assert_eq!(after, expected);
    }

    #[test]
    fn test_remove_and_compact() {
        let mut tree = sample_tree();
        let ply2 = tree.main_node_at(2).unwrap();
        tree.remove_fork(ply2, 0).unwrap();
        assert!(matches!(
            tree.remove_fork(ply2, 0),
            Err(KifuError::BranchNotFound { ply: 2, fork_index: 0 })
        ));
        let lines = tree.lines();
        let before_len = tree.len();
        tree.compact();
        assert!(tree.len() < before_len);
        assert_eq!(tree.lines(), lines);
        assert_eq!(tree.main_line().len(), 4);
    }

    #[test]
    fn test_swap_forks_checks_bounds() {
        let mut tree = sample_tree();
        let ply1 = tree.main_node_at(1).unwrap();
        assert!(tree.swap_forks(ply1, 0, 1).is_err());
        tree.swap_forks(ply1, 0, 0).unwrap();
    }
}
