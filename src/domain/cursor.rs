//! Cursor algebra: paths of branch choices through a move tree.
//!
//! A [`Cursor`] names one position in the tree by a ply number plus the
//! ordered list of [`ForkPointer`]s that select alternative continuations on
//! the way there. Pointers beyond the cursor's ply are "planned" choices: they
//! are kept so that stepping forward again re-enters the branch the user was
//! last looking at.
//!
//! Everything here is pure. Cursors are values and are replaced wholesale.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// "At ply `branch_move_number`, take fork `fork_index` of the node there"
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ForkPointer {
    pub branch_move_number: u32,
    pub fork_index: usize,
}

impl ForkPointer {
    pub fn new(branch_move_number: u32, fork_index: usize) -> Self {
        Self {
            branch_move_number,
            fork_index,
        }
    }
}

impl fmt::Display for ForkPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.branch_move_number, self.fork_index)
    }
}

/// Sort by ply, keep the last entry per ply, and drop entries past
/// `move_number` when one is given.
pub fn normalize<I>(pointers: I, move_number: Option<u32>) -> Vec<ForkPointer>
where
    I: IntoIterator<Item = ForkPointer>,
{
    let mut by_ply = BTreeMap::new();
    for p in pointers {
        if move_number.is_some_and(|n| p.branch_move_number > n) {
            continue;
        }
        by_ply.insert(p.branch_move_number, p.fork_index);
    }
    by_ply
        .into_iter()
        .map(|(ply, index)| ForkPointer::new(ply, index))
        .collect()
}

/// Reconcile the pointers a replay actually applied (`new`) with the
/// previously planned ones: at or below `move_number` the replay wins, above
/// it the plan is kept.
pub fn merge(new: &[ForkPointer], previous: &[ForkPointer], move_number: u32) -> Vec<ForkPointer> {
    let applied = new
        .iter()
        .copied()
        .filter(|p| p.branch_move_number <= move_number);
    let planned = previous
        .iter()
        .copied()
        .filter(|p| p.branch_move_number > move_number);
    normalize(applied.chain(planned), None)
}

/// Opaque name of the node a cursor resolves to.
///
/// Two cursors share an identity iff they land on the same node of the same
/// tree, regardless of their planned pointers.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct PathIdentity(String);

impl PathIdentity {
    pub const ROOT: &'static str = "ROOT";

    pub fn root() -> Self {
        PathIdentity(Self::ROOT.to_string())
    }

    /// Identity of the node reached at `move_number` through `applied` pointers
    pub fn compute(move_number: u32, applied: &[ForkPointer]) -> Self {
        if move_number == 0 {
            return Self::root();
        }
        let path: Vec<String> = normalize(applied.iter().copied(), Some(move_number))
            .iter()
            .map(ForkPointer::to_string)
            .collect();
        PathIdentity(format!("{}@{}", move_number, path.join(",")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A position in the move tree
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Cursor {
    pub move_number: u32,
    pub fork_pointers: Vec<ForkPointer>,
    pub path_identity: PathIdentity,
}

impl Cursor {
    /// The starting position
    pub fn root() -> Self {
        Self {
            move_number: 0,
            fork_pointers: Vec::new(),
            path_identity: PathIdentity::root(),
        }
    }

    /// Build a cursor, normalizing the pointers but keeping planned ones
    pub fn new(move_number: u32, pointers: impl IntoIterator<Item = ForkPointer>) -> Self {
        let fork_pointers = normalize(pointers, None);
        let path_identity = PathIdentity::compute(move_number, &fork_pointers);
        Self {
            move_number,
            fork_pointers,
            path_identity,
        }
    }

    pub fn is_root(&self) -> bool {
        self.move_number == 0
    }

    /// Fork index chosen at `ply`, planned or applied
    pub fn pointer_at(&self, ply: u32) -> Option<usize> {
        self.fork_pointers
            .iter()
            .find(|p| p.branch_move_number == ply)
            .map(|p| p.fork_index)
    }

    /// Pointers at or below the cursor's ply
    pub fn applied_pointers(&self) -> Vec<ForkPointer> {
        normalize(self.fork_pointers.iter().copied(), Some(self.move_number))
    }

    /// Pointers past the cursor's ply
    pub fn planned_pointers(&self) -> Vec<ForkPointer> {
        self.fork_pointers
            .iter()
            .copied()
            .filter(|p| p.branch_move_number > self.move_number)
            .collect()
    }

    /// Same pointers, different ply
    pub fn at_move_number(&self, move_number: u32) -> Cursor {
        Cursor::new(move_number, self.fork_pointers.iter().copied())
    }

    /// Copy with `pointer` installed (replacing any pointer at the same ply)
    pub fn with_pointer(&self, pointer: ForkPointer) -> Cursor {
        let pointers = self.fork_pointers.iter().copied().chain(Some(pointer));
        Cursor::new(self.move_number, pointers)
    }

    /// Copy without the pointer at `ply`
    pub fn without_pointer(&self, ply: u32) -> Cursor {
        let pointers = self
            .fork_pointers
            .iter()
            .copied()
            .filter(|p| p.branch_move_number != ply);
        Cursor::new(self.move_number, pointers)
    }

    /// Whether both cursors resolve to the same node
    pub fn same_position(&self, other: &Cursor) -> bool {
        self.path_identity == other.path_identity
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::root()
    }
}

/// `cursor` moved to ply `n`, with every pointer past `n` dropped
pub fn trim_to_move_number(cursor: &Cursor, n: u32) -> Cursor {
    Cursor::new(n, normalize(cursor.fork_pointers.iter().copied(), Some(n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fp(ply: u32, index: usize) -> ForkPointer {
        ForkPointer::new(ply, index)
    }

    #[test]
    fn test_root_cursor() {
        let root = Cursor::root();
        assert_eq!(root.move_number, 0);
        assert!(root.fork_pointers.is_empty());
        assert_eq!(root.path_identity.as_str(), PathIdentity::ROOT);
        assert_eq!(Cursor::new(0, []), root);
    }

    #[test]
    fn test_normalize_sorts_and_keeps_last() {
        let out = normalize([fp(5, 1), fp(2, 0), fp(5, 3)], None);
        assert_eq!(out, vec![fp(2, 0), fp(5, 3)]);
    }

    #[test]
    fn test_normalize_trims() {
        let out = normalize([fp(2, 0), fp(4, 1), fp(7, 2)], Some(4));
        assert_eq!(out, vec![fp(2, 0), fp(4, 1)]);
    }

    #[test]
    fn test_merge_keeps_planned_pointers() {
        let previous = [fp(3, 1), fp(8, 2)];
        let new = [fp(2, 0), fp(9, 5)];
        assert_eq!(merge(&new, &previous, 5), vec![fp(2, 0), fp(8, 2)]);
    }

    #[test]
    fn test_trim_to_move_number() {
        let cursor = Cursor::new(10, [fp(3, 1), fp(8, 0)]);
        let trimmed = trim_to_move_number(&cursor, 5);
        assert_eq!(trimmed.move_number, 5);
        assert_eq!(trimmed.fork_pointers, vec![fp(3, 1)]);
    }

    #[test]
    fn test_identity_ignores_planned_pointers() {
        let a = Cursor::new(4, [fp(2, 1)]);
        let b = Cursor::new(4, [fp(2, 1), fp(6, 0)]);
        assert!(a.same_position(&b));
        assert_ne!(a, b);

        let c = Cursor::new(4, [fp(2, 0)]);
        assert!(!a.same_position(&c));
        assert!(!a.same_position(&a.at_move_number(3)));
    }

    #[test]
    fn test_pointer_helpers() {
        let cursor = Cursor::new(4, [fp(2, 1), fp(6, 0)]);
        assert_eq!(cursor.pointer_at(6), Some(0));
        assert_eq!(cursor.pointer_at(3), None);
        assert_eq!(cursor.applied_pointers(), vec![fp(2, 1)]);
        assert_eq!(cursor.planned_pointers(), vec![fp(6, 0)]);
        assert_eq!(cursor.with_pointer(fp(2, 3)).pointer_at(2), Some(3));
        assert_eq!(cursor.without_pointer(6).fork_pointers, vec![fp(2, 1)]);
    }

    fn pointers() -> impl Strategy<Value = Vec<ForkPointer>> {
        prop::collection::vec((0u32..20, 0usize..4), 0..12)
            .prop_map(|v| v.into_iter().map(|(ply, i)| fp(ply, i)).collect())
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(ps in pointers(), n in prop::option::of(0u32..20)) {
            let once = normalize(ps.clone(), n);
            let twice = normalize(once.clone(), n);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_normalize_is_sorted_and_unique(ps in pointers()) {
            let out = normalize(ps, None);
            for pair in out.windows(2) {
                prop_assert!(pair[0].branch_move_number < pair[1].branch_move_number);
            }
        }

        #[test]
        fn prop_normalize_last_write_wins(ps in pointers()) {
            let out = normalize(ps.clone(), None);
            for p in &out {
                let last = ps
                    .iter()
                    .rev()
                    .find(|q| q.branch_move_number == p.branch_move_number)
                    .unwrap();
                prop_assert_eq!(p.fork_index, last.fork_index);
            }
        }

        #[test]
        fn prop_trim_bounds_pointers(ps in pointers(), n in 0u32..20) {
            let cursor = Cursor::new(19, ps);
            let trimmed = trim_to_move_number(&cursor, n);
            prop_assert!(trimmed.fork_pointers.iter().all(|p| p.branch_move_number <= n));
        }
    }
}
