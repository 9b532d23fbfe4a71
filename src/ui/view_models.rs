//! View models for rendering kifu moves and branches.
//!
//! These types are DTOs (Data Transfer Objects) that prepare session state
//! for display. They live in the UI layer, not the domain layer.

use crate::domain::{Color, NodeId};

/// Display data for a move on the active line
#[derive(Clone, Debug, PartialEq)]
pub struct LineMoveDisplay {
    pub node_id: NodeId,
    pub ply: u32,
    pub color: Color,
    /// KIF notation, e.g. `７六歩(77)`
    pub notation: String,
    /// Number of alternatives recorded for this ply
    pub fork_count: usize,
    /// Whether this move gives check
    pub is_check: bool,
    /// Whether this is the move the cursor sits on
    pub is_current: bool,
}

/// Display data for one alternative line
#[derive(Clone, Debug, PartialEq)]
pub struct VariationDisplay {
    /// Ply of the first move of the line
    pub ply: u32,
    pub fork_index: usize,
    pub moves: Vec<VariationMoveDisplay>,
}

/// Display data for a single move within a variation
#[derive(Clone, Debug, PartialEq)]
pub struct VariationMoveDisplay {
    pub node_id: NodeId,
    pub ply: u32,
    pub notation: String,
    /// Whether this move has alternatives of its own
    pub has_forks: bool,
}

/// One selectable continuation
#[derive(Clone, Debug, PartialEq)]
pub struct OptionDisplay {
    pub index: usize,
    pub label: String,
    /// `None` for the continuation of the active line
    pub fork_index: Option<usize>,
    pub selected: bool,
}
