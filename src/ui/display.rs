//! Display generation for the move list and board.
//!
//! This module transforms session state into display-ready view models.
//! It lives in the UI layer and depends on domain + models, not vice versa.

use std::fmt::Write as _;

use crate::domain::kif;
use crate::domain::move_tree::Step;
use crate::domain::shogi::HAND_KINDS;
use crate::domain::{Board, Color, Cursor, MoveTree, NodeId, Play, PositionView, Square};
use crate::error::KifuResult;
use crate::models::preview::BranchOption;
use crate::ui::view_models::{
    LineMoveDisplay, OptionDisplay, VariationDisplay, VariationMoveDisplay,
};

/// The path a cursor selects, followed past the cursor to the end of the line.
/// Planned pointers steer the continuation; one that no longer resolves is
/// skipped.
fn full_line(tree: &MoveTree, cursor: &Cursor) -> KifuResult<Vec<Step>> {
    let mut pointers = cursor.fork_pointers.clone();
    let mut steps = tree.walk(&pointers, cursor.move_number)?;
    loop {
        let ply = steps.len() as u32;
        match tree.walk(&pointers, ply) {
            Ok(longer) => steps = longer,
            Err(_) if pointers.iter().any(|p| p.branch_move_number == ply) => {
                pointers.retain(|p| p.branch_move_number != ply);
            }
            Err(_) => return Ok(steps),
        }
    }
}

/// Get the active line for display.
/// Returns every move of the line the cursor is on, including planned plies.
pub fn active_line_display(tree: &MoveTree, cursor: &Cursor) -> KifuResult<Vec<LineMoveDisplay>> {
    let steps = full_line(tree, cursor)?;
    let mut board = Some(tree.initial().clone());
    let mut previous: Option<Square> = None;
    let mut result = Vec::with_capacity(steps.len());

    for step in steps.iter().skip(1) {
        let Some(node) = tree.get(step.node) else {
            continue;
        };
        let Some(play) = node.play else { continue };

        // Once a move fails to apply, checks are no longer known
        let failed = match (board.as_mut(), play) {
            (Some(b), Play::Move(mv)) => b.apply(&mv).is_err(),
            _ => false,
        };
        if failed {
            board = None;
        }
        let is_check = match (&board, play) {
            (Some(b), Play::Move(_)) => b.in_check(b.side_to_move()),
            _ => false,
        };

        // Alternatives to this ply hang off the node the fork replaced
        let holder = match step.via {
            Some(_) => None,
            None => Some(node),
        };
        let color = match play {
            Play::Move(mv) => mv.color,
            Play::Terminal(_) => side_at(tree, step.ply),
        };

        result.push(LineMoveDisplay {
            node_id: step.node,
            ply: step.ply,
            color,
            notation: kif::play_notation(&play, previous),
            fork_count: holder.map(|n| n.forks.len()).unwrap_or(0),
            is_check,
            is_current: step.ply == cursor.move_number,
        });
        previous = play.as_move().map(|m| m.to);
    }

    Ok(result)
}

fn side_at(tree: &MoveTree, ply: u32) -> Color {
    let first = tree.initial().side_to_move();
    if ply % 2 == 1 { first } else { first.opponent() }
}

/// Get the alternatives recorded at a node.
/// Returns one line per fork, in fork order.
pub fn variations_at(tree: &MoveTree, node_id: NodeId) -> Vec<VariationDisplay> {
    let Some(node) = tree.get(node_id) else {
        return Vec::new();
    };

    let mut variations = Vec::new();
    for (fork_index, &fork) in node.forks.iter().enumerate() {
        let Some(sequence) = tree.sequence(fork) else {
            continue;
        };
        let mut previous = kif::destination_before(tree, fork, sequence.start_ply);
        let mut moves = Vec::new();
        for (offset, &id) in sequence.nodes.iter().enumerate() {
            let Some(play) = tree.get(id).and_then(|n| n.play) else {
                continue;
            };
            moves.push(VariationMoveDisplay {
                node_id: id,
                ply: sequence.start_ply + offset as u32,
                notation: kif::play_notation(&play, previous),
                has_forks: tree.get(id).is_some_and(|n| n.has_forks()),
            });
            previous = play.as_move().map(|m| m.to);
        }
        variations.push(VariationDisplay {
            ply: sequence.start_ply,
            fork_index,
            moves,
        });
    }
    variations
}

/// Labels for the continuations of a position.
/// `previous` is the destination of the move just played, for `同` notation.
pub fn options_display(
    options: &[BranchOption],
    previous: Option<Square>,
    selected: Option<usize>,
) -> Vec<OptionDisplay> {
    options
        .iter()
        .enumerate()
        .map(|(index, option)| OptionDisplay {
            index,
            label: kif::play_notation(&option.play, previous),
            fork_index: option.fork_index,
            selected: selected == Some(index),
        })
        .collect()
}

/// CSA-style diagram: hands, then ranks one to nine, file nine on the left
pub fn board_diagram(board: &Board) -> String {
    let mut out = String::new();
    for rank in 1..=9 {
        let _ = write!(out, "P{rank}");
        for file in (1..=9).rev() {
            let piece = Square::new(file, rank).and_then(|sq| board.piece_at(sq));
            match piece {
                Some(p) => {
                    let sign = if p.color == Color::Black { '+' } else { '-' };
                    let _ = write!(out, "{sign}{}", p.kind.csa());
                }
                None => out.push_str(" * "),
            }
        }
        out.push('\n');
    }
    for (color, sign) in [(Color::Black, '+'), (Color::White, '-')] {
        if board.is_hand_empty(color) {
            continue;
        }
        let _ = write!(out, "P{sign}");
        for kind in HAND_KINDS {
            for _ in 0..board.hand_count(color, kind) {
                let _ = write!(out, "00{}", kind.csa());
            }
        }
        out.push('\n');
    }
    out.push(if board.side_to_move() == Color::Black { '+' } else { '-' });
    out.push('\n');
    out
}

/// Header line plus board diagram for a resolved position
pub fn position_display(view: &PositionView) -> String {
    let last = view
        .last_move
        .map(|p| kif::play_notation(&p, None))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "ply {} [{}] last {}\n{}",
        view.move_number,
        view.identity,
        last,
        board_diagram(&view.board)
    )
}

/// Render the active line as text, one move per row.
/// `*` marks the cursor, `+N` the number of alternatives.
pub fn move_list_text(moves: &[LineMoveDisplay]) -> String {
    let mut out = String::new();
    for m in moves {
        let marker = if m.is_current { '*' } else { ' ' };
        let _ = write!(out, "{marker}{:>4} {}", m.ply, m.notation);
        if m.is_check {
            out.push_str(" 王手");
        }
        if m.fork_count > 0 {
            let _ = write!(out, " +{}", m.fork_count);
        }
        out.push('\n');
    }
    out
}

/// Continuations of the cursor's position, `>` on the selected one,
/// followed by the full alternative lines recorded for the next ply.
/// Empty when the position has a single continuation.
pub fn branches_text(options: &[OptionDisplay], variations: &[VariationDisplay]) -> String {
    let mut out = String::new();
    if options.len() < 2 {
        return out;
    }
    out.push_str("next\n");
    for option in options {
        let marker = if option.selected { '>' } else { ' ' };
        let _ = writeln!(out, "{marker} {} {}", option.index, option.label);
    }
    for variation in variations {
        let _ = write!(out, "  変化：{}手 [{}]", variation.ply, variation.fork_index);
        for m in &variation.moves {
            let _ = write!(out, " {}", m.notation);
        }
        out.push('\n');
    }
    out
}
