//! Legal move validation.
//!
//! Every function here is total: a query that makes no sense for the board
//! (empty square, wrong side, piece not in hand) yields an empty list or
//! `false`, never an error. Callers treat "empty" as "not legal".
//!
//! The ruleset is the strict one: two unpromoted pawns on a file, drops onto
//! ranks where the piece could never move again, and a pawn drop that
//! delivers unescapable checkmate are all rejected.

use crate::domain::board::Board;
use crate::domain::shogi::{Color, HAND_KINDS, Move, PieceKind, Square};

/// Whether `mv` may be played as a promotion
pub fn can_promote(mv: &Move) -> bool {
    let Some(from) = mv.from else {
        return false;
    };
    mv.kind.is_promotable()
        && (from.in_promotion_zone(mv.color) || mv.to.in_promotion_zone(mv.color))
}

/// Whether leaving the piece unpromoted would strand it with no future moves
pub fn must_promote(mv: &Move) -> bool {
    !mv.is_drop() && is_dead_end(mv.color, mv.kind, mv.to)
}

/// Squares from which an unpromoted pawn, lance or knight can never move
fn is_dead_end(color: Color, kind: PieceKind, to: Square) -> bool {
    let rank = to.relative_rank(color);
    match kind {
        PieceKind::Pawn | PieceKind::Lance => rank == 1,
        PieceKind::Knight => rank <= 2,
        _ => false,
    }
}

pub fn pseudo_legal_moves_from(board: &Board, from: Square) -> Vec<Move> {
    board.pseudo_legal_moves_from(from)
}

pub fn pseudo_legal_drops(board: &Board, color: Color, kind: PieceKind) -> Vec<Move> {
    board.pseudo_legal_drops(color, kind)
}

fn leaves_king_safe(board: &Board, mv: &Move) -> bool {
    let mut after = board.clone();
    after.apply(mv).is_ok() && !after.in_check(mv.color)
}

/// Legal moves of the side-to-move's piece on `from`
pub fn legal_moves_from(board: &Board, from: Square) -> Vec<Move> {
    match board.piece_at(from) {
        Some(piece) if piece.color == board.side_to_move() => board
            .pseudo_legal_moves_from(from)
            .into_iter()
            .filter(|mv| leaves_king_safe(board, mv))
            .collect(),
        _ => Vec::new(),
    }
}

/// Legal drops of `kind` for `color`
pub fn legal_drops(board: &Board, color: Color, kind: PieceKind) -> Vec<Move> {
    legal_drops_with(board, color, kind, true)
}

fn legal_drops_with(
    board: &Board,
    color: Color,
    kind: PieceKind,
    check_drop_mate: bool,
) -> Vec<Move> {
    if color != board.side_to_move() {
        return Vec::new();
    }
    board
        .pseudo_legal_drops(color, kind)
        .into_iter()
        .filter(|mv| !is_dead_end(color, kind, mv.to))
        .filter(|mv| kind != PieceKind::Pawn || !has_unpromoted_pawn_on_file(board, color, mv.to.file))
        .filter(|mv| leaves_king_safe(board, mv))
        .filter(|mv| !(check_drop_mate && kind == PieceKind::Pawn && is_pawn_drop_mate(board, mv)))
        .collect()
}

fn has_unpromoted_pawn_on_file(board: &Board, color: Color, file: u8) -> bool {
    (1..=9).filter_map(|rank| Square::new(file, rank)).any(|sq| {
        board
            .piece_at(sq)
            .is_some_and(|p| p.color == color && p.kind == PieceKind::Pawn)
    })
}

fn is_pawn_drop_mate(board: &Board, drop: &Move) -> bool {
    let mut after = board.clone();
    if after.apply(drop).is_err() {
        return false;
    }
    let defender = drop.color.opponent();
    after.in_check(defender) && !has_any_legal_move(&after)
}

/// Whether the side to move has at least one legal move or drop.
///
/// Pawn drops are counted without the drop-mate restriction to keep the
/// search from recursing.
pub fn has_any_legal_move(board: &Board) -> bool {
    let side = board.side_to_move();
    let has_board_move = board
        .squares_of(side)
        .any(|from| !legal_moves_from(board, from).is_empty());
    has_board_move
        || HAND_KINDS
            .iter()
            .any(|&kind| !legal_drops_with(board, side, kind, false).is_empty())
}

/// Every legal move and drop for the side to move
pub fn all_legal_moves(board: &Board) -> Vec<Move> {
    let side = board.side_to_move();
    let mut out: Vec<Move> = board
        .squares_of(side)
        .flat_map(|from| legal_moves_from(board, from))
        .collect();
    for kind in HAND_KINDS {
        out.extend(legal_drops(board, side, kind));
    }
    out
}

/// Whether `mv` is among the legal moves for its origin (or its drop kind)
pub fn is_legal_move(board: &Board, mv: &Move) -> bool {
    match mv.from {
        Some(from) => legal_moves_from(board, from).contains(mv),
        None => legal_drops(board, mv.color, mv.kind).contains(mv),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(file: u8, rank: u8) -> Square {
        Square::new(file, rank).unwrap()
    }

    fn board(sfen: &str) -> Board {
        Board::from_sfen(sfen).unwrap()
    }

    #[test]
    fn test_startpos_has_thirty_moves() {
        assert_eq!(all_legal_moves(&Board::startpos()).len(), 30);
    }

    #[test]
    fn test_pinned_gold_cannot_leave_file() {
        // White rook on 5a pins the gold on 5h against the king on 5i
        let b = board("4r4/9/9/9/9/9/9/4G4/4K4 b - 1");
        let moves = legal_moves_from(&b, sq(5, 8));
        assert!(moves.iter().all(|m| m.to.file == 5));
        assert!(moves.iter().any(|m| m.to == sq(5, 7)));

        let sideways = Move::normal(Color::Black, PieceKind::Gold, sq(5, 8), sq(4, 8), false);
        assert!(!is_legal_move(&b, &sideways));
        assert_eq!(pseudo_legal_moves_from(&b, sq(5, 8)).len(), 5);
    }

    #[test]
    fn test_king_may_not_step_into_attack() {
        let b = board("4k4/9/9/9/9/9/9/3r5/4K4 b - 1");
        let moves = legal_moves_from(&b, sq(5, 9));
        assert!(moves.iter().all(|m| m.to.rank != 8 || m.to == sq(6, 8)));
        assert!(!moves.iter().any(|m| m.to == sq(6, 9)));
    }

    #[test]
    fn test_empty_square_and_wrong_side_are_empty() {
        let b = Board::startpos();
        assert!(legal_moves_from(&b, sq(5, 5)).is_empty());
        assert!(legal_moves_from(&b, sq(3, 3)).is_empty());
        assert!(legal_drops(&b, Color::Black, PieceKind::Pawn).is_empty());
        assert!(legal_drops(&b, Color::White, PieceKind::Pawn).is_empty());
    }

    #[test]
    fn test_nifu_is_rejected() {
        let b = board("4k4/9/9/9/9/9/4P4/9/K8 b P 1");
        let drops = legal_drops(&b, Color::Black, PieceKind::Pawn);
        assert!(!drops.iter().any(|m| m.to.file == 5));
        assert!(is_legal_move(&b, &Move::drop(Color::Black, PieceKind::Pawn, sq(4, 5))));
        assert!(!is_legal_move(&b, &Move::drop(Color::Black, PieceKind::Pawn, sq(5, 5))));
    }

    #[test]
    fn test_promoted_pawn_does_not_count_for_nifu() {
        let b = board("4k4/9/9/9/9/9/4+P4/9/K8 b P 1");
        assert!(is_legal_move(&b, &Move::drop(Color::Black, PieceKind::Pawn, sq(5, 5))));
    }

    #[test]
    fn test_dead_end_drops_are_rejected() {
        let b = board("k8/9/9/9/9/9/9/9/8K b PLN 1");
        let no_rank = |kind, rank| {
            legal_drops(&b, Color::Black, kind)
                .iter()
                .all(|m| m.to.rank != rank)
        };
        assert!(no_rank(PieceKind::Pawn, 1));
        assert!(no_rank(PieceKind::Lance, 1));
        assert!(no_rank(PieceKind::Knight, 1));
        assert!(no_rank(PieceKind::Knight, 2));
        assert!(is_legal_move(&b, &Move::drop(Color::Black, PieceKind::Knight, sq(5, 3))));
    }

    #[test]
    fn test_dead_end_ranks_are_mirrored_for_white() {
        let b = board("k8/9/9/9/9/9/9/9/8K w pn 1");
        assert!(!is_legal_move(&b, &Move::drop(Color::White, PieceKind::Pawn, sq(5, 9))));
        assert!(!is_legal_move(&b, &Move::drop(Color::White, PieceKind::Knight, sq(5, 8))));
        assert!(is_legal_move(&b, &Move::drop(Color::White, PieceKind::Knight, sq(5, 7))));
    }

    #[test]
    fn test_pawn_drop_mate_is_rejected() {
        // Gold on 2c and knight on 3c seal every escape of the king on 1a
        let b = board("8k/9/6NG1/9/9/9/9/9/4K4 b GP 1");
        let pawn = Move::drop(Color::Black, PieceKind::Pawn, sq(1, 2));
        assert!(!is_legal_move(&b, &pawn));

        let gold = Move::drop(Color::Black, PieceKind::Gold, sq(1, 2));
        assert!(is_legal_move(&b, &gold));
    }

    #[test]
    fn test_pawn_drop_check_with_escape_is_allowed() {
        let b = board("8k/9/9/9/9/9/9/9/4K4 b P 1");
        let pawn = Move::drop(Color::Black, PieceKind::Pawn, sq(1, 2));
        assert!(is_legal_move(&b, &pawn));
    }

    #[test]
    fn test_pawn_near_promotion() {
        let b = board("8k/9/9/4P4/9/9/9/9/4K4 b - 1");
        let step = Move::normal(Color::Black, PieceKind::Pawn, sq(5, 4), sq(5, 3), false);
        assert!(can_promote(&step));
        assert!(!must_promote(&step));
        assert!(is_legal_move(&b, &step));
        assert!(is_legal_move(&b, &Move { promote: true, ..step }));

        let b = board("8k/4P4/9/9/9/9/9/9/4K4 b - 1");
        let last = Move::normal(Color::Black, PieceKind::Pawn, sq(5, 2), sq(5, 1), false);
        assert!(can_promote(&last));
        assert!(must_promote(&last));
        assert!(!is_legal_move(&b, &last));
        assert!(is_legal_move(&b, &Move { promote: true, ..last }));
    }

    #[test]
    fn test_lance_must_promote_on_last_rank() {
        let b = board("8k/9/4L4/9/9/9/9/9/4K4 b - 1");
        let last = Move::normal(Color::Black, PieceKind::Lance, sq(5, 3), sq(5, 1), false);
        assert!(can_promote(&last));
        assert!(must_promote(&last));
        assert!(!is_legal_move(&b, &last));
        assert!(is_legal_move(&b, &Move { promote: true, ..last }));
        let short = Move::normal(Color::Black, PieceKind::Lance, sq(5, 3), sq(5, 2), false);
        assert!(!must_promote(&short));
        assert!(is_legal_move(&b, &short));

        let b = board("4k4/9/9/9/9/9/4l4/9/K8 w - 1");
        let last = Move::normal(Color::White, PieceKind::Lance, sq(5, 7), sq(5, 9), false);
        assert!(must_promote(&last));
        assert!(!is_legal_move(&b, &last));
        assert!(is_legal_move(&b, &Move { promote: true, ..last }));
        let moves = legal_moves_from(&b, sq(5, 7));
        assert!(moves.iter().filter(|m| m.to == sq(5, 9)).all(|m| m.promote));
    }

    #[test]
    fn test_knight_must_promote_on_last_two_ranks() {
        let b = board("8k/9/9/9/9/9/4N4/9/4K4 b - 1");
        let moves = legal_moves_from(&b, sq(5, 7));
        assert_eq!(moves.len(), 2);
        assert!(moves.iter().all(|m| !m.promote));

        let deep = Move::normal(Color::Black, PieceKind::Knight, sq(4, 4), sq(3, 2), false);
        assert!(must_promote(&deep));
        let lance = Move::normal(Color::Black, PieceKind::Lance, sq(4, 4), sq(4, 2), false);
        assert!(!must_promote(&lance));
    }

    #[test]
    fn test_can_promote_rules() {
        let out_of_zone = Move::normal(Color::Black, PieceKind::Rook, sq(2, 8), sq(2, 5), false);
        assert!(!can_promote(&out_of_zone));
        let leaving_zone = Move::normal(Color::Black, PieceKind::Silver, sq(4, 3), sq(4, 4), false);
        assert!(can_promote(&leaving_zone));
        let gold = Move::normal(Color::Black, PieceKind::Gold, sq(4, 4), sq(4, 3), false);
        assert!(!can_promote(&gold));
        let already = Move::normal(Color::Black, PieceKind::Horse, sq(4, 4), sq(3, 3), false);
        assert!(!can_promote(&already));
        let drop = Move::drop(Color::Black, PieceKind::Pawn, sq(4, 3));
        assert!(!can_promote(&drop));
        let white = Move::normal(Color::White, PieceKind::Pawn, sq(5, 6), sq(5, 7), false);
        assert!(can_promote(&white));
    }
}
