//! KIF text notation.
//!
//! Supports the subset that carries a full move tree: `key：value` header
//! lines, the move banner, numbered move lines, `*` comments, terminal words
//! and `変化：N手` variation sections. Consumption-time fields are read past
//! and not written.
//!
//! Variations are written deepest ply first, each followed by its own nested
//! variations, so a reader can always attach a section to the most recently
//! opened line that reaches its ply.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::domain::board::{Board, STARTPOS_SFEN};
use crate::domain::move_tree::{MAIN_SEQUENCE, MoveTree, NodeId, ROOT_NODE, SequenceId};
use crate::domain::rules;
use crate::domain::shogi::{Color, Move, PieceKind, Play, Square, Terminal};
use crate::error::{KifuError, KifuResult};

const BANNER: &str = "手数----指手---------消費時間--";
const INITIAL_POSITION: &str = "#初期局面：";
const VARIATION_PREFIX: &str = "変化：";

/// Two-character names come first so prefix matching picks them over `成`
const PIECE_NAMES: &[(&str, PieceKind)] = &[
    ("成香", PieceKind::ProLance),
    ("成桂", PieceKind::ProKnight),
    ("成銀", PieceKind::ProSilver),
    ("歩", PieceKind::Pawn),
    ("香", PieceKind::Lance),
    ("桂", PieceKind::Knight),
    ("銀", PieceKind::Silver),
    ("金", PieceKind::Gold),
    ("角", PieceKind::Bishop),
    ("飛", PieceKind::Rook),
    ("玉", PieceKind::King),
    ("王", PieceKind::King),
    ("と", PieceKind::ProPawn),
    ("杏", PieceKind::ProLance),
    ("圭", PieceKind::ProKnight),
    ("全", PieceKind::ProSilver),
    ("馬", PieceKind::Horse),
    ("龍", PieceKind::Dragon),
    ("竜", PieceKind::Dragon),
];

const RANKS: [char; 9] = ['一', '二', '三', '四', '五', '六', '七', '八', '九'];

fn piece_name(kind: PieceKind) -> &'static str {
    match kind {
        PieceKind::Pawn => "歩",
        PieceKind::Lance => "香",
        PieceKind::Knight => "桂",
        PieceKind::Silver => "銀",
        PieceKind::Gold => "金",
        PieceKind::Bishop => "角",
        PieceKind::Rook => "飛",
        PieceKind::King => "玉",
        PieceKind::ProPawn => "と",
        PieceKind::ProLance => "成香",
        PieceKind::ProKnight => "成桂",
        PieceKind::ProSilver => "成銀",
        PieceKind::Horse => "馬",
        PieceKind::Dragon => "龍",
    }
}

fn file_char(file: u8) -> char {
    char::from_u32(0xFF10 + file as u32).unwrap_or('?')
}

fn file_digit(c: char) -> Option<u8> {
    match c {
        '１'..='９' => Some((c as u32 - 0xFF10) as u8),
        '1'..='9' => c.to_digit(10).map(|d| d as u8),
        _ => None,
    }
}

fn rank_kanji(c: char) -> Option<u8> {
    RANKS.iter().position(|&r| r == c).map(|i| i as u8 + 1)
}

/// KIF notation of one move, e.g. `７六歩(77)`, `同　銀(31)` or `４五角打`
pub fn move_notation(mv: &Move, previous: Option<Square>) -> String {
    let mut out = String::new();
    if previous == Some(mv.to) {
        out.push_str("同\u{3000}");
    } else {
        out.push(file_char(mv.to.file));
        out.push(RANKS[(mv.to.rank - 1) as usize]);
    }
    out.push_str(piece_name(mv.kind));
    match mv.from {
        None => out.push('打'),
        Some(from) => {
            if mv.promote {
                out.push('成');
            } else if rules::can_promote(mv) {
                out.push_str("不成");
            }
            let _ = write!(out, "({}{})", from.file, from.rank);
        }
    }
    out
}

/// KIF notation of a move or terminal word
pub fn play_notation(play: &Play, previous: Option<Square>) -> String {
    match play {
        Play::Move(mv) => move_notation(mv, previous),
        Play::Terminal(t) => t.label().to_string(),
    }
}

/// Destination of the ply before `ply` on the path that runs through `sequence`
pub fn destination_before(tree: &MoveTree, sequence: SequenceId, ply: u32) -> Option<Square> {
    let previous = ply.checked_sub(1)?;
    let seq = tree.sequence(sequence)?;
    match seq.node_at(previous) {
        Some(id) => tree.get(id)?.play?.as_move().map(|m| m.to),
        None => {
            let owner = seq.owner?;
            destination_before(tree, tree.get(owner)?.sequence(), ply)
        }
    }
}

/// Render a tree as KIF
pub fn write(tree: &MoveTree) -> String {
    let mut out = String::from("#KIF version=2.0 encoding=UTF-8\n");
    for (key, value) in tree.header() {
        let _ = writeln!(out, "{key}：{value}");
    }
    if tree.initial().to_sfen(1) != STARTPOS_SFEN {
        let _ = writeln!(out, "{INITIAL_POSITION}{}", tree.initial().to_sfen(1));
    }
    out.push_str(BANNER);
    out.push('\n');
    for comment in &tree.root().comments {
        let _ = writeln!(out, "*{comment}");
    }
    write_moves(tree, MAIN_SEQUENCE, &mut out);
    write_variations(tree, MAIN_SEQUENCE, &mut out);
    out
}

fn write_moves(tree: &MoveTree, sequence: SequenceId, out: &mut String) {
    let Some(seq) = tree.sequence(sequence) else {
        return;
    };
    let mut previous = destination_before(tree, sequence, seq.start_ply);
    for (offset, &id) in seq.nodes.iter().enumerate() {
        let Some(node) = tree.get(id) else { continue };
        let Some(play) = node.play else { continue };
        let ply = seq.start_ply + offset as u32;
        let marker = if node.has_forks() { "+" } else { "" };
        let _ = writeln!(out, "{ply:>4} {}{marker}", play_notation(&play, previous));
        for comment in &node.comments {
            let _ = writeln!(out, "*{comment}");
        }
        previous = play.as_move().map(|m| m.to);
    }
}

fn write_variations(tree: &MoveTree, sequence: SequenceId, out: &mut String) {
    let Some(seq) = tree.sequence(sequence) else {
        return;
    };
    for (offset, &id) in seq.nodes.iter().enumerate().rev() {
        let Some(node) = tree.get(id) else { continue };
        let ply = seq.start_ply + offset as u32;
        for &fork in &node.forks {
            let _ = writeln!(out, "\n{VARIATION_PREFIX}{ply}手");
            write_moves(tree, fork, out);
            write_variations(tree, fork, out);
        }
    }
}

struct Parser {
    tree: MoveTree,
    /// Lines opened so far; the top one receives move lines
    stack: Vec<SequenceId>,
    /// Holder and ply of a variation header still waiting for its first move
    pending: Option<(NodeId, u32)>,
    last: NodeId,
}

impl Parser {
    fn top(&self) -> SequenceId {
        self.stack.last().copied().unwrap_or(MAIN_SEQUENCE)
    }

    fn color_at(&self, ply: u32) -> Color {
        let first = self.tree.initial().side_to_move();
        if ply % 2 == 1 { first } else { first.opponent() }
    }

    fn open_variation(&mut self, line: usize, ply: u32) -> KifuResult<()> {
        loop {
            let top = self.top();
            let seq = self
                .tree
                .sequence(top)
                .ok_or_else(|| KifuError::format(line, "lost track of the current line"))?;
            if seq.contains(ply) {
                let owner = seq
                    .node_at(ply)
                    .ok_or_else(|| KifuError::format(line, "lost track of the current line"))?;
                if ply == 0 {
                    return Err(KifuError::format(line, "a variation cannot start at ply 0"));
                }
                self.pending = Some((owner, ply));
                return Ok(());
            }
            if self.stack.len() <= 1 {
                return Err(KifuError::format(
                    line,
                    format!("no line reaches ply {ply} for this variation"),
                ));
            }
            self.stack.pop();
        }
    }

    fn push_play(&mut self, line: usize, ply: u32, play: Play) -> KifuResult<()> {
        if let Some((owner, expected)) = self.pending.take() {
            if ply != expected {
                return Err(KifuError::format(
                    line,
                    format!("variation announced at ply {expected} starts at ply {ply}"),
                ));
            }
            let (sequence, _) = self.tree.add_fork(owner, play)?;
            self.stack.push(sequence);
            self.last = self
                .tree
                .sequence(sequence)
                .and_then(|s| s.first())
                .unwrap_or(ROOT_NODE);
            return Ok(());
        }
        let top = self.top();
        let expected = self.tree.sequence(top).map(|s| s.last_ply() + 1).unwrap_or(1);
        if ply != expected {
            return Err(KifuError::format(
                line,
                format!("expected ply {expected}, found {ply}"),
            ));
        }
        self.last = self.tree.append(top, play);
        Ok(())
    }

    fn previous_destination(&self, ply: u32) -> Option<Square> {
        match self.pending {
            Some((owner, _)) => {
                let sequence = self.tree.get(owner)?.sequence();
                destination_before(&self.tree, sequence, ply)
            }
            None => destination_before(&self.tree, self.top(), ply),
        }
    }

    fn move_line(&mut self, line: usize, text: &str) -> KifuResult<()> {
        let (number, rest) = text
            .split_once(|c: char| c.is_ascii_whitespace())
            .unwrap_or((text, ""));
        let ply: u32 = number
            .parse()
            .map_err(|_| KifuError::format(line, format!("bad ply number {number:?}")))?;
        let token = rest
            .split(|c: char| c.is_ascii_whitespace())
            .find(|s| !s.is_empty())
            .unwrap_or("");
        let token = token.strip_suffix('+').unwrap_or(token);

        let play = match Terminal::from_label(token) {
            Some(terminal) => Play::Terminal(terminal),
            None => {
                let color = self.color_at(ply);
                let previous = self.previous_destination(ply);
                let mv = parse_move(token, color, previous)
                    .map_err(|msg| KifuError::format(line, format!("{msg} in {token:?}")))?;
                Play::Move(mv)
            }
        };
        self.push_play(line, ply, play)
    }
}

fn parse_move(token: &str, color: Color, previous: Option<Square>) -> Result<Move, &'static str> {
    let mut rest = token;
    let to = if let Some(after) = rest.strip_prefix('同') {
        rest = after.trim_start_matches(['\u{3000}', ' ']);
        previous.ok_or("同 without a previous move")?
    } else {
        let mut chars = rest.chars();
        let file = chars.next().and_then(file_digit).ok_or("bad file")?;
        let rank = chars.next().and_then(rank_kanji).ok_or("bad rank")?;
        rest = chars.as_str();
        Square::new(file, rank).ok_or("bad square")?
    };

    let (kind, after) = PIECE_NAMES
        .iter()
        .find_map(|(name, kind)| rest.strip_prefix(name).map(|r| (*kind, r)))
        .ok_or("unknown piece")?;
    rest = after;

    let mut promote = false;
    if let Some(after) = rest.strip_prefix("不成") {
        rest = after;
    } else if let Some(after) = rest.strip_prefix('成') {
        promote = true;
        rest = after;
    }

    if let Some(after) = rest.strip_prefix('打') {
        if !after.is_empty() || promote {
            return Err("malformed drop");
        }
        return Ok(Move::drop(color, kind, to));
    }

    let origin = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or("missing origin square")?;
    let digits: Vec<u8> = origin
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| d as u8)
        .collect();
    let [file, rank] = digits.as_slice() else {
        return Err("bad origin square");
    };
    let from = Square::new(*file, *rank).ok_or("bad origin square")?;
    Ok(Move::normal(color, kind, from, to, promote))
}

/// Parse KIF text into a tree
pub fn parse(text: &str) -> KifuResult<MoveTree> {
    let mut header = BTreeMap::new();
    let mut initial = Board::startpos();
    let mut body = Vec::new();
    let mut in_moves = false;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim_end_matches('\r');
        if in_moves {
            body.push((line, trimmed));
            continue;
        }
        if let Some(sfen) = trimmed.strip_prefix(INITIAL_POSITION) {
            initial = Board::from_sfen(sfen.trim())
                .map_err(|e| KifuError::format(line, e.to_string()))?;
        } else if trimmed.starts_with("手数") {
            in_moves = true;
        } else if trimmed.trim_start().starts_with(|c: char| c.is_ascii_digit()) {
            in_moves = true;
            body.push((line, trimmed));
        } else if trimmed.starts_with('#') {
            continue;
        } else if let Some((key, value)) = trimmed.split_once('：') {
            header.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    let mut tree = MoveTree::with_initial(initial);
    for (key, value) in header {
        tree.set_header(key, value);
    }
    let mut parser = Parser {
        tree,
        stack: vec![MAIN_SEQUENCE],
        pending: None,
        last: ROOT_NODE,
    };

    for (line, raw) in body {
        let text = raw.trim();
        if text.is_empty() || text.starts_with("まで") || text.starts_with('#') {
            continue;
        }
        if let Some(comment) = raw.trim_start().strip_prefix('*') {
            parser.tree.add_comment(parser.last, comment);
        } else if let Some(rest) = text.strip_prefix(VARIATION_PREFIX) {
            let number = rest.trim_end_matches('手').trim();
            let ply = number
                .parse()
                .map_err(|_| KifuError::format(line, format!("bad variation ply {number:?}")))?;
            parser.open_variation(line, ply)?;
        } else if text.starts_with(|c: char| c.is_ascii_digit()) {
            parser.move_line(line, text)?;
        } else if text.starts_with("手数") {
            continue;
        } else {
            return Err(KifuError::format(line, format!("unexpected line {text:?}")));
        }
    }
    Ok(parser.tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::move_tree::tests::sample_tree;
    use crate::domain::record::KifuRecord;

    fn sq(file: u8, rank: u8) -> Square {
        Square::new(file, rank).unwrap()
    }

    fn capture_tree() -> MoveTree {
        MoveTree::from_main_line(
            Board::startpos(),
            [
                Play::Move(Move::normal(Color::Black, PieceKind::Pawn, sq(7, 7), sq(7, 6), false)),
                Play::Move(Move::normal(Color::White, PieceKind::Pawn, sq(3, 3), sq(3, 4), false)),
                Play::Move(Move::normal(Color::Black, PieceKind::Bishop, sq(8, 8), sq(2, 2), true)),
                Play::Move(Move::normal(Color::White, PieceKind::Silver, sq(3, 1), sq(2, 2), false)),
                Play::Move(Move::drop(Color::Black, PieceKind::Bishop, sq(4, 5))),
                Play::Terminal(Terminal::Resign),
            ],
        )
    }

    #[test]
    fn test_write_notation() {
        let text = write(&capture_tree());
        assert!(text.contains(BANNER));
        assert!(text.contains("   1 ７六歩(77)"));
        assert!(text.contains("   3 ２二角成(88)"));
        assert!(text.contains("   4 同\u{3000}銀(31)"));
        assert!(text.contains("   5 ４五角打"));
        assert!(text.contains("   6 投了"));
        assert!(!text.contains(INITIAL_POSITION));
    }

    #[test]
    fn test_declined_promotion_is_marked() {
        let mv = Move::normal(Color::Black, PieceKind::Silver, sq(4, 4), sq(4, 3), false);
        assert_eq!(move_notation(&mv, None), "４三銀不成(44)");
        let parsed = parse_move("４三銀不成(44)", Color::Black, None).unwrap();
        assert_eq!(parsed, mv);
    }

    #[test]
    fn test_round_trip_main_line() {
        let tree = capture_tree();
        let parsed = parse(&write(&tree)).unwrap();
        assert_eq!(KifuRecord::from_tree(&parsed), KifuRecord::from_tree(&tree));
    }

    #[test]
    fn test_round_trip_nested_variations() {
        let mut tree = sample_tree();
        let ply2 = tree.main_node_at(2).unwrap();
        tree.add_fork(
            ply2,
            Play::Move(Move::normal(Color::White, PieceKind::Pawn, sq(1, 3), sq(1, 4), false)),
        )
        .unwrap();
        tree.set_header("先手", "Alice");
        tree.add_comment(ROOT_NODE, "start");
        tree.add_comment(ply2, "main reply");

        let text = write(&tree);
        let parsed = parse(&text).unwrap();
        assert_eq!(KifuRecord::from_tree(&parsed), KifuRecord::from_tree(&tree));
        assert_eq!(parsed.lines(), tree.lines());
    }

    #[test]
    fn test_variations_written_deepest_first() {
        let text = write(&sample_tree());
        let at3 = text.find("変化：3手").unwrap();
        let at2 = text.find("変化：2手").unwrap();
        let at1 = text.find("変化：1手").unwrap();
        assert!(at2 < at3 && at3 < at1);
    }

    #[test]
    fn test_parse_hand_written_kif() {
        let text = "\
# ---- generated ----
開始日時：2024/01/01
先手：A
後手：B
手合割：平手
手数----指手---------消費時間--
*対局前
   1 ７六歩(77)   ( 0:01/00:00:01)
   2 ３四歩(33)   ( 0:01/00:00:02)+
*本線
   3 ２六歩(27)   ( 0:01/00:00:03)
   4 投了
まで3手で先手の勝ち

変化：2手
   2 ８四歩(83)   ( 0:01/00:00:02)
   3 ６八銀(79)   ( 0:01/00:00:03)
";
        let tree = parse(text).unwrap();
        assert_eq!(tree.header().len(), 4);
        assert_eq!(tree.header().get("先手").map(String::as_str), Some("A"));
        assert_eq!(tree.root().comments, vec!["対局前".to_string()]);
        assert_eq!(tree.main_line().len(), 5);
        let ply2 = tree.main_node_at(2).unwrap();
        assert_eq!(tree.get(ply2).unwrap().comments, vec!["本線".to_string()]);
        assert_eq!(tree.get(ply2).unwrap().forks.len(), 1);
        assert_eq!(tree.lines().len(), 2);
        let fork_line = &tree.lines()[0];
        assert_eq!(
            fork_line[2],
            Play::Move(Move::normal(Color::Black, PieceKind::Silver, sq(7, 9), sq(6, 8), false))
        );
    }

    #[test]
    fn test_non_standard_initial_position() {
        let initial = Board::from_sfen("4k4/9/9/9/9/9/9/9/4K4 w G 1").unwrap();
        let mut tree = MoveTree::with_initial(initial.clone());
        tree.append(
            MAIN_SEQUENCE,
            Play::Move(Move::normal(Color::White, PieceKind::King, sq(5, 1), sq(5, 2), false)),
        );
        let text = write(&tree);
        assert!(text.contains(INITIAL_POSITION));
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.initial(), &initial);
        assert_eq!(parsed.lines(), tree.lines());
    }

    #[test]
    fn test_oversized_initial_hand_is_a_format_error() {
        let text = "#初期局面：4k4/9/9/9/9/9/9/9/4K4 b 99999999999P 1\n手数----指手--\n";
        assert!(matches!(parse(text), Err(KifuError::Format { line: 1, .. })));
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let text = "手数----指手--\n   1 ７六歩(77)\n   3 ２六歩(27)\n";
        assert!(matches!(parse(text), Err(KifuError::Format { line: 3, .. })));
        let text = "手数----指手--\n   1 ７六蛇(77)\n";
        assert!(matches!(parse(text), Err(KifuError::Format { line: 2, .. })));
        let text = "手数----指手--\n   1 ７六歩(77)\n変化：5手\n   5 ２六歩(27)\n";
        assert!(matches!(parse(text), Err(KifuError::Format { line: 3, .. })));
    }
}
