//! Tree-preserving JSON record.
//!
//! The layout mirrors the move tree: a list of nodes for the main line, each
//! node carrying the alternatives to it as nested node lists. Entry 0 is the
//! root and only ever carries comments.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::board::{Board, STARTPOS_SFEN};
use crate::domain::move_tree::{MAIN_SEQUENCE, MoveTree, NodeId, ROOT_NODE, SequenceId};
use crate::domain::shogi::{Move, Play, Terminal};
use crate::error::{KifuError, KifuResult};

/// A whole kifu
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KifuRecord {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, String>,
    /// Initial position as SFEN
    #[serde(default = "startpos")]
    pub initial: String,
    pub moves: Vec<RecordNode>,
}

fn startpos() -> String {
    STARTPOS_SFEN.to_string()
}

/// One ply and the alternatives to it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecordNode {
    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    pub mv: Option<Move>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<Terminal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forks: Vec<Vec<RecordNode>>,
}

impl RecordNode {
    fn play(&self) -> KifuResult<Play> {
        match (self.mv, self.special) {
            (Some(mv), None) => Ok(Play::Move(mv)),
            (None, Some(terminal)) => Ok(Play::Terminal(terminal)),
            _ => Err(KifuError::format(
                0,
                "a record node must hold exactly one of move or special",
            )),
        }
    }
}

impl KifuRecord {
    pub fn from_tree(tree: &MoveTree) -> Self {
        Self {
            header: tree.header().clone(),
            initial: tree.initial().to_sfen(1),
            moves: export_sequence(tree, MAIN_SEQUENCE),
        }
    }

    pub fn to_tree(&self) -> KifuResult<MoveTree> {
        let initial = Board::from_sfen(&self.initial)
            .map_err(|e| KifuError::format(0, format!("initial position: {e}")))?;
        let mut tree = MoveTree::with_initial(initial);
        for (key, value) in &self.header {
            tree.set_header(key.clone(), value.clone());
        }
        let Some((root, rest)) = self.moves.split_first() else {
            return Ok(tree);
        };
        if root.mv.is_some() || root.special.is_some() || !root.forks.is_empty() {
            return Err(KifuError::format(0, "the first node must be an empty root"));
        }
        for comment in &root.comments {
            tree.add_comment(ROOT_NODE, comment.clone());
        }
        extend(&mut tree, MAIN_SEQUENCE, rest)?;
        Ok(tree)
    }
}

fn export_sequence(tree: &MoveTree, sequence: SequenceId) -> Vec<RecordNode> {
    let Some(seq) = tree.sequence(sequence) else {
        return Vec::new();
    };
    seq.nodes
        .iter()
        .filter_map(|&id| tree.get(id))
        .map(|node| RecordNode {
            mv: node.play.and_then(|p| p.as_move().copied()),
            special: match node.play {
                Some(Play::Terminal(t)) => Some(t),
                _ => None,
            },
            comments: node.comments.clone(),
            forks: node
                .forks
                .iter()
                .map(|&f| export_sequence(tree, f))
                .collect(),
        })
        .collect()
}

fn extend(tree: &mut MoveTree, sequence: SequenceId, nodes: &[RecordNode]) -> KifuResult<()> {
    for node in nodes {
        let id = tree.append(sequence, node.play()?);
        attach(tree, id, node)?;
    }
    Ok(())
}

fn attach(tree: &mut MoveTree, id: NodeId, node: &RecordNode) -> KifuResult<()> {
    for comment in &node.comments {
        tree.add_comment(id, comment.clone());
    }
    for fork in &node.forks {
        let Some((first, rest)) = fork.split_first() else {
            continue;
        };
        let (sequence, _) = tree.add_fork(id, first.play()?)?;
        let first_id = tree
            .sequence(sequence)
            .and_then(|s| s.first())
            .ok_or_else(|| KifuError::format(0, "empty fork"))?;
        attach(tree, first_id, first)?;
        extend(tree, sequence, rest)?;
    }
    Ok(())
}

/// Serialize a tree as pretty-printed JSON
pub fn to_json(tree: &MoveTree) -> KifuResult<String> {
    Ok(serde_json::to_string_pretty(&KifuRecord::from_tree(tree))?)
}

/// Parse a JSON record into a tree
/// Parse a JSON record into a tree.
///
/// Well-formed JSON that does not describe a record, such as a square off the
/// board, is a format error at the offending line.
pub fn from_json(text: &str) -> KifuResult<MoveTree> {
    let record: KifuRecord = serde_json::from_str(text).map_err(|e| {
        if e.is_data() {
            KifuError::format(e.line(), e.to_string())
        } else {
            KifuError::Json(e)
        }
    })?;
    record.to_tree()
}

/// JSON schema of the record format
pub fn schema() -> schemars::Schema {
    schemars::schema_for!(KifuRecord)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::move_tree::tests::sample_tree;

    fn annotated_tree() -> MoveTree {
        let mut tree = sample_tree();
        tree.set_header("先手", "Sente");
        tree.add_comment(ROOT_NODE, "opening study");
        let ply2 = tree.main_node_at(2).unwrap();
        tree.add_comment(ply2, "main reply");
        tree.append(MAIN_SEQUENCE, Play::Terminal(Terminal::Resign));
        tree
    }

    #[test]
    fn test_json_round_trip_keeps_tree() {
        let tree = annotated_tree();
        let text = to_json(&tree).unwrap();
        let parsed = from_json(&text).unwrap();
        assert_eq!(KifuRecord::from_tree(&parsed), KifuRecord::from_tree(&tree));
        assert_eq!(parsed.lines(), tree.lines());
        assert_eq!(parsed.header().get("先手").map(String::as_str), Some("Sente"));
        assert_eq!(parsed.root().comments, vec!["opening study".to_string()]);
    }

    #[test]
    fn test_record_shape() {
        let record = KifuRecord::from_tree(&sample_tree());
        assert_eq!(record.moves.len(), 4);
        assert!(record.moves[0].mv.is_none());
        assert_eq!(record.moves[1].forks.len(), 1);
        assert_eq!(record.moves[2].forks[0].len(), 2);
        assert_eq!(record.moves[2].forks[0][1].forks.len(), 1);
    }

    #[test]
    fn test_node_with_move_and_special_is_rejected() {
        let mut record = KifuRecord::from_tree(&sample_tree());
        record.moves[1].special = Some(Terminal::Resign);
        assert!(matches!(record.to_tree(), Err(KifuError::Format { .. })));
    }

    #[test]
    fn test_missing_initial_defaults_to_startpos() {
        let tree = from_json(r#"{"moves": []}"#).unwrap();
        assert_eq!(tree.initial(), &Board::startpos());
        assert!(tree.is_empty());
    }

    fn sample_value() -> serde_json::Value {
        serde_json::from_str(&to_json(&sample_tree()).unwrap()).unwrap()
    }

    #[test]
    fn test_off_board_square_is_a_format_error() {
        for rank in [0, 10] {
            let mut value = sample_value();
            value["moves"][1]["move"]["to"]["rank"] = rank.into();
            let text = serde_json::to_string_pretty(&value).unwrap();
            assert!(matches!(from_json(&text), Err(KifuError::Format { .. })));
        }
    }

    #[test]
    fn test_oversized_hand_is_a_format_error() {
        let mut value = sample_value();
        value["initial"] = "4k4/9/9/9/9/9/9/9/4K4 b 99999999999P 1".into();
        let text = serde_json::to_string(&value).unwrap();
        assert!(matches!(from_json(&text), Err(KifuError::Format { .. })));
    }

    #[test]
    fn test_promoted_drop_fails_on_replay() {
        use crate::domain::cursor::Cursor;
        use crate::domain::replay::{TreeReplayer, seek};

        let text = r#"{
            "initial": "4k4/9/9/9/9/9/9/9/4K4 b P 1",
            "moves": [{}, {"move": {"color": "black", "kind": "pawn", "to": {"file": 5, "rank": 5}, "promote": true}}]
        }"#;
        let tree = from_json(text).unwrap();
        let err = seek(&mut TreeReplayer::new(), &tree, &Cursor::new(1, [])).unwrap_err();
        assert!(matches!(err, KifuError::EngineSeekFailure { ply: 1, .. }));
    }

    #[test]
    fn test_bad_json_is_reported() {
        assert!(matches!(from_json("{"), Err(KifuError::Json(_))));
    }

    #[test]
    fn test_schema_names_record_fields() {
        let text = serde_json::to_string(&schema()).unwrap();
        assert!(text.contains("forks"));
        assert!(text.contains("initial"));
    }
}
