//! Serialized kifu formats.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::move_tree::MoveTree;
use crate::domain::{kif, record};
use crate::error::KifuResult;

/// Format tag carried alongside a file; never guessed from content
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KifuFormat {
    #[default]
    Kif,
    Json,
}

impl KifuFormat {
    pub fn extension(self) -> &'static str {
        match self {
            KifuFormat::Kif => "kif",
            KifuFormat::Json => "json",
        }
    }

    /// Format implied by a file extension, for callers that pick one by name
    pub fn from_path(path: &Path) -> Option<KifuFormat> {
        let ext = path.extension()?.to_str()?;
        ext.to_ascii_lowercase().parse().ok()
    }

    pub fn serialize(self, tree: &MoveTree) -> KifuResult<String> {
        match self {
            KifuFormat::Kif => Ok(kif::write(tree)),
            KifuFormat::Json => record::to_json(tree),
        }
    }

    pub fn parse(self, text: &str) -> KifuResult<MoveTree> {
        match self {
            KifuFormat::Kif => kif::parse(text),
            KifuFormat::Json => record::from_json(text),
        }
    }
}

impl fmt::Display for KifuFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for KifuFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kif" | "kifu" => Ok(KifuFormat::Kif),
            "json" => Ok(KifuFormat::Json),
            other => Err(format!("unknown kifu format {other:?}")),
        }
    }
}
