//! Command-line front end.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::domain::{Cursor, ForkPointer, KifuFormat, MoveTree, TreeReplayer, kif, record, rules};
use crate::models::preview::branch_options;
use crate::models::{FsStore, KifuSession, SaveTarget};
use crate::ui::display;

#[derive(Parser, Debug)]
#[command(author, version, about = "Shogi kifu move-tree tool")]
pub struct Cli {
    /// Configuration file (defaults to ./kifu-tree.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Position on a line: `--path 2:0,5:1` enters fork 0 at ply 2, then fork 1 at ply 5
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PositionArgs {
    /// Ply to stop at (defaults to the end of the line)
    #[arg(long)]
    pub ply: Option<u32>,
    /// Fork choices as `ply:index` pairs
    #[arg(long)]
    pub path: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the move list and board of a position
    Show {
        file: PathBuf,
        #[command(flatten)]
        position: PositionArgs,
    },
    /// Rewrite a kifu in the format implied by the output file name
    Convert { input: PathBuf, output: PathBuf },
    /// List the legal moves of a position
    Legal {
        file: PathBuf,
        #[command(flatten)]
        position: PositionArgs,
    },
    /// Print the JSON schema of the JSON kifu format
    Schema,
}

/// Parse `ply:index` pairs separated by commas
pub fn parse_pointers(text: &str) -> Result<Vec<ForkPointer>> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| -> Result<ForkPointer> {
            let (ply, index) = part
                .split_once(':')
                .with_context(|| format!("expected ply:index, got {part:?}"))?;
            let ply: u32 = ply.parse().with_context(|| format!("bad ply in {part:?}"))?;
            let index: usize = index
                .parse()
                .with_context(|| format!("bad fork index in {part:?}"))?;
            if ply == 0 {
                bail!("forks start at ply 1, got {part:?}");
            }
            Ok(ForkPointer::new(ply, index))
        })
        .collect()
}

fn format_for(path: &Path, config: &Config) -> KifuFormat {
    KifuFormat::from_path(path).unwrap_or(config.default_format)
}

fn load_tree(path: &Path, config: &Config) -> Result<MoveTree> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    format_for(path, config)
        .parse(&text)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn open_at(tree: MoveTree, position: &PositionArgs, config: &Config) -> Result<KifuSession> {
    let pointers = match &position.path {
        Some(text) => parse_pointers(text)?,
        None => Vec::new(),
    };
    let mut session = KifuSession::with_engine(tree, TreeReplayer::new(), config);
    match position.ply {
        Some(ply) => session
            .go_to(&Cursor::new(ply, pointers))
            .with_context(|| format!("cannot reach ply {ply}"))?,
        None => {
            session.go_to(&Cursor::new(0, pointers))?;
            session.go_to_end()?;
        }
    }
    Ok(session)
}

fn show(session: &KifuSession) -> Result<String> {
    let (tree, cursor) = (session.tree(), session.cursor());
    let moves = display::active_line_display(tree, cursor)?;
    let mut out = display::move_list_text(&moves);

    let previous = session
        .view()
        .last_move
        .and_then(|p| p.as_move().map(|m| m.to));
    let options = branch_options(tree, cursor)?;
    let planned = cursor.pointer_at(cursor.move_number + 1);
    let selected = options.iter().position(|o| o.fork_index == planned);
    let options = display::options_display(&options, previous, selected);
    let next = tree
        .walk(&cursor.fork_pointers, cursor.move_number)?
        .last()
        .and_then(|step| tree.next_after(step));
    let variations = next
        .map(|node| display::variations_at(tree, node))
        .unwrap_or_default();
    out.push_str(&display::branches_text(&options, &variations));

    out.push('\n');
    out.push_str(&display::position_display(session.view()));
    Ok(out)
}

fn legal(session: &KifuSession) -> String {
    let previous = session
        .view()
        .last_move
        .and_then(|p| p.as_move().map(|m| m.to));
    let moves = rules::all_legal_moves(session.board());
    let mut out = String::new();
    for mv in &moves {
        let _ = writeln!(out, "{}", kif::move_notation(mv, previous));
    }
    let _ = writeln!(out, "{} legal moves", moves.len());
    out
}

async fn convert(input: &Path, output: &Path, config: &Config) -> Result<String> {
    let tree = load_tree(input, config)?;
    let format = format_for(output, config);
    let mut session = KifuSession::with_engine(tree, TreeReplayer::new(), config);
    session.set_target(Some(SaveTarget::new(output, format)));
    session.start_persistence(Arc::new(FsStore));
    session.save()?;
    if let Some(err) = session.flush().await {
        return Err(err).with_context(|| format!("failed to write {}", output.display()));
    }
    info!(input = %input.display(), output = %output.display(), %format, "converted");
    Ok(format!("wrote {} ({format})\n", output.display()))
}

/// Run one command and return what it prints
pub async fn run(command: Command, config: &Config) -> Result<String> {
    match command {
        Command::Show { file, position } => {
            let session = open_at(load_tree(&file, config)?, &position, config)?;
            show(&session)
        }
        Command::Legal { file, position } => {
            let session = open_at(load_tree(&file, config)?, &position, config)?;
            Ok(legal(&session))
        }
        Command::Convert { input, output } => convert(&input, &output, config).await,
        Command::Schema => {
            let schema = serde_json::to_string_pretty(&record::schema())?;
            Ok(schema + "\n")
        }
    }
}
