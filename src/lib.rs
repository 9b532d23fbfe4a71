//! Shogi kifu move trees: branch-aware navigation, editing, a legal-move
//! validator and KIF/JSON persistence.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod models;
pub mod ui;

pub use config::Config;
pub use error::{KifuError, KifuResult};
pub use models::KifuSession;
