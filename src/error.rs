//! Error types for the kifu engine.
//!
//! Every fallible operation in the domain and model layers reports one of
//! these. A failed operation never replaces the committed `(tree, cursor)`
//! pair, so callers can surface the error and keep going.

/// Errors that can occur while navigating, editing or storing a kifu
#[derive(Debug, thiserror::Error)]
pub enum KifuError {
    /// The cursor's path no longer resolves against the tree
    #[error("cursor does not resolve at ply {ply}: {reason}")]
    InvalidCursor { ply: u32, reason: String },

    /// The validator rejected a move before any tree mutation
    #[error("illegal move: {message}")]
    IllegalMove { message: String },

    /// A mutation named a fork that does not exist
    #[error("no fork {fork_index} at ply {ply}")]
    BranchNotFound { ply: u32, fork_index: usize },

    /// A branch operation targeted the line that has no owning fork
    #[error("the main line has no owning fork")]
    BranchIsMainLine,

    /// Writing the serialized kifu failed; in-memory state is already committed
    #[error("failed to save kifu: {message}")]
    PersistenceFailure { message: String },

    /// The replay engine could not reproduce a recorded position
    #[error("replay stopped at ply {ply}: {message}")]
    EngineSeekFailure { ply: u32, message: String },

    /// A serialized kifu could not be parsed
    #[error("malformed kifu at line {line}: {message}")]
    Format { line: usize, message: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl KifuError {
    pub(crate) fn invalid_cursor(ply: u32, reason: impl Into<String>) -> Self {
        KifuError::InvalidCursor {
            ply,
            reason: reason.into(),
        }
    }

    pub(crate) fn illegal(message: impl Into<String>) -> Self {
        KifuError::IllegalMove {
            message: message.into(),
        }
    }

    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        KifuError::Format {
            line,
            message: message.into(),
        }
    }

    /// Whether the committed state survives this error unchanged and the
    /// caller may simply retry or re-resolve
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, KifuError::EngineSeekFailure { .. })
    }
}

/// Result type alias for kifu operations
pub type KifuResult<T> = Result<T, KifuError>;
