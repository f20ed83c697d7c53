//! Typed error definitions for shelf_move.
//! Provides a small set of well-known failure modes for better logs and tests.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShelfMoveError {
    #[error("Entity not found in either store: {0}")]
    NotFound(PathBuf),

    #[error("Destination already occupied: {0}")]
    Conflict(PathBuf),

    #[error("Insufficient space on {dest}: need {required} bytes, have {available} bytes (margin {margin} bytes)")]
    InsufficientSpace {
        required: u64,
        available: u64,
        margin: u64,
        dest: PathBuf,
    },

    #[error("Verification failed for '{identity}': {reason}")]
    VerificationFailed { identity: String, reason: String },

    #[error("Finalization left '{identity}' partially settled: {detail}")]
    PartialFinalization { identity: String, detail: String },

    #[error("Redirection link target is itself a link: {0}")]
    LinkChain(PathBuf),

    #[error("Operation interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShelfMoveError {
    /// Stable machine-readable code for structured logging.
    pub fn code(&self) -> &'static str {
        match self {
            ShelfMoveError::NotFound(_) => "not_found",
            ShelfMoveError::Conflict(_) => "conflict",
            ShelfMoveError::InsufficientSpace { .. } => "insufficient_space",
            ShelfMoveError::VerificationFailed { .. } => "verification_failed",
            ShelfMoveError::PartialFinalization { .. } => "partial_finalization",
            ShelfMoveError::LinkChain(_) => "link_chain",
            ShelfMoveError::Interrupted => "interrupted",
            ShelfMoveError::Io(_) => "io_failure",
        }
    }
}
