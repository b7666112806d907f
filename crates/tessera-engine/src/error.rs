//! Engine error types.

use tessera_types::BlockId;

/// Errors surfaced while applying generation events.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The repository rejected or failed a write.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// An operation referenced a block the working set does not hold.
    #[error("unknown block: {0:?}")]
    UnknownBlock(BlockId),
}

pub type Result<T> = std::result::Result<T, EngineError>;
