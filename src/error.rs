//! Error surface for the core engine operations.
//!
//! Every public engine operation returns [`EngineError`]. Non-primary sector
//! embedding failures are handled inside the embedder (logged and dropped)
//! and never reach callers.

use crate::memory::types::Sector;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed caller input: empty content, unknown sector, zero limit.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required sector embedding could not be produced.
    #[error("embedding failed for sector {sector} via {provider}: {reason}")]
    EmbedFailed {
        sector: Sector,
        provider: String,
        reason: String,
    },

    /// The persistence layer rejected a write; nothing was committed.
    #[error("store operation failed: {0}")]
    StoreFailed(String),

    /// A referenced id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A caller-supplied id collides with an existing row.
    #[error("memory already exists: {0}")]
    Conflict(String),

    /// A bounded external call exceeded its budget.
    #[error("operation timed out: {op}")]
    Timeout { op: String },
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::StoreFailed(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::StoreFailed(format!("serialization: {e}"))
    }
}

/// Shorthand used throughout the core modules.
pub type Result<T> = std::result::Result<T, EngineError>;
