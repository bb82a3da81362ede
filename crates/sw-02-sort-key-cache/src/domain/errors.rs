//! # Cache Errors

use shared_types::SortKey;
use thiserror::Error;

/// Errors raised by sort key cache implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A different value is already stored at this exact key.
    #[error("Conflicting value already cached for {key} at {sort_key}")]
    Conflict { key: String, sort_key: SortKey },

    /// `commit`/`rollback` without a matching `begin`.
    #[error("No open transaction")]
    NoOpenTransaction,

    /// `begin` called on a transaction handle.
    #[error("Transaction already open on this handle")]
    NestedTransaction,

    /// A value could not be serialized for size accounting.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend failure.
    #[error("Storage error: {0}")]
    Storage(String),
}
