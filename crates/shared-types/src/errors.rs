//! # Error Types
//!
//! Errors raised when protocol primitives are parsed from untrusted input.

use thiserror::Error;

/// Errors produced by checked [`crate::SortKey`] parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortKeyError {
    /// The key does not have the `height,bucket,hash` shape.
    #[error("Malformed sort key: {0}")]
    Malformed(String),

    /// The height segment is not a decimal number.
    #[error("Invalid block height segment in sort key: {0}")]
    InvalidHeight(String),
}
