//! # Error Types
//!
//! Evaluation errors and their mapping onto the outcome taxonomy:
//!
//! | Kind | Effect |
//! |------|--------|
//! | `ContractRejection` | recorded per interaction, fold continues |
//! | `RuntimeException` | aborts the fold unless exceptions are ignored |
//! | `ProtocolViolation` | aborts, nothing is committed |
//! | `ResourceLimitExceeded` | aborts, nothing is committed |
//! | `Infrastructure` | loader or cache failure |

use shared_types::{ContractId, SortKey, TxId};
use sw_02_sort_key_cache::CacheError;
use thiserror::Error;

// =============================================================================
// ERROR KIND
// =============================================================================

/// Coarse classification of an [`EvalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ContractRejection,
    RuntimeException,
    ProtocolViolation,
    ResourceLimitExceeded,
    Infrastructure,
}

// =============================================================================
// LOADER ERRORS
// =============================================================================

/// Errors reported by loader and factory ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    #[error("Contract {0} not found")]
    ContractNotFound(ContractId),

    #[error("Contract source {0} not found")]
    SourceNotFound(TxId),

    #[error("Loader unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// EVALUATION ERRORS
// =============================================================================

/// Errors raised while evaluating contract state.
#[derive(Debug, Error)]
pub enum EvalError {
    // --- protocol violations ---
    #[error("VRF verification failed for interaction {tx_id} at {sort_key}")]
    VrfVerificationFailed { tx_id: TxId, sort_key: SortKey },

    #[error("Interaction {tx_id} has no sort key")]
    MissingSortKey { tx_id: TxId },

    #[error("Invalid evolve source id: {0}")]
    InvalidEvolveSource(String),

    #[error("Contract {contract_id} uses non-whitelisted source {src_tx_id}")]
    NonWhitelistedSource {
        contract_id: ContractId,
        src_tx_id: TxId,
    },

    #[error("Contract {0} not found")]
    ContractNotFound(ContractId),

    #[error("Validity not set after interaction {tx_id} of {contract_id}")]
    ValidityNotSet { contract_id: ContractId, tx_id: TxId },

    // --- resource limits ---
    #[error("Max call depth exceeded: {depth} > {max} while calling {contract_id}")]
    CallDepthExceeded {
        contract_id: ContractId,
        depth: usize,
        max: usize,
    },

    #[error("Interaction {tx_id} of {contract_id} exceeded {seconds}s")]
    InteractionTimeout {
        contract_id: ContractId,
        tx_id: TxId,
        seconds: u64,
    },

    #[error("Evaluation cancelled")]
    Cancelled,

    // --- runtime ---
    #[error("Exception in interaction {tx_id} of {contract_id}: {message}")]
    RuntimeException {
        contract_id: ContractId,
        tx_id: TxId,
        message: String,
    },

    // --- contract usage ---
    #[error("Reading {0} after writing to it in the same interaction")]
    ReadAfterWrite(ContractId),

    #[error("Internal writes are disabled")]
    InternalWritesDisabled,

    #[error("Writes are not allowed in view mode")]
    WriteInViewMode,

    #[error("Nested evaluation of {0} requires a sort key")]
    MissingSortKeyForChild(ContractId),

    #[error("Interaction rejected: {0}")]
    InteractionRejected(String),

    #[error("Invalid evaluation options: {0}")]
    InvalidOptions(String),

    // --- infrastructure ---
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Loader(LoaderError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EvalError {
    /// Position of this error in the outcome taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VrfVerificationFailed { .. }
            | Self::MissingSortKey { .. }
            | Self::InvalidEvolveSource(_)
            | Self::NonWhitelistedSource { .. }
            | Self::ContractNotFound(_)
            | Self::ValidityNotSet { .. } => ErrorKind::ProtocolViolation,
            Self::CallDepthExceeded { .. } | Self::InteractionTimeout { .. } | Self::Cancelled => {
                ErrorKind::ResourceLimitExceeded
            }
            Self::RuntimeException { .. } => ErrorKind::RuntimeException,
            Self::ReadAfterWrite(_)
            | Self::InternalWritesDisabled
            | Self::WriteInViewMode
            | Self::MissingSortKeyForChild(_)
            | Self::InteractionRejected(_)
            | Self::InvalidOptions(_) => ErrorKind::ContractRejection,
            Self::Cache(_) | Self::Loader(_) | Self::Serialization(_) => ErrorKind::Infrastructure,
        }
    }

    /// Whether the error must unwind the whole evaluation when raised from
    /// inside a contract handler. Non-fatal errors become an `exception`
    /// result of the calling interaction.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::VrfVerificationFailed { .. }
                | Self::MissingSortKey { .. }
                | Self::InvalidEvolveSource(_)
                | Self::ValidityNotSet { .. }
                | Self::CallDepthExceeded { .. }
                | Self::InteractionTimeout { .. }
                | Self::Cancelled
                | Self::RuntimeException { .. }
                | Self::Cache(_)
        )
    }
}

impl From<LoaderError> for EvalError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::ContractNotFound(id) => Self::ContractNotFound(id),
            other => Self::Loader(other),
        }
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// HANDLER ERRORS
// =============================================================================

/// Failure returned by a contract handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business-rule rejection (`error` outcome).
    #[error("{0}")]
    Rejected(String),

    /// Unexpected failure in handler code (`exception` outcome).
    #[error("{0}")]
    Exception(String),

    /// Unwinds the whole evaluation.
    #[error(transparent)]
    Fatal(EvalError),
}

impl From<EvalError> for HandlerError {
    fn from(err: EvalError) -> Self {
        if err.is_fatal() {
            Self::Fatal(err)
        } else {
            Self::Exception(err.to_string())
        }
    }
}
