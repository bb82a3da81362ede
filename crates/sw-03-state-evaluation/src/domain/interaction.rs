//! # Interaction Results
//!
//! What a handler returns, what an interaction produces, and the typed
//! decoding of raw inputs.

use base64::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use shared_types::TxId;

use crate::errors::HandlerError;

/// Outcome class of one interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultKind {
    Ok,
    Error,
    Exception,
}

impl ResultKind {
    /// Metric label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Exception => "exception",
        }
    }
}

/// Successful handler output: the next state and an optional view result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutput {
    pub state: Value,
    pub result: Option<Value>,
}

impl HandlerOutput {
    /// A state transition without a result.
    #[must_use]
    pub fn state(state: Value) -> Self {
        Self {
            state,
            result: None,
        }
    }

    /// A view: state unchanged, `result` returned to the caller.
    #[must_use]
    pub fn result(state: Value, result: Value) -> Self {
        Self {
            state,
            result: Some(result),
        }
    }
}

/// Result of a dry run, a view or an internal write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionResult {
    #[serde(rename = "type")]
    pub kind: ResultKind,
    pub state: Value,
    pub result: Option<Value>,
    pub error_message: Option<String>,
}

impl InteractionResult {
    #[must_use]
    pub fn ok(state: Value, result: Option<Value>) -> Self {
        Self {
            kind: ResultKind::Ok,
            state,
            result,
            error_message: None,
        }
    }

    #[must_use]
    pub fn error(state: Value, message: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Error,
            state,
            result: None,
            error_message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn exception(state: Value, message: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Exception,
            state,
            result: None,
            error_message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.kind == ResultKind::Ok
    }

    /// The error message, or an empty string.
    #[must_use]
    pub fn message(&self) -> &str {
        self.error_message.as_deref().unwrap_or_default()
    }
}

/// Decode a raw input into a typed action, usually an enum tagged with
/// `#[serde(tag = "function")]`.
///
/// An unknown function or a malformed payload is a rejection.
pub fn parse_action<A: DeserializeOwned>(input: &Value) -> Result<A, HandlerError> {
    A::deserialize(input).map_err(|e| HandlerError::Rejected(format!("Invalid input: {e}")))
}

/// `function` field of a raw input.
#[must_use]
pub fn function_name(input: &Value) -> Option<&str> {
    input.get("function").and_then(Value::as_str)
}

/// 43-character base64url id derived from `seed`.
#[must_use]
pub fn derive_tx_id(seed: &[u8]) -> TxId {
    base64::encode_config(Sha256::digest(seed), URL_SAFE_NO_PAD)
}

/// Fresh id for a transaction that never reaches the ledger.
#[must_use]
pub fn dummy_tx_id() -> TxId {
    derive_tx_id(uuid::Uuid::new_v4().as_bytes())
}
