//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Ledger**: `InteractionRecord`, `Tag`, `BlockInfo`, `OwnerInfo`, `VrfData`
//! - **Contracts**: `ContractDefinition`
//! - **Evaluation**: `EvalStateResult`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sort_key::SortKey;

/// Upper bound (in characters) of a recorded per-interaction error message.
pub const MAX_ERROR_MESSAGE_LEN: usize = 10_000;

/// Identifier of a deployed contract (its deployment transaction id).
pub type ContractId = String;

/// Identifier of a ledger transaction.
pub type TxId = String;

// =============================================================================
// CLUSTER A: THE LEDGER
// =============================================================================

/// A single name/value tag attached to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    /// Create a tag.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Metadata of the block that included an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockInfo {
    /// Block height.
    pub height: u64,
    /// Base64url block id.
    pub id: String,
    /// Block timestamp in seconds.
    pub timestamp: u64,
}

/// The signer of an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OwnerInfo {
    pub address: String,
}

/// Verifiable random function payload attached by a sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfData {
    pub index: String,
    pub proof: String,
    pub bigint: String,
    pub pubkey: String,
}

/// Confirmation status reported by a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Confirmed,
    NotProcessed,
    Corrupted,
}

/// One ledger transaction targeting a contract.
///
/// Records are produced by a loader, receive a [`SortKey`] from the sorter
/// when they lack one, and are immutable from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    /// Transaction id (base64url).
    pub id: TxId,
    /// The signer; the handler sees this address as the caller.
    pub owner: OwnerInfo,
    /// Transfer recipient, empty when none.
    #[serde(default)]
    pub recipient: String,
    /// Protocol tags.
    pub tags: Vec<Tag>,
    /// Including block.
    pub block: BlockInfo,
    /// Position in the canonical log.
    #[serde(default)]
    pub sort_key: Option<SortKey>,
    /// Speculative record, never persisted.
    #[serde(default)]
    pub dry: bool,
    #[serde(default)]
    pub confirmation_status: Option<ConfirmationStatus>,
    #[serde(default)]
    pub vrf: Option<VrfData>,
}

impl InteractionRecord {
    /// Create an unsorted record.
    pub fn new(id: impl Into<TxId>, owner: impl Into<String>, block: BlockInfo, tags: Vec<Tag>) -> Self {
        Self {
            id: id.into(),
            owner: OwnerInfo {
                address: owner.into(),
            },
            recipient: String::new(),
            tags,
            block,
            sort_key: None,
            dry: false,
            confirmation_status: None,
            vrf: None,
        }
    }

    /// Builder: attach a sequencer-assigned sort key.
    #[must_use]
    pub fn with_sort_key(mut self, sort_key: SortKey) -> Self {
        self.sort_key = Some(sort_key);
        self
    }

    /// Builder: attach a VRF payload.
    #[must_use]
    pub fn with_vrf(mut self, vrf: VrfData) -> Self {
        self.vrf = Some(vrf);
        self
    }

    /// Builder: set the confirmation status.
    #[must_use]
    pub fn with_confirmation_status(mut self, status: ConfirmationStatus) -> Self {
        self.confirmation_status = Some(status);
        self
    }

    /// Builder: mark as speculative.
    #[must_use]
    pub fn dry(mut self) -> Self {
        self.dry = true;
        self
    }

    /// Address of the signer.
    #[must_use]
    pub fn caller(&self) -> &str {
        &self.owner.address
    }

    /// Value of the first tag with the given name.
    #[must_use]
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }

    /// Whether the state after this record may become a cache frontier.
    #[must_use]
    pub fn is_confirmable(&self) -> bool {
        !self.dry
            && !matches!(
                self.confirmation_status,
                Some(ConfirmationStatus::NotProcessed | ConfirmationStatus::Corrupted)
            )
    }
}

// =============================================================================
// CLUSTER B: CONTRACTS
// =============================================================================

/// Everything needed to instantiate a contract handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDefinition {
    /// Contract id.
    pub tx_id: ContractId,
    /// Source transaction id (after evolve, the evolved one).
    pub src_tx_id: TxId,
    /// Genesis state.
    pub init_state: Value,
    /// Deployer address.
    pub owner: String,
    /// Source id the contract was deployed with, when it has evolved since.
    #[serde(default)]
    pub original_src_tx_id: Option<TxId>,
}

// =============================================================================
// CLUSTER C: EVALUATION
// =============================================================================

/// Folded output after applying a contiguous prefix of interactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EvalStateResult {
    pub state: Value,
    pub validity: BTreeMap<TxId, bool>,
    pub error_messages: BTreeMap<TxId, String>,
}

impl EvalStateResult {
    /// Result before any interaction has been applied.
    #[must_use]
    pub fn genesis(state: Value) -> Self {
        Self {
            state,
            validity: BTreeMap::new(),
            error_messages: BTreeMap::new(),
        }
    }

    /// Recorded validity of an interaction, if it was processed.
    #[must_use]
    pub fn validity_of(&self, tx_id: &str) -> Option<bool> {
        self.validity.get(tx_id).copied()
    }

    /// Mark an interaction as valid.
    pub fn record_valid(&mut self, tx_id: &str) {
        self.validity.insert(tx_id.to_string(), true);
        self.error_messages.remove(tx_id);
    }

    /// Mark an interaction as invalid with a (truncated) message.
    pub fn record_invalid(&mut self, tx_id: &str, message: &str) {
        self.validity.insert(tx_id.to_string(), false);
        self.error_messages
            .insert(tx_id.to_string(), truncate_message(message));
    }
}

/// Cut an error message to [`MAX_ERROR_MESSAGE_LEN`] characters.
#[must_use]
pub fn truncate_message(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_MESSAGE_LEN) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
