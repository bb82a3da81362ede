//! # Tags Parser
//!
//! Protocol metadata carried in transaction tags.
//!
//! Two layouts exist for the function input:
//!
//! - **single interaction**: one `Contract` tag, the first `Input` tag is
//!   the input
//! - **multi interaction**: several `Contract` tags, each followed
//!   immediately by the `Input` tag meant for that contract

use serde_json::Value;
use shared_types::{InteractionRecord, Tag};

/// Tag names used by the protocol.
pub struct SmartWeaveTags;

impl SmartWeaveTags {
    pub const APP_NAME: &'static str = "App-Name";
    pub const APP_VERSION: &'static str = "App-Version";
    pub const CONTRACT_TX_ID: &'static str = "Contract";
    pub const INPUT: &'static str = "Input";
    pub const CONTRACT_SRC_TX_ID: &'static str = "Contract-Src";
    pub const INTERACT_WRITE: &'static str = "Interact-Write";
    pub const REQUEST_VRF: &'static str = "Request-Vrf";
    pub const SIGNATURE_TYPE: &'static str = "Signature-Type";
}

/// `App-Name` of a contract interaction.
pub const SMARTWEAVE_ACTION: &str = "SmartWeaveAction";

/// `App-Version` written on new interactions.
pub const APP_VERSION: &str = "0.3.0";

/// Why no input could be extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// No `Input` tag addressed to the contract.
    Missing,
    /// The tag value is not JSON.
    Malformed(String),
}

/// Stateless reader of protocol tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagsParser;

impl TagsParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn contract_tags<'a>(&self, record: &'a InteractionRecord) -> impl Iterator<Item = &'a str> {
        record
            .tags
            .iter()
            .filter(|t| t.name == SmartWeaveTags::CONTRACT_TX_ID)
            .map(|t| t.value.as_str())
    }

    /// Every contract the record addresses directly.
    #[must_use]
    pub fn contracts<'a>(&self, record: &'a InteractionRecord) -> Vec<&'a str> {
        self.contract_tags(record).collect()
    }

    /// The first `Contract` tag.
    #[must_use]
    pub fn contract<'a>(&self, record: &'a InteractionRecord) -> Option<&'a str> {
        self.contract_tags(record).next()
    }

    /// Whether the record carries several `Contract` tags.
    #[must_use]
    pub fn is_multi_interaction(&self, record: &InteractionRecord) -> bool {
        self.contract_tags(record).count() > 1
    }

    /// The `Input` tag addressed to `contract_id`.
    #[must_use]
    pub fn input_tag<'a>(&self, record: &'a InteractionRecord, contract_id: &str) -> Option<&'a Tag> {
        if self.is_multi_interaction(record) {
            let position = record.tags.iter().position(|t| {
                t.name == SmartWeaveTags::CONTRACT_TX_ID && t.value == contract_id
            })?;
            return record
                .tags
                .get(position + 1)
                .filter(|t| t.name == SmartWeaveTags::INPUT);
        }
        if self.contract(record) != Some(contract_id) {
            return None;
        }
        record.tags.iter().find(|t| t.name == SmartWeaveTags::INPUT)
    }

    /// Parsed input addressed to `contract_id`.
    pub fn input(&self, record: &InteractionRecord, contract_id: &str) -> Result<Value, InputError> {
        let tag = self.input_tag(record, contract_id).ok_or(InputError::Missing)?;
        serde_json::from_str(&tag.value).map_err(|e| InputError::Malformed(e.to_string()))
    }

    /// Contracts listed in `Interact-Write` tags.
    #[must_use]
    pub fn interact_write_contracts<'a>(&self, record: &'a InteractionRecord) -> Vec<&'a str> {
        record
            .tags
            .iter()
            .filter(|t| t.name == SmartWeaveTags::INTERACT_WRITE)
            .map(|t| t.value.as_str())
            .collect()
    }

    /// Whether `contract_id` is the target of an internal write in `record`
    /// rather than one of its direct contracts.
    #[must_use]
    pub fn is_interact_write(&self, record: &InteractionRecord, contract_id: &str) -> bool {
        self.interact_write_contracts(record).contains(&contract_id)
            && !self.contract_tags(record).any(|c| c == contract_id)
    }

    #[must_use]
    pub fn contract_src<'a>(&self, record: &'a InteractionRecord) -> Option<&'a str> {
        record.tag_value(SmartWeaveTags::CONTRACT_SRC_TX_ID)
    }

    #[must_use]
    pub fn app_name<'a>(&self, record: &'a InteractionRecord) -> Option<&'a str> {
        record.tag_value(SmartWeaveTags::APP_NAME)
    }

    #[must_use]
    pub fn requests_vrf(&self, record: &InteractionRecord) -> bool {
        record.tag_value(SmartWeaveTags::REQUEST_VRF) == Some("true")
    }

    #[must_use]
    pub fn is_evm_signed(&self, record: &InteractionRecord) -> bool {
        record.tag_value(SmartWeaveTags::SIGNATURE_TYPE) == Some("ethereum")
    }
}

/// Tags of a new interaction calling `contract_id` with `input`.
pub fn interaction_tags(contract_id: &str, input: &Value, interact_writes: &[String]) -> Vec<Tag> {
    let mut tags = vec![
        Tag::new(SmartWeaveTags::APP_NAME, SMARTWEAVE_ACTION),
        Tag::new(SmartWeaveTags::APP_VERSION, APP_VERSION),
        Tag::new(SmartWeaveTags::CONTRACT_TX_ID, contract_id),
        Tag::new(SmartWeaveTags::INPUT, input.to_string()),
    ];
    tags.extend(
        interact_writes
            .iter()
            .map(|c| Tag::new(SmartWeaveTags::INTERACT_WRITE, c.as_str())),
    );
    tags
}
