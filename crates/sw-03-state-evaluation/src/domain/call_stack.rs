//! # Contract Call Stack
//!
//! Records, per interaction, which foreign contracts were called while it
//! was evaluated, recursively.
//!
//! The tree is stored as an arena: every contract handle created during one
//! root evaluation is a [`CallRecord`] addressed by a [`RecordId`], and an
//! [`InteractionCall`] points at its children by id. Depth is checked when
//! a child is created, before any nested evaluation starts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{ContractId, InteractionRecord, SortKey, TxId};

use crate::errors::EvalError;

/// Index of a record in the call stack arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordId(usize);

impl RecordId {
    /// The root contract of the evaluation.
    pub const ROOT: Self = Self(0);

    #[must_use]
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

/// How a child contract was reached from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InnerCallType {
    /// State read (also used to resolve an `Interact-Write` interaction).
    Read,
    /// Read-only handler invocation.
    View,
    /// Internal write.
    Write,
}

/// One interaction evaluated by a contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionCall {
    pub interaction_tx_id: TxId,
    pub caller: String,
    pub function: Option<String>,
    /// The interaction is speculative.
    pub dry_write: bool,
    pub valid: Option<bool>,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<u64>,
    /// Output state, when requested by the stack trace options.
    pub output_state: Option<Value>,
    /// Foreign contract called during this interaction.
    #[serde(skip)]
    pub foreign_calls: BTreeMap<ContractId, RecordId>,
}

impl InteractionCall {
    pub fn new(
        interaction_tx_id: impl Into<TxId>,
        caller: impl Into<String>,
        function: Option<&str>,
        dry_write: bool,
    ) -> Self {
        Self {
            interaction_tx_id: interaction_tx_id.into(),
            caller: caller.into(),
            function: function.map(str::to_string),
            dry_write,
            valid: None,
            error_message: None,
            execution_time_ms: None,
            output_state: None,
            foreign_calls: BTreeMap::new(),
        }
    }
}

/// One contract handle in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub contract_id: ContractId,
    pub depth: usize,
    /// `None` for the root.
    pub inner_call_type: Option<InnerCallType>,
    pub interactions: Vec<InteractionCall>,
    pub parent: Option<RecordId>,
}

impl CallRecord {
    /// The last registration of `tx_id` on this record.
    #[must_use]
    pub fn interaction(&self, tx_id: &str) -> Option<&InteractionCall> {
        self.interactions
            .iter()
            .rev()
            .find(|c| c.interaction_tx_id == tx_id)
    }

    fn interaction_mut(&mut self, tx_id: &str) -> Option<&mut InteractionCall> {
        self.interactions
            .iter_mut()
            .rev()
            .find(|c| c.interaction_tx_id == tx_id)
    }
}

/// Arena of call records for one root evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCallStack {
    records: Vec<CallRecord>,
}

impl ContractCallStack {
    /// A stack holding only the root contract at depth 0.
    pub fn new(root_contract: impl Into<ContractId>) -> Self {
        Self {
            records: vec![CallRecord {
                contract_id: root_contract.into(),
                depth: 0,
                inner_call_type: None,
                interactions: Vec::new(),
                parent: None,
            }],
        }
    }

    #[must_use]
    pub fn root(&self) -> &CallRecord {
        &self.records[0]
    }

    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<&CallRecord> {
        self.records.get(id.0)
    }

    #[must_use]
    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Register an interaction evaluated by `record`.
    pub fn add_interaction(&mut self, record: RecordId, call: InteractionCall) {
        if let Some(r) = self.records.get_mut(record.0) {
            r.interactions.push(call);
        }
    }

    pub fn interaction_mut(&mut self, record: RecordId, tx_id: &str) -> Option<&mut InteractionCall> {
        self.records.get_mut(record.0)?.interaction_mut(tx_id)
    }

    /// Create the record of `contract_id` called from `parent` while it
    /// evaluates interaction `tx_id`.
    ///
    /// Fails when the child would be deeper than `max_depth`, and when a
    /// read or view follows a write into the same contract during the same
    /// interaction.
    pub fn add_child(
        &mut self,
        parent: RecordId,
        tx_id: &str,
        contract_id: &str,
        call_type: InnerCallType,
        max_depth: usize,
    ) -> Result<RecordId, EvalError> {
        let parent_record = self
            .records
            .get(parent.0)
            .ok_or_else(|| EvalError::MissingSortKeyForChild(contract_id.to_string()))?;
        let depth = parent_record.depth + 1;
        if depth > max_depth {
            return Err(EvalError::CallDepthExceeded {
                contract_id: contract_id.to_string(),
                depth,
                max: max_depth,
            });
        }

        if call_type != InnerCallType::Write {
            let previous = parent_record
                .interaction(tx_id)
                .and_then(|call| call.foreign_calls.get(contract_id))
                .and_then(|id| self.records.get(id.0));
            if previous.is_some_and(|r| r.inner_call_type == Some(InnerCallType::Write)) {
                return Err(EvalError::ReadAfterWrite(contract_id.to_string()));
            }
        }

        let id = RecordId(self.records.len());
        self.records.push(CallRecord {
            contract_id: contract_id.to_string(),
            depth,
            inner_call_type: Some(call_type),
            interactions: Vec::new(),
            parent: Some(parent),
        });
        if let Some(call) = self.interaction_mut(parent, tx_id) {
            call.foreign_calls.insert(contract_id.to_string(), id);
        }
        Ok(id)
    }

    /// Nested view of the arena, for rendering.
    #[must_use]
    pub fn to_tree(&self) -> CallStackNode {
        self.node(RecordId::ROOT)
    }

    /// JSON rendering of [`Self::to_tree`].
    pub fn to_json(&self) -> Result<Value, EvalError> {
        Ok(serde_json::to_value(self.to_tree())?)
    }

    fn node(&self, id: RecordId) -> CallStackNode {
        let record = &self.records[id.0];
        CallStackNode {
            contract_id: record.contract_id.clone(),
            depth: record.depth,
            inner_call_type: record.inner_call_type,
            interactions: record
                .interactions
                .iter()
                .map(|call| InteractionCallNode {
                    call: call.clone(),
                    foreign_contract_calls: call
                        .foreign_calls
                        .iter()
                        .map(|(contract, child)| (contract.clone(), self.node(*child)))
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Serializable call stack tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStackNode {
    pub contract_id: ContractId,
    pub depth: usize,
    pub inner_call_type: Option<InnerCallType>,
    pub interactions: Vec<InteractionCallNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionCallNode {
    #[serde(flatten)]
    pub call: InteractionCall,
    pub foreign_contract_calls: BTreeMap<ContractId, CallStackNode>,
}

// =============================================================================
// CALL CHAIN
// =============================================================================

/// One interaction being evaluated further up the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub contract_id: ContractId,
    pub interaction_id: TxId,
    pub sort_key: SortKey,
}

/// The `(contract, interaction)` pairs currently in progress, outermost
/// first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallChain(Vec<ChainEntry>);

impl CallChain {
    /// A copy with one more entry.
    #[must_use]
    pub fn extended(&self, contract_id: &str, interaction_id: &str, sort_key: &SortKey) -> Self {
        let mut entries = self.0.clone();
        entries.push(ChainEntry {
            contract_id: contract_id.to_string(),
            interaction_id: interaction_id.to_string(),
            sort_key: sort_key.clone(),
        });
        Self(entries)
    }

    #[must_use]
    pub fn contains(&self, contract_id: &str, interaction_id: &str) -> bool {
        self.0
            .iter()
            .any(|e| e.contract_id == contract_id && e.interaction_id == interaction_id)
    }

    /// Remove the first interaction of `contract_id` already in progress up
    /// the chain, and every later one. Returns the id it was cut at.
    pub fn cut_in_progress(
        &self,
        contract_id: &str,
        interactions: &mut Vec<InteractionRecord>,
    ) -> Option<TxId> {
        let position = interactions
            .iter()
            .position(|i| self.contains(contract_id, &i.id))?;
        let cut = interactions[position].id.clone();
        interactions.truncate(position);
        Some(cut)
    }

    /// Earliest in-progress interaction of `contract_id`.
    #[must_use]
    pub fn earliest_for(&self, contract_id: &str) -> Option<&SortKey> {
        self.0
            .iter()
            .filter(|e| e.contract_id == contract_id)
            .map(|e| &e.sort_key)
            .min()
    }

    #[must_use]
    pub fn entries(&self) -> &[ChainEntry] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
