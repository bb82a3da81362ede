//! # Interaction State
//!
//! Write sets of the interactions currently in progress, innermost last.
//!
//! Every interaction folded by a contract opens a [`WriteSet`]; an internal
//! write opens a nested one for the callee. Effects on other contracts
//! (callee states, KV writes) are staged in the innermost write set and only
//! reach the caches when the interaction that owns it finishes as valid.
//! A failed interaction simply drops its write set, which rolls back every
//! nested write at once.
//!
//! A valid interaction that is not confirmed on chain keeps its write set
//! as *provisional*: the rest of the session reads through it, but it is
//! never published to the caches.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use shared_types::{ContractId, EvalStateResult, SortKey, TxId};

/// Staged effects of one interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSet {
    /// Contract whose handler processes the interaction.
    pub owner: ContractId,
    pub interaction_id: TxId,
    pub sort_key: SortKey,
    /// Callee states at `sort_key`.
    pub states: BTreeMap<ContractId, EvalStateResult>,
    /// KV writes at `sort_key`; `None` is a delete.
    pub kv: BTreeMap<ContractId, BTreeMap<String, Option<Value>>>,
}

impl WriteSet {
    #[must_use]
    pub fn new(owner: &str, interaction_id: &str, sort_key: &SortKey) -> Self {
        Self {
            owner: owner.to_string(),
            interaction_id: interaction_id.to_string(),
            sort_key: sort_key.clone(),
            states: BTreeMap::new(),
            kv: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.kv.values().all(BTreeMap::is_empty)
    }

    /// Overlay `other` on this write set.
    fn absorb(&mut self, other: WriteSet) {
        self.states.extend(other.states);
        for (contract, ops) in other.kv {
            self.kv.entry(contract).or_default().extend(ops);
        }
    }
}

/// Stack of open write sets plus the provisional ones of the session.
#[derive(Debug, Default)]
pub struct InteractionState {
    frames: Vec<WriteSet>,
    provisional: Vec<WriteSet>,
}

impl InteractionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a write set; returns the depth before opening.
    pub fn push(&mut self, write_set: WriteSet) -> usize {
        let depth = self.frames.len();
        self.frames.push(write_set);
        depth
    }

    /// Close the innermost write set.
    pub fn pop(&mut self) -> Option<WriteSet> {
        self.frames.pop()
    }

    /// Close the innermost write set and overlay it on its parent.
    pub fn merge_top(&mut self) {
        if self.frames.len() < 2 {
            return;
        }
        if let Some(top) = self.frames.pop() {
            if let Some(parent) = self.frames.last_mut() {
                parent.absorb(top);
            }
        }
    }

    /// Drop every write set opened at or after `depth`.
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Stage `result` as the state of `contract_id` in the innermost write set.
    pub fn stage_state(&mut self, contract_id: &str, result: EvalStateResult) {
        if let Some(top) = self.frames.last_mut() {
            top.states.insert(contract_id.to_string(), result);
        }
    }

    /// Latest staged state of `contract_id` at exactly `sort_key`, open
    /// write sets first, then provisional ones.
    #[must_use]
    pub fn staged_state(&self, contract_id: &str, sort_key: &SortKey) -> Option<&EvalStateResult> {
        self.frames
            .iter()
            .rev()
            .chain(self.provisional.iter().rev())
            .filter(|f| &f.sort_key == sort_key)
            .find_map(|f| f.states.get(contract_id))
    }

    /// Keep a closed write set visible to the session without publishing it.
    pub fn keep_provisional(&mut self, write_set: WriteSet) {
        if !write_set.is_empty() {
            self.provisional.push(write_set);
        }
    }

    /// Latest provisional KV write of `key` strictly before `before`.
    #[must_use]
    pub fn provisional_kv(
        &self,
        contract_id: &str,
        key: &str,
        before: &SortKey,
    ) -> Option<(SortKey, Option<Value>)> {
        self.provisional
            .iter()
            .filter(|f| &f.sort_key < before)
            .filter_map(|f| {
                let value = f.kv.get(contract_id)?.get(key)?;
                Some((f.sort_key.clone(), value.clone()))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
    }

    /// Keys with a provisional KV write strictly before `before`.
    #[must_use]
    pub fn provisional_kv_keys(&self, contract_id: &str, before: &SortKey) -> BTreeSet<String> {
        self.provisional
            .iter()
            .filter(|f| &f.sort_key < before)
            .filter_map(|f| f.kv.get(contract_id))
            .flat_map(|ops| ops.keys().cloned())
            .collect()
    }

    /// Drop provisional KV writes of `key` older than a published version.
    pub fn forget_provisional_kv(&mut self, contract_id: &str, key: &str, published: &SortKey) {
        for frame in self.provisional.iter_mut().filter(|f| &f.sort_key < published) {
            if let Some(ops) = frame.kv.get_mut(contract_id) {
                ops.remove(key);
            }
        }
        self.provisional.retain(|f| !f.is_empty());
    }

    /// Stage a KV write (`None` deletes).
    pub fn stage_kv(&mut self, contract_id: &str, key: &str, value: Option<Value>) {
        if let Some(top) = self.frames.last_mut() {
            top.kv
                .entry(contract_id.to_string())
                .or_default()
                .insert(key.to_string(), value);
        }
    }

    /// Latest staged KV value at `sort_key`; `Some(None)` is a staged delete.
    #[must_use]
    pub fn staged_kv(&self, contract_id: &str, sort_key: &SortKey, key: &str) -> Option<Option<Value>> {
        self.frames
            .iter()
            .rev()
            .filter(|f| &f.sort_key == sort_key)
            .find_map(|f| f.kv.get(contract_id).and_then(|ops| ops.get(key)))
            .cloned()
    }

    /// Every staged KV write of `contract_id` at `sort_key`, inner frames
    /// overriding outer ones.
    #[must_use]
    pub fn staged_kv_ops(&self, contract_id: &str, sort_key: &SortKey) -> BTreeMap<String, Option<Value>> {
        let mut merged = BTreeMap::new();
        for frame in self.frames.iter().filter(|f| &f.sort_key == sort_key) {
            if let Some(ops) = frame.kv.get(contract_id) {
                merged.extend(ops.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        merged
    }
}
