//! In-memory ledger: contract deployments, interactions and blocks.
//!
//! Serves as interactions loader, definition loader and network info
//! provider for tests, demos and embedded use.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use shared_types::{BlockInfo, ContractDefinition, ContractId, InteractionRecord, SortKey, TxId};
use sw_01_sort_key::LexicographicalSorter;
use tracing::debug;

use crate::domain::interaction::derive_tx_id;
use crate::domain::tags::{interaction_tags, TagsParser};
use crate::errors::LoaderError;
use crate::ports::{DefinitionLoader, InteractionsLoader, NetworkInfoProvider};

/// Height of the first block mined by a fresh ledger.
pub const GENESIS_HEIGHT: u64 = 1_000_000;

struct LedgerInner {
    height: u64,
    sequence: u64,
    sources: BTreeSet<TxId>,
    contracts: BTreeMap<ContractId, ContractDefinition>,
    interactions: Vec<InteractionRecord>,
}

pub struct InMemoryLedger {
    inner: RwLock<LedgerInner>,
    sorter: LexicographicalSorter,
    tags: TagsParser,
}

fn block_at(height: u64) -> BlockInfo {
    BlockInfo {
        height,
        id: derive_tx_id(format!("block-{height}").as_bytes()),
        timestamp: 1_600_000_000 + height * 120,
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                height: GENESIS_HEIGHT,
                sequence: 0,
                sources: BTreeSet::new(),
                contracts: BTreeMap::new(),
                interactions: Vec::new(),
            }),
            sorter: LexicographicalSorter::new(),
            tags: TagsParser::new(),
        }
    }

    /// Register a contract source id so contracts can deploy or evolve to it.
    pub fn deploy_source(&self, src_tx_id: &str) {
        self.inner.write().sources.insert(src_tx_id.to_string());
    }

    /// Deploy a contract and return its id.
    pub fn deploy_contract(&self, owner: &str, src_tx_id: &str, init_state: Value) -> ContractId {
        let mut inner = self.inner.write();
        inner.sequence += 1;
        let contract_id = derive_tx_id(format!("contract-{}-{src_tx_id}", inner.sequence).as_bytes());
        inner.sources.insert(src_tx_id.to_string());
        inner.contracts.insert(
            contract_id.clone(),
            ContractDefinition {
                tx_id: contract_id.clone(),
                src_tx_id: src_tx_id.to_string(),
                init_state,
                owner: owner.to_string(),
                original_src_tx_id: None,
            },
        );
        debug!(contract_id = %contract_id, src_tx_id, "contract deployed");
        contract_id
    }

    /// Record an interaction calling `contract_id` with `input` in a new
    /// block. Returns the transaction id.
    pub fn interact(&self, caller: &str, contract_id: &str, input: Value) -> TxId {
        self.interact_with_writes(caller, contract_id, input, &[])
    }

    /// Like [`Self::interact`], tagged with the contracts the interaction
    /// writes into.
    pub fn interact_with_writes(
        &self,
        caller: &str,
        contract_id: &str,
        input: Value,
        writes: &[String],
    ) -> TxId {
        let block = self.mine_block();
        let tx_id = {
            let mut inner = self.inner.write();
            inner.sequence += 1;
            derive_tx_id(format!("tx-{}-{contract_id}", inner.sequence).as_bytes())
        };
        let record = InteractionRecord::new(
            tx_id.clone(),
            caller,
            block,
            interaction_tags(contract_id, &input, writes),
        );
        self.push(record);
        tx_id
    }

    /// Append a prepared record as-is.
    pub fn push(&self, record: InteractionRecord) {
        self.inner.write().interactions.push(record);
    }

    /// Advance to a new block and return it.
    pub fn mine_block(&self) -> BlockInfo {
        let mut inner = self.inner.write();
        inner.height += 1;
        block_at(inner.height)
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.inner.read().height
    }

    #[must_use]
    pub fn interaction_count(&self) -> usize {
        self.inner.read().interactions.len()
    }

    fn addresses(&self, record: &InteractionRecord, contract_id: &str) -> bool {
        self.tags.contracts(record).contains(&contract_id)
            || self.tags.interact_write_contracts(record).contains(&contract_id)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InteractionsLoader for InMemoryLedger {
    async fn load(
        &self,
        contract_id: &str,
        from_exclusive: Option<&SortKey>,
        to_inclusive: Option<&SortKey>,
    ) -> Result<Vec<InteractionRecord>, LoaderError> {
        let matching: Vec<InteractionRecord> = self
            .inner
            .read()
            .interactions
            .iter()
            .filter(|r| self.addresses(r, contract_id))
            .cloned()
            .collect();
        let loaded: Vec<InteractionRecord> = self
            .sorter
            .sort(matching)
            .into_iter()
            .filter(|r| {
                r.sort_key.as_ref().is_some_and(|k| {
                    from_exclusive.map_or(true, |from| k > from)
                        && to_inclusive.map_or(true, |to| k <= to)
                })
            })
            .collect();
        debug!(contract_id, loaded = loaded.len(), "interactions loaded");
        Ok(loaded)
    }
}

#[async_trait]
impl DefinitionLoader for InMemoryLedger {
    async fn load(
        &self,
        contract_id: &str,
        evolved: Option<&str>,
    ) -> Result<ContractDefinition, LoaderError> {
        let inner = self.inner.read();
        let mut definition = inner
            .contracts
            .get(contract_id)
            .cloned()
            .ok_or_else(|| LoaderError::ContractNotFound(contract_id.to_string()))?;
        if let Some(src) = evolved.filter(|src| *src != definition.src_tx_id) {
            if !inner.sources.contains(src) {
                return Err(LoaderError::SourceNotFound(src.to_string()));
            }
            definition.original_src_tx_id = Some(std::mem::replace(&mut definition.src_tx_id, src.to_string()));
        }
        Ok(definition)
    }
}

#[async_trait]
impl NetworkInfoProvider for InMemoryLedger {
    async fn current_block(&self) -> Result<BlockInfo, LoaderError> {
        Ok(block_at(self.inner.read().height))
    }
}
