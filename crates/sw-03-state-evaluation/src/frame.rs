//! # Evaluation Frame
//!
//! The contract-facing view of one interaction. A handler receives the
//! frame by reference and uses it to learn about the transaction and block,
//! to call other contracts and to use its KV storage. A frame never
//! outlives the handler invocation it was built for.

use std::sync::Arc;

use serde_json::Value;
use shared_types::{BlockInfo, ContractDefinition, ContractId, InteractionRecord, SortKey, Tag, TxId, VrfData};
use sw_02_sort_key_cache::RangeOptions;

use crate::domain::call_stack::{CallChain, RecordId};
use crate::domain::interaction::InteractionResult;
use crate::errors::{EvalError, HandlerError};
use crate::session::EvaluationSession;

/// The contract being evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    pub id: ContractId,
    pub owner: String,
    pub src_tx_id: TxId,
}

impl From<&ContractDefinition> for ContractInfo {
    fn from(definition: &ContractDefinition) -> Self {
        Self {
            id: definition.tx_id.clone(),
            owner: definition.owner.clone(),
            src_tx_id: definition.src_tx_id.clone(),
        }
    }
}

/// The interaction being evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionInfo {
    pub id: TxId,
    pub owner: String,
    pub sort_key: SortKey,
    pub tags: Vec<Tag>,
    pub dry: bool,
    pub block: BlockInfo,
    pub vrf: Option<VrfData>,
}

impl TransactionInfo {
    #[must_use]
    pub fn new(interaction: &InteractionRecord, sort_key: &SortKey) -> Self {
        Self {
            id: interaction.id.clone(),
            owner: interaction.owner.address.clone(),
            sort_key: sort_key.clone(),
            tags: interaction.tags.clone(),
            dry: interaction.dry,
            block: interaction.block.clone(),
            vrf: interaction.vrf.clone(),
        }
    }
}

pub struct EvaluationFrame {
    session: Arc<EvaluationSession>,
    record: RecordId,
    contract: ContractInfo,
    transaction: TransactionInfo,
    caller: String,
    chain: CallChain,
    view: bool,
}

impl EvaluationFrame {
    pub(crate) fn new(
        session: Arc<EvaluationSession>,
        record: RecordId,
        contract: ContractInfo,
        transaction: TransactionInfo,
        caller: String,
        chain: CallChain,
        view: bool,
    ) -> Self {
        Self {
            session,
            record,
            contract,
            transaction,
            caller,
            chain,
            view,
        }
    }

    #[must_use]
    pub fn contract(&self) -> &ContractInfo {
        &self.contract
    }

    #[must_use]
    pub fn transaction(&self) -> &TransactionInfo {
        &self.transaction
    }

    #[must_use]
    pub fn block(&self) -> &BlockInfo {
        &self.transaction.block
    }

    /// The signer for direct interactions, the writing contract for
    /// internal writes.
    #[must_use]
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Whether this invocation is a view (no writes allowed).
    #[must_use]
    pub fn is_view(&self) -> bool {
        self.view
    }

    pub(crate) fn record(&self) -> RecordId {
        self.record
    }

    pub(crate) fn chain(&self) -> &CallChain {
        &self.chain
    }

    /// Write `input` into another contract.
    ///
    /// With `throw_on_internal_write_error` a failed write is raised as a
    /// rejection of the calling interaction; otherwise the failed result is
    /// returned.
    pub async fn write(&self, contract_id: &str, input: Value) -> Result<InteractionResult, HandlerError> {
        if self.view {
            return Err(EvalError::WriteInViewMode.into());
        }
        let result = self.session.write(self, contract_id, input).await?;
        if !result.is_ok() && self.session.options().throw_on_internal_write_error {
            return Err(HandlerError::Rejected(format!(
                "Internal write into {contract_id} failed: {}",
                result.message()
            )));
        }
        Ok(result)
    }

    /// State of another contract just before the current interaction.
    pub async fn read_contract_state(&self, contract_id: &str) -> Result<Value, HandlerError> {
        Ok(self.session.read_contract_state(self, contract_id).await?)
    }

    /// Run a view function of another contract.
    pub async fn view_contract_state(
        &self,
        contract_id: &str,
        input: Value,
    ) -> Result<InteractionResult, HandlerError> {
        Ok(self.session.view_contract_state(self, contract_id, input).await?)
    }

    /// This contract's state as staged by write-backs during the current
    /// interaction, if any.
    #[must_use]
    pub fn refresh_state(&self) -> Option<Value> {
        self.session
            .staged_state(&self.contract.id, &self.transaction.sort_key)
            .map(|r| r.state)
    }

    pub async fn kv_get(&self, key: &str) -> Result<Option<Value>, HandlerError> {
        Ok(self.session.kv_get(self, key).await?)
    }

    pub fn kv_put(&self, key: &str, value: Value) -> Result<(), HandlerError> {
        if self.view {
            return Err(EvalError::WriteInViewMode.into());
        }
        self.session.kv_stage(self, key, Some(value));
        Ok(())
    }

    pub fn kv_del(&self, key: &str) -> Result<(), HandlerError> {
        if self.view {
            return Err(EvalError::WriteInViewMode.into());
        }
        self.session.kv_stage(self, key, None);
        Ok(())
    }

    pub async fn kv_keys(&self, range: &RangeOptions) -> Result<Vec<String>, HandlerError> {
        let entries = self.session.kv_map(self, range).await?;
        Ok(entries.into_iter().map(|(k, _)| k).collect())
    }

    pub async fn kv_map(&self, range: &RangeOptions) -> Result<Vec<(String, Value)>, HandlerError> {
        Ok(self.session.kv_map(self, range).await?)
    }
}
