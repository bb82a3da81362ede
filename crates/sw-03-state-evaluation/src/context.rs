//! # Execution Context
//!
//! Everything one fold needs: the contract definition and handler, the
//! missing interactions, the cached base and the call chain above it.

use std::fmt;
use std::sync::Arc;

use shared_types::{ContractDefinition, ContractId, EvalStateResult, InteractionRecord};
use sw_02_sort_key_cache::SortKeyCacheResult;

use crate::domain::call_stack::{CallChain, RecordId};
use crate::ports::ContractHandler;

#[derive(Clone)]
pub struct ExecutionContext {
    pub contract_id: ContractId,
    /// Call stack record of this contract handle.
    pub record: RecordId,
    pub definition: ContractDefinition,
    pub handler: Arc<dyn ContractHandler>,
    /// Sorted interactions after `base`, cycle-guarded.
    pub interactions: Vec<InteractionRecord>,
    /// Cached state the fold starts from; genesis when `None`.
    pub base: Option<SortKeyCacheResult<EvalStateResult>>,
    /// In-progress interactions up the stack.
    pub chain: CallChain,
    /// Handlers may not write.
    pub view: bool,
}

impl ExecutionContext {
    /// The state the fold starts from.
    #[must_use]
    pub fn initial_result(&self) -> EvalStateResult {
        match &self.base {
            Some(base) => base.cached_value.clone(),
            None => EvalStateResult::genesis(self.definition.init_state.clone()),
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.record.is_root()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("contract_id", &self.contract_id)
            .field("record", &self.record)
            .field("src_tx_id", &self.definition.src_tx_id)
            .field("interactions", &self.interactions.len())
            .field("base", &self.base.as_ref().map(|b| &b.sort_key))
            .field("chain", &self.chain.len())
            .field("view", &self.view)
            .finish()
    }
}
