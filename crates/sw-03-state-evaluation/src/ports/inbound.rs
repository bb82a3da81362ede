//! # Driving Ports (API - Inbound)
//!
//! The contract surface exposed to clients.

use async_trait::async_trait;
use serde_json::Value;
use shared_types::{EvalStateResult, SortKey};
use sw_02_sort_key_cache::SortKeyCacheResult;

use crate::domain::interaction::InteractionResult;
use crate::errors::EvalError;

/// Where to stop a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadTarget {
    /// Up to and including this interaction.
    SortKey(SortKey),
    /// Up to the end of this block.
    BlockHeight(u64),
}

impl From<SortKey> for ReadTarget {
    fn from(sort_key: SortKey) -> Self {
        Self::SortKey(sort_key)
    }
}

/// Read, dry-run and view operations of one contract.
#[async_trait]
pub trait SmartWeaveContract: Send + Sync {
    fn contract_id(&self) -> &str;

    /// Folded state up to `target`, or up to the latest interaction.
    async fn read_state(
        &self,
        target: Option<ReadTarget>,
    ) -> Result<SortKeyCacheResult<EvalStateResult>, EvalError>;

    /// Evaluate `input` on top of the latest state without persisting.
    async fn dry_write(
        &self,
        input: &Value,
        caller: Option<&str>,
    ) -> Result<InteractionResult, EvalError>;

    /// Invoke a read-only function on the latest state.
    async fn view_state(&self, input: &Value) -> Result<InteractionResult, EvalError>;
}
