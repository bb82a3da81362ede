//! # Outbound Ports (Driven Ports)
//!
//! Capabilities the evaluator consumes. Gateways, contract runtimes and
//! storage engines live behind these traits.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use shared_types::{BlockInfo, ContractDefinition, InteractionRecord, SortKey, VrfData};
use sw_02_sort_key_cache::BasicSortKeyCache;

use crate::config::EvaluationOptions;
use crate::context::ExecutionContext;
use crate::domain::interaction::HandlerOutput;
use crate::engine::EngineCore;
use crate::errors::{EvalError, HandlerError, LoaderError};
use crate::frame::EvaluationFrame;

/// Source of interaction records.
#[async_trait]
pub trait InteractionsLoader: Send + Sync {
    /// Records addressed to `contract_id` (directly or through an
    /// `Interact-Write` tag) in `(from_exclusive, to_inclusive]`.
    ///
    /// The bounds are advisory: callers sort and re-filter the result.
    async fn load(
        &self,
        contract_id: &str,
        from_exclusive: Option<&SortKey>,
        to_inclusive: Option<&SortKey>,
    ) -> Result<Vec<InteractionRecord>, LoaderError>;
}

/// Source of contract definitions.
#[async_trait]
pub trait DefinitionLoader: Send + Sync {
    /// Definition of `contract_id`, with the source swapped for `evolved`
    /// when given.
    async fn load(
        &self,
        contract_id: &str,
        evolved: Option<&str>,
    ) -> Result<ContractDefinition, LoaderError>;
}

/// Builds the handler running a contract source.
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    async fn create(
        &self,
        definition: &ContractDefinition,
        options: &EvaluationOptions,
    ) -> Result<Arc<dyn ContractHandler>, LoaderError>;
}

/// Contract business logic.
///
/// `Ok` replaces the state, `Rejected` and `Exception` leave it untouched
/// for the interaction, `Fatal` aborts the whole evaluation.
#[async_trait]
pub trait ContractHandler: Send + Sync {
    async fn handle(
        &self,
        frame: &EvaluationFrame,
        state: Value,
        input: &Value,
    ) -> Result<HandlerOutput, HandlerError>;
}

/// Verifies VRF payloads attached by a sequencer.
pub trait VrfVerifier: Send + Sync {
    fn verify(&self, vrf: &VrfData, sort_key: &SortKey) -> bool;
}

/// Current network position, used for dry runs.
#[async_trait]
pub trait NetworkInfoProvider: Send + Sync {
    async fn current_block(&self) -> Result<BlockInfo, LoaderError>;
}

/// Per-contract KV storage.
pub trait KvStorageFactory: Send + Sync {
    /// Storage of `contract_id`. Repeated calls return the same storage.
    fn storage(&self, contract_id: &str) -> Arc<dyn BasicSortKeyCache<Value>>;
}

/// Hook run after every applied interaction.
#[async_trait]
pub trait ExecutionContextModifier: Send + Sync {
    /// A replacement context for the rest of the fold, or `None` to keep the
    /// current one.
    async fn modify(
        &self,
        state: &Value,
        ctx: &ExecutionContext,
        core: &EngineCore,
        options: &EvaluationOptions,
    ) -> Result<Option<ExecutionContext>, EvalError>;
}
