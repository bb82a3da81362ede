//! Executor factory over handlers registered per contract source.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{ContractDefinition, TxId};
use tracing::debug;

use crate::config::EvaluationOptions;
use crate::errors::LoaderError;
use crate::ports::{ContractHandler, ExecutorFactory};

/// Maps contract source ids to native handlers.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<TxId, Arc<dyn ContractHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register the handler running source `src_tx_id`, replacing any
    /// previous one.
    pub fn register(&self, src_tx_id: &str, handler: Arc<dyn ContractHandler>) {
        self.handlers.write().insert(src_tx_id.to_string(), handler);
    }

    #[must_use]
    pub fn contains(&self, src_tx_id: &str) -> bool {
        self.handlers.read().contains_key(src_tx_id)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutorFactory for HandlerRegistry {
    async fn create(
        &self,
        definition: &ContractDefinition,
        _options: &EvaluationOptions,
    ) -> Result<Arc<dyn ContractHandler>, LoaderError> {
        let handler = self
            .handlers
            .read()
            .get(&definition.src_tx_id)
            .cloned()
            .ok_or_else(|| LoaderError::SourceNotFound(definition.src_tx_id.clone()))?;
        debug!(contract_id = %definition.tx_id, src_tx_id = %definition.src_tx_id, "handler created");
        Ok(handler)
    }
}
