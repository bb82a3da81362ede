//! # Engine
//!
//! [`EngineCore`] bundles the ports shared by every evaluation;
//! [`SmartWeave`] hands out contract handles over it.

use std::sync::Arc;

use serde_json::Value;
use shared_types::EvalStateResult;
use sw_01_sort_key::LexicographicalSorter;
use sw_02_sort_key_cache::{BasicSortKeyCache, MemorySortKeyCache};
use sw_telemetry::log_event;

use crate::adapters::{CacheableDefinitionLoader, Evolve, InMemoryKvStorageFactory, InMemoryLedger};
use crate::config::{EngineConfig, EvaluationOptions};
use crate::contract::HandlerBasedContract;
use crate::errors::EvalError;
use crate::ports::{
    DefinitionLoader, ExecutionContextModifier, ExecutorFactory, InteractionsLoader,
    KvStorageFactory, NetworkInfoProvider, VrfVerifier,
};

/// Ports and configuration shared by every evaluation.
pub struct EngineCore {
    interactions_loader: Arc<dyn InteractionsLoader>,
    definition_loader: Arc<dyn DefinitionLoader>,
    executor_factory: Arc<dyn ExecutorFactory>,
    state_cache: Arc<dyn BasicSortKeyCache<EvalStateResult>>,
    kv_storage: Arc<dyn KvStorageFactory>,
    network_info: Option<Arc<dyn NetworkInfoProvider>>,
    vrf_verifier: Option<Arc<dyn VrfVerifier>>,
    modifiers: Vec<Arc<dyn ExecutionContextModifier>>,
    sorter: LexicographicalSorter,
    config: EngineConfig,
}

impl EngineCore {
    pub fn interactions_loader(&self) -> &dyn InteractionsLoader {
        self.interactions_loader.as_ref()
    }

    pub fn definition_loader(&self) -> &dyn DefinitionLoader {
        self.definition_loader.as_ref()
    }

    pub fn executor_factory(&self) -> &dyn ExecutorFactory {
        self.executor_factory.as_ref()
    }

    pub fn state_cache(&self) -> &dyn BasicSortKeyCache<EvalStateResult> {
        self.state_cache.as_ref()
    }

    pub fn kv_storage(&self) -> &dyn KvStorageFactory {
        self.kv_storage.as_ref()
    }

    pub fn network_info(&self) -> Option<&dyn NetworkInfoProvider> {
        self.network_info.as_deref()
    }

    pub fn vrf_verifier(&self) -> Option<&dyn VrfVerifier> {
        self.vrf_verifier.as_deref()
    }

    pub fn modifiers(&self) -> &[Arc<dyn ExecutionContextModifier>] {
        &self.modifiers
    }

    pub fn sorter(&self) -> LexicographicalSorter {
        self.sorter
    }

    pub fn default_options(&self) -> &EvaluationOptions {
        &self.config.evaluation
    }
}

/// Entry point: builds contract handles over one engine.
#[derive(Clone)]
pub struct SmartWeave {
    core: Arc<EngineCore>,
}

impl SmartWeave {
    #[must_use]
    pub fn builder() -> SmartWeaveBuilder {
        SmartWeaveBuilder::default()
    }

    /// Handle of `contract_id` using the engine's default options.
    #[must_use]
    pub fn contract(&self, contract_id: &str) -> HandlerBasedContract {
        HandlerBasedContract::new(
            Arc::clone(&self.core),
            contract_id,
            self.core.default_options().clone(),
        )
    }

    #[must_use]
    pub fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    /// The state cache, for inspection and pruning.
    #[must_use]
    pub fn state_cache(&self) -> Arc<dyn BasicSortKeyCache<EvalStateResult>> {
        Arc::clone(&self.core.state_cache)
    }

    /// KV storage of one contract.
    #[must_use]
    pub fn kv_storage(&self, contract_id: &str) -> Arc<dyn BasicSortKeyCache<Value>> {
        self.core.kv_storage.storage(contract_id)
    }
}

#[derive(Default)]
pub struct SmartWeaveBuilder {
    interactions_loader: Option<Arc<dyn InteractionsLoader>>,
    definition_loader: Option<Arc<dyn DefinitionLoader>>,
    executor_factory: Option<Arc<dyn ExecutorFactory>>,
    state_cache: Option<Arc<dyn BasicSortKeyCache<EvalStateResult>>>,
    kv_storage: Option<Arc<dyn KvStorageFactory>>,
    network_info: Option<Arc<dyn NetworkInfoProvider>>,
    vrf_verifier: Option<Arc<dyn VrfVerifier>>,
    modifiers: Vec<Arc<dyn ExecutionContextModifier>>,
    config: EngineConfig,
}

impl SmartWeaveBuilder {
    /// Use an in-memory ledger for interactions, definitions and network info.
    #[must_use]
    pub fn ledger(mut self, ledger: Arc<InMemoryLedger>) -> Self {
        self.interactions_loader = Some(ledger.clone());
        self.definition_loader = Some(ledger.clone());
        self.network_info = Some(ledger);
        self
    }

    #[must_use]
    pub fn interactions_loader(mut self, loader: Arc<dyn InteractionsLoader>) -> Self {
        self.interactions_loader = Some(loader);
        self
    }

    #[must_use]
    pub fn definition_loader(mut self, loader: Arc<dyn DefinitionLoader>) -> Self {
        self.definition_loader = Some(loader);
        self
    }

    #[must_use]
    pub fn executor_factory(mut self, factory: Arc<dyn ExecutorFactory>) -> Self {
        self.executor_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn state_cache(mut self, cache: Arc<dyn BasicSortKeyCache<EvalStateResult>>) -> Self {
        self.state_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn kv_storage(mut self, factory: Arc<dyn KvStorageFactory>) -> Self {
        self.kv_storage = Some(factory);
        self
    }

    #[must_use]
    pub fn network_info(mut self, provider: Arc<dyn NetworkInfoProvider>) -> Self {
        self.network_info = Some(provider);
        self
    }

    #[must_use]
    pub fn vrf_verifier(mut self, verifier: Arc<dyn VrfVerifier>) -> Self {
        self.vrf_verifier = Some(verifier);
        self
    }

    /// Add a context modifier, run after the built-in evolve modifier.
    #[must_use]
    pub fn modifier(mut self, modifier: Arc<dyn ExecutionContextModifier>) -> Self {
        self.modifiers.push(modifier);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for replacing the default evaluation options.
    #[must_use]
    pub fn evaluation_options(mut self, options: EvaluationOptions) -> Self {
        self.config.evaluation = options;
        self
    }

    pub fn build(self) -> Result<SmartWeave, EvalError> {
        self.config.validate()?;
        let missing = |port: &str| EvalError::InvalidOptions(format!("{port} is not configured"));
        let interactions_loader = self
            .interactions_loader
            .ok_or_else(|| missing("interactions loader"))?;
        let definition_loader = self
            .definition_loader
            .ok_or_else(|| missing("definition loader"))?;
        let executor_factory = self
            .executor_factory
            .ok_or_else(|| missing("executor factory"))?;

        let cache_config = self.config.cache.clone();
        let state_cache = self
            .state_cache
            .unwrap_or_else(|| Arc::new(MemorySortKeyCache::new(cache_config.clone())));
        let kv_storage = self
            .kv_storage
            .unwrap_or_else(|| Arc::new(InMemoryKvStorageFactory::new(cache_config)));
        let definition_loader: Arc<dyn DefinitionLoader> = Arc::new(CacheableDefinitionLoader::new(
            definition_loader,
            self.config.definition_cache_capacity,
        ));

        let mut modifiers: Vec<Arc<dyn ExecutionContextModifier>> = vec![Arc::new(Evolve::new())];
        modifiers.extend(self.modifiers);

        log_event!(
            info,
            "engine",
            "SmartWeave engine built",
            internal_writes = self.config.evaluation.internal_writes,
            max_call_depth = self.config.evaluation.max_call_depth,
            modifiers = modifiers.len()
        );

        Ok(SmartWeave {
            core: Arc::new(EngineCore {
                interactions_loader,
                definition_loader,
                executor_factory,
                state_cache,
                kv_storage,
                network_info: self.network_info,
                vrf_verifier: self.vrf_verifier,
                modifiers,
                sorter: LexicographicalSorter::new(),
                config: self.config,
            }),
        })
    }
}
