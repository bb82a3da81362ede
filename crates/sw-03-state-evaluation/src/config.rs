//! # Configuration
//!
//! Per-contract [`EvaluationOptions`] and the engine-wide [`EngineConfig`].
//! Both deserialize from partial camelCase JSON; missing fields keep their
//! defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sw_02_sort_key_cache::CacheConfig;

use crate::errors::EvalError;

/// Protocol default for nested contract calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 7;

/// Default wall-clock budget of a single handler invocation.
pub const DEFAULT_MAX_INTERACTION_EVALUATION_TIME_SECONDS: u64 = 60;

/// Default number of cached contract definitions.
pub const DEFAULT_DEFINITION_CACHE_CAPACITY: usize = 256;

/// Call stack capture options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StackTraceOptions {
    /// Keep each interaction's output state in the call stack.
    pub save_state: bool,
}

/// Options controlling how a contract is evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluationOptions {
    /// Treat handler exceptions like rejections instead of aborting.
    pub ignore_exceptions: bool,
    /// Resolve `Interact-Write` interactions and allow internal writes.
    pub internal_writes: bool,
    /// Store the state after every interaction.
    pub update_cache_for_each_interaction: bool,
    /// Deepest allowed nested contract call.
    pub max_call_depth: usize,
    /// Budget of one handler invocation.
    pub max_interaction_evaluation_time_seconds: u64,
    pub stack_trace: StackTraceOptions,
    /// Store the state after every n-th interaction.
    pub cache_every_n_interactions: Option<u64>,
    /// Allowed contract sources; empty allows every source.
    pub whitelist_sources: Vec<String>,
    /// Raise a failed internal write into the writing handler as a rejection.
    pub throw_on_internal_write_error: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            ignore_exceptions: true,
            internal_writes: false,
            update_cache_for_each_interaction: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_interaction_evaluation_time_seconds: DEFAULT_MAX_INTERACTION_EVALUATION_TIME_SECONDS,
            stack_trace: StackTraceOptions::default(),
            cache_every_n_interactions: None,
            whitelist_sources: Vec::new(),
            throw_on_internal_write_error: true,
        }
    }
}

impl EvaluationOptions {
    /// Reject option combinations that cannot be evaluated.
    pub fn validate(&self) -> Result<(), EvalError> {
        if self.max_call_depth == 0 {
            return Err(EvalError::InvalidOptions(
                "maxCallDepth must be at least 1".to_string(),
            ));
        }
        if self.max_interaction_evaluation_time_seconds == 0 {
            return Err(EvalError::InvalidOptions(
                "maxInteractionEvaluationTimeSeconds must be positive".to_string(),
            ));
        }
        if self.cache_every_n_interactions == Some(0) {
            return Err(EvalError::InvalidOptions(
                "cacheEveryNInteractions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Handler budget as a [`Duration`].
    #[must_use]
    pub fn interaction_budget(&self) -> Duration {
        Duration::from_secs(self.max_interaction_evaluation_time_seconds)
    }

    /// Whether a source id passes the whitelist.
    #[must_use]
    pub fn is_source_allowed(&self, src_tx_id: &str) -> bool {
        self.whitelist_sources.is_empty() || self.whitelist_sources.iter().any(|s| s == src_tx_id)
    }

    /// Whether the state after every interaction must be stored.
    ///
    /// Internal writes need it: a writer evaluates its callee just before
    /// the writing interaction, and finds that state in the cache.
    #[must_use]
    pub fn persists_each_interaction(&self) -> bool {
        self.update_cache_for_each_interaction || self.internal_writes
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Options given to contracts created by the engine.
    pub evaluation: EvaluationOptions,
    /// Capacity of the contract definition LRU cache.
    pub definition_cache_capacity: usize,
    /// Configuration of the default in-memory caches.
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation: EvaluationOptions::default(),
            definition_cache_capacity: DEFAULT_DEFINITION_CACHE_CAPACITY,
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, EvalError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if self.definition_cache_capacity == 0 {
            return Err(EvalError::InvalidOptions(
                "definitionCacheCapacity must be positive".to_string(),
            ));
        }
        self.evaluation.validate()
    }
}
