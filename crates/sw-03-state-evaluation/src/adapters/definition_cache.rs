//! LRU cache in front of a definition loader.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use shared_types::{ContractDefinition, ContractId, TxId};
use sw_telemetry::{metric_inc, CACHE_LOOKUPS};

use crate::errors::LoaderError;
use crate::ports::DefinitionLoader;

type DefinitionKey = (ContractId, Option<TxId>);

/// Caches definitions by contract id and evolved source. Errors are not
/// cached.
pub struct CacheableDefinitionLoader {
    inner: Arc<dyn DefinitionLoader>,
    cache: Mutex<LruCache<DefinitionKey, ContractDefinition>>,
}

impl CacheableDefinitionLoader {
    pub fn new(inner: Arc<dyn DefinitionLoader>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[async_trait]
impl DefinitionLoader for CacheableDefinitionLoader {
    async fn load(
        &self,
        contract_id: &str,
        evolved: Option<&str>,
    ) -> Result<ContractDefinition, LoaderError> {
        let key = (contract_id.to_string(), evolved.map(str::to_string));
        let cached = self.cache.lock().get(&key).cloned();
        if let Some(definition) = cached {
            metric_inc!(CACHE_LOOKUPS, &["definition", "hit"]);
            return Ok(definition);
        }
        metric_inc!(CACHE_LOOKUPS, &["definition", "miss"]);
        let definition = self.inner.load(contract_id, evolved).await?;
        self.cache.lock().put(key, definition.clone());
        Ok(definition)
    }
}
