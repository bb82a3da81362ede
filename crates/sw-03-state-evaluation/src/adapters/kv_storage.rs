//! In-memory per-contract KV storage.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use shared_types::ContractId;
use sw_02_sort_key_cache::{BasicSortKeyCache, CacheConfig, MemorySortKeyCache};

use crate::ports::KvStorageFactory;

/// Hands out one [`MemorySortKeyCache`] per contract, created on first use.
pub struct InMemoryKvStorageFactory {
    config: CacheConfig,
    storages: Mutex<HashMap<ContractId, Arc<MemorySortKeyCache<Value>>>>,
}

impl InMemoryKvStorageFactory {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            storages: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryKvStorageFactory {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl KvStorageFactory for InMemoryKvStorageFactory {
    fn storage(&self, contract_id: &str) -> Arc<dyn BasicSortKeyCache<Value>> {
        let mut storages = self.storages.lock();
        let storage = storages
            .entry(contract_id.to_string())
            .or_insert_with(|| Arc::new(MemorySortKeyCache::new(self.config.clone())));
        Arc::clone(storage) as Arc<dyn BasicSortKeyCache<Value>>
    }
}
