//! # Sort Key Cache Port
//!
//! Storage of versioned values keyed by `(key, sort key)`. Lookups return
//! the latest version at or below a bound; a tombstone version hides every
//! older one.
//!
//! `begin` returns a transaction handle implementing the same port. Writes
//! through the handle are staged and only reach the shared cache on its
//! `commit`; `rollback` (or dropping the handle) discards them. Writes
//! through the shared cache itself are never staged.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::SortKey;

use crate::domain::entities::{BatchOp, CacheKey, PruneStats, RangeOptions, SortKeyCacheResult};
use crate::domain::errors::CacheError;

/// Versioned cache used for contract states and contract KV storage.
#[async_trait]
pub trait BasicSortKeyCache<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Value stored at exactly this key, `None` if absent or deleted.
    async fn get(&self, key: &CacheKey) -> Result<Option<SortKeyCacheResult<V>>, CacheError>;

    /// Latest version of `key` with sort key `<= sort_key`.
    async fn get_less_or_equal(
        &self,
        key: &str,
        sort_key: &SortKey,
    ) -> Result<Option<SortKeyCacheResult<V>>, CacheError>;

    /// Latest version of `key` with sort key `< sort_key`.
    async fn get_less_than(
        &self,
        key: &str,
        sort_key: &SortKey,
    ) -> Result<Option<SortKeyCacheResult<V>>, CacheError>;

    /// Latest version of `key`.
    async fn get_last(&self, key: &str) -> Result<Option<SortKeyCacheResult<V>>, CacheError>;

    /// Greatest sort key stored under any key.
    async fn get_last_sort_key(&self) -> Result<Option<SortKey>, CacheError>;

    /// Store a value version.
    async fn put(&self, key: &CacheKey, value: V) -> Result<(), CacheError>;

    /// Store a tombstone version at `key`.
    async fn del(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Remove every version of a logical key.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Apply all operations or none.
    async fn batch(&self, ops: Vec<BatchOp<V>>) -> Result<(), CacheError>;

    /// Live logical keys as of `sort_key` (latest when `None`), filtered by `options`.
    async fn keys(
        &self,
        sort_key: Option<&SortKey>,
        options: &RangeOptions,
    ) -> Result<Vec<String>, CacheError>;

    /// Like [`Self::keys`], paired with each key's value.
    async fn kv_map(
        &self,
        sort_key: Option<&SortKey>,
        options: &RangeOptions,
    ) -> Result<Vec<(String, V)>, CacheError>;

    /// Every logical key with at least one stored version.
    async fn all_keys(&self) -> Result<Vec<String>, CacheError>;

    /// Full contents, for diagnostics. Tombstones appear as `None`.
    async fn dump(&self) -> Result<Vec<(CacheKey, Option<V>)>, CacheError>;

    /// Keep only the newest `entries_stored` versions of every key.
    async fn prune(&self, entries_stored: usize) -> Result<PruneStats, CacheError>;

    async fn open(&self) -> Result<(), CacheError>;

    async fn close(&self) -> Result<(), CacheError>;

    /// Open a transaction and return its handle. Waits while another one is
    /// open.
    async fn begin(&self) -> Result<Arc<dyn BasicSortKeyCache<V>>, CacheError>;

    /// Publish the handle's staged writes and release the transaction.
    async fn commit(&self) -> Result<(), CacheError>;

    /// Discard the handle's staged writes and release the transaction.
    async fn rollback(&self) -> Result<(), CacheError>;
}
