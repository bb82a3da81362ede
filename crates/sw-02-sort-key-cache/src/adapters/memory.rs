//! In-memory sort key cache.
//!
//! Versions of every logical key live in a `BTreeMap<SortKey, Option<V>>`
//! (`None` is a tombstone). The committed store is shared between the cache
//! and the transaction handles it hands out. A handle keeps its writes in a
//! private staging layer that only the handle reads through, merged into
//! the committed store on `commit`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use shared_types::SortKey;
use sw_telemetry::{log_event, CACHE_CONFLICTS, CACHE_LOOKUPS};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::config::{CacheConfig, ConflictPolicy};
use crate::domain::entities::{BatchOp, CacheKey, PruneStats, RangeOptions, SortKeyCacheResult};
use crate::domain::errors::CacheError;
use crate::ports::BasicSortKeyCache;

type Versions<V> = BTreeMap<SortKey, Option<V>>;
type Store<V> = HashMap<String, Versions<V>>;

struct Staging<V> {
    entries: Store<V>,
    deleted_keys: HashSet<String>,
}

impl<V> Staging<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            deleted_keys: HashSet::new(),
        }
    }
}

fn latest<'a, V>(
    versions: Option<&'a Versions<V>>,
    upper: Bound<&SortKey>,
) -> Option<(&'a SortKey, &'a Option<V>)> {
    versions?
        .range::<SortKey, _>((Bound::Unbounded, upper))
        .next_back()
}

fn insert<V>(store: &mut Store<V>, key: CacheKey, value: Option<V>) {
    store
        .entry(key.key)
        .or_default()
        .insert(key.sort_key, value);
}

/// Committed data, optionally overlaid with one transaction's staging.
struct View<'a, V> {
    committed: &'a Store<V>,
    staging: Option<&'a Staging<V>>,
}

impl<V: Clone> View<'_, V> {
    fn committed_versions(&self, key: &str) -> Option<&Versions<V>> {
        match self.staging {
            Some(staging) if staging.deleted_keys.contains(key) => None,
            _ => self.committed.get(key),
        }
    }

    fn staged_versions(&self, key: &str) -> Option<&Versions<V>> {
        self.staging.and_then(|s| s.entries.get(key))
    }

    /// Latest version under `upper`, staged versions winning ties.
    fn lookup(&self, key: &str, upper: Bound<&SortKey>) -> Option<(&SortKey, &Option<V>)> {
        let base = latest(self.committed_versions(key), upper);
        let staged = latest(self.staged_versions(key), upper);
        match (base, staged) {
            (Some(b), Some(s)) => Some(if s.0 >= b.0 { s } else { b }),
            (b, s) => s.or(b),
        }
    }

    fn lookup_value(&self, key: &str, upper: Bound<&SortKey>) -> Option<SortKeyCacheResult<V>> {
        let (sort_key, value) = self.lookup(key, upper)?;
        value
            .as_ref()
            .map(|v| SortKeyCacheResult::new(sort_key.clone(), v.clone()))
    }

    fn exact(&self, key: &CacheKey) -> Option<&Option<V>> {
        self.staged_versions(&key.key)
            .and_then(|v| v.get(&key.sort_key))
            .or_else(|| {
                self.committed_versions(&key.key)
                    .and_then(|v| v.get(&key.sort_key))
            })
    }

    fn logical_keys(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self
            .committed
            .keys()
            .filter(|k| self.committed_versions(k).is_some())
            .cloned()
            .collect();
        if let Some(staging) = self.staging {
            keys.extend(staging.entries.keys().cloned());
        }
        keys
    }
}

fn record_lookup<T>(kind: &str, result: &Option<T>) {
    let outcome = if result.is_some() { "hit" } else { "miss" };
    CACHE_LOOKUPS.with_label_values(&[kind, outcome]).inc();
}

fn entry_size<V: Serialize>(key: &str, sort_key: &SortKey, value: &Option<V>) -> Result<u64, CacheError> {
    bincode::serialized_size(&(key, sort_key, value))
        .map_err(|e| CacheError::Serialization(e.to_string()))
}

fn prune_map<V: Serialize>(
    map: &mut Store<V>,
    keep: usize,
    stats: &mut PruneStats,
) -> Result<(), CacheError> {
    for (key, versions) in map.iter_mut() {
        stats.entries_before += versions.len();
        for (sort_key, value) in versions.iter() {
            stats.size_before += entry_size(key, sort_key, value)?;
        }
        while versions.len() > keep {
            versions.pop_first();
        }
        stats.entries_after += versions.len();
        for (sort_key, value) in versions.iter() {
            stats.size_after += entry_size(key, sort_key, value)?;
        }
    }
    map.retain(|_, versions| !versions.is_empty());
    Ok(())
}

/// Staging layer and lock guard owned by a transaction handle.
struct Transaction<V> {
    staging: Mutex<Option<Staging<V>>>,
    guard: Mutex<Option<OwnedMutexGuard<()>>>,
}

/// Thread-safe in-memory [`BasicSortKeyCache`].
///
/// `begin` returns another `MemorySortKeyCache` sharing the committed store
/// and owning the transaction. Dropping that handle without `commit` rolls
/// the transaction back.
pub struct MemorySortKeyCache<V> {
    config: CacheConfig,
    committed: Arc<RwLock<Store<V>>>,
    tx_lock: Arc<tokio::sync::Mutex<()>>,
    tx: Option<Transaction<V>>,
}

impl<V> MemorySortKeyCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            committed: Arc::new(RwLock::new(HashMap::new())),
            tx_lock: Arc::new(tokio::sync::Mutex::new(())),
            tx: None,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether this handle owns a transaction that is still open.
    pub fn in_transaction(&self) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.staging.lock().is_some())
    }
}

impl<V> Default for MemorySortKeyCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<V> MemorySortKeyCache<V>
where
    V: Clone + PartialEq,
{
    fn read<R>(&self, f: impl FnOnce(&View<'_, V>) -> R) -> R {
        let committed = self.committed.read();
        let staging = self.tx.as_ref().map(|tx| tx.staging.lock());
        let view = View {
            committed: &committed,
            staging: staging.as_ref().and_then(|g| (**g).as_ref()),
        };
        f(&view)
    }

    fn check_conflict(&self, view: &View<'_, V>, key: &CacheKey, value: &V) -> Result<(), CacheError> {
        let Some(Some(existing)) = view.exact(key) else {
            return Ok(());
        };
        if existing == value {
            return Ok(());
        }
        CACHE_CONFLICTS.inc();
        log_event!(warn, "cache", "conflicting value at existing cache key", key = %key.key, sort_key = %key.sort_key);
        match self.config.conflict_policy {
            ConflictPolicy::Tolerate => Ok(()),
            ConflictPolicy::Reject => Err(CacheError::Conflict {
                key: key.key.clone(),
                sort_key: key.sort_key.clone(),
            }),
        }
    }

    /// Check every put for conflicts, then store all versions: into the
    /// handle's staging inside a transaction, into the committed store
    /// otherwise.
    fn apply(&self, ops: Vec<(CacheKey, Option<V>)>) -> Result<(), CacheError> {
        match &self.tx {
            None => {
                let mut committed = self.committed.write();
                let view = View {
                    committed: &committed,
                    staging: None,
                };
                for (key, value) in &ops {
                    if let Some(value) = value {
                        self.check_conflict(&view, key, value)?;
                    }
                }
                for (key, value) in ops {
                    insert(&mut committed, key, value);
                }
            }
            Some(tx) => {
                let committed = self.committed.read();
                let mut guard = tx.staging.lock();
                let staging = guard.as_mut().ok_or(CacheError::NoOpenTransaction)?;
                let view = View {
                    committed: &committed,
                    staging: Some(&*staging),
                };
                for (key, value) in &ops {
                    if let Some(value) = value {
                        self.check_conflict(&view, key, value)?;
                    }
                }
                for (key, value) in ops {
                    insert(&mut staging.entries, key, value);
                }
            }
        }
        Ok(())
    }

    fn ranged<T>(
        &self,
        sort_key: Option<&SortKey>,
        options: &RangeOptions,
        map: impl Fn(String, V) -> T,
    ) -> Vec<T> {
        let upper = sort_key.map_or(Bound::Unbounded, Bound::Included);
        let mut live: Vec<(String, V)> = self.read(|view| {
            view.logical_keys()
                .into_iter()
                .filter(|k| options.contains(k))
                .filter_map(|k| {
                    let value = view.lookup_value(&k, upper)?.cached_value;
                    Some((k, value))
                })
                .collect()
        });
        if options.reverse {
            live.reverse();
        }
        if let Some(limit) = options.limit {
            live.truncate(limit);
        }
        live.into_iter().map(|(k, v)| map(k, v)).collect()
    }
}

#[async_trait]
impl<V> BasicSortKeyCache<V> for MemorySortKeyCache<V>
where
    V: Clone + PartialEq + Serialize + Send + Sync + 'static,
{
    async fn get(&self, key: &CacheKey) -> Result<Option<SortKeyCacheResult<V>>, CacheError> {
        let result = self.read(|view| {
            view.exact(key)
                .and_then(|v| v.clone())
                .map(|v| SortKeyCacheResult::new(key.sort_key.clone(), v))
        });
        record_lookup("exact", &result);
        Ok(result)
    }

    async fn get_less_or_equal(
        &self,
        key: &str,
        sort_key: &SortKey,
    ) -> Result<Option<SortKeyCacheResult<V>>, CacheError> {
        let result = self.read(|view| view.lookup_value(key, Bound::Included(sort_key)));
        record_lookup("less_or_equal", &result);
        Ok(result)
    }

    async fn get_less_than(
        &self,
        key: &str,
        sort_key: &SortKey,
    ) -> Result<Option<SortKeyCacheResult<V>>, CacheError> {
        let result = self.read(|view| view.lookup_value(key, Bound::Excluded(sort_key)));
        record_lookup("less_than", &result);
        Ok(result)
    }

    async fn get_last(&self, key: &str) -> Result<Option<SortKeyCacheResult<V>>, CacheError> {
        let result = self.read(|view| view.lookup_value(key, Bound::Unbounded));
        record_lookup("last", &result);
        Ok(result)
    }

    async fn get_last_sort_key(&self) -> Result<Option<SortKey>, CacheError> {
        Ok(self.read(|view| {
            view.logical_keys()
                .iter()
                .filter_map(|k| view.lookup(k, Bound::Unbounded).map(|(sk, _)| sk.clone()))
                .max()
        }))
    }

    async fn put(&self, key: &CacheKey, value: V) -> Result<(), CacheError> {
        self.apply(vec![(key.clone(), Some(value))])
    }

    async fn del(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.apply(vec![(key.clone(), None)])
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match &self.tx {
            None => {
                self.committed.write().remove(key);
            }
            Some(tx) => {
                let mut guard = tx.staging.lock();
                let staging = guard.as_mut().ok_or(CacheError::NoOpenTransaction)?;
                staging.entries.remove(key);
                staging.deleted_keys.insert(key.to_string());
            }
        }
        debug!(key, "deleted all versions");
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp<V>>) -> Result<(), CacheError> {
        let count = ops.len();
        let ops = ops
            .into_iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => (key, Some(value)),
                BatchOp::Del { key } => (key, None),
            })
            .collect();
        self.apply(ops)?;
        debug!(ops = count, "applied batch");
        Ok(())
    }

    async fn keys(
        &self,
        sort_key: Option<&SortKey>,
        options: &RangeOptions,
    ) -> Result<Vec<String>, CacheError> {
        Ok(self.ranged(sort_key, options, |k, _| k))
    }

    async fn kv_map(
        &self,
        sort_key: Option<&SortKey>,
        options: &RangeOptions,
    ) -> Result<Vec<(String, V)>, CacheError> {
        Ok(self.ranged(sort_key, options, |k, v| (k, v)))
    }

    async fn all_keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.read(|view| view.logical_keys().into_iter().collect()))
    }

    async fn dump(&self) -> Result<Vec<(CacheKey, Option<V>)>, CacheError> {
        Ok(self.read(|view| {
            let mut merged: BTreeMap<CacheKey, Option<V>> = BTreeMap::new();
            for key in view.logical_keys() {
                let layers = [view.committed_versions(&key), view.staged_versions(&key)];
                for versions in layers.into_iter().flatten() {
                    for (sort_key, value) in versions {
                        merged.insert(CacheKey::new(key.clone(), sort_key.clone()), value.clone());
                    }
                }
            }
            merged.into_iter().collect()
        }))
    }

    /// On a transaction handle only the staged versions are pruned.
    async fn prune(&self, entries_stored: usize) -> Result<PruneStats, CacheError> {
        let mut stats = PruneStats::default();
        match &self.tx {
            None => prune_map(&mut self.committed.write(), entries_stored, &mut stats)?,
            Some(tx) => {
                let mut guard = tx.staging.lock();
                let staging = guard.as_mut().ok_or(CacheError::NoOpenTransaction)?;
                prune_map(&mut staging.entries, entries_stored, &mut stats)?;
            }
        }
        debug!(
            entries_before = stats.entries_before,
            entries_after = stats.entries_after,
            "pruned cache"
        );
        Ok(stats)
    }

    async fn open(&self) -> Result<(), CacheError> {
        debug!("memory cache opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        debug!("memory cache closed");
        Ok(())
    }

    async fn begin(&self) -> Result<Arc<dyn BasicSortKeyCache<V>>, CacheError> {
        if self.tx.is_some() {
            return Err(CacheError::NestedTransaction);
        }
        let guard = Arc::clone(&self.tx_lock).lock_owned().await;
        debug!("transaction started");
        Ok(Arc::new(Self {
            config: self.config.clone(),
            committed: Arc::clone(&self.committed),
            tx_lock: Arc::clone(&self.tx_lock),
            tx: Some(Transaction {
                staging: Mutex::new(Some(Staging::new())),
                guard: Mutex::new(Some(guard)),
            }),
        }))
    }

    async fn commit(&self) -> Result<(), CacheError> {
        let tx = self.tx.as_ref().ok_or(CacheError::NoOpenTransaction)?;
        let staging = tx.staging.lock().take().ok_or(CacheError::NoOpenTransaction)?;
        {
            let mut committed = self.committed.write();
            for key in &staging.deleted_keys {
                committed.remove(key);
            }
            for (key, versions) in staging.entries {
                committed.entry(key).or_default().extend(versions);
            }
        }
        tx.guard.lock().take();
        debug!("transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), CacheError> {
        let tx = self.tx.as_ref().ok_or(CacheError::NoOpenTransaction)?;
        tx.staging.lock().take().ok_or(CacheError::NoOpenTransaction)?;
        tx.guard.lock().take();
        debug!("transaction rolled back");
        Ok(())
    }
}
