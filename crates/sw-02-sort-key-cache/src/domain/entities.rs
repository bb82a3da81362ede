//! # Cache Entities

use serde::{Deserialize, Serialize};
use shared_types::SortKey;

/// A versioned cache key: logical key (contract id, or KV key) plus the
/// sort key of the version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub key: String,
    pub sort_key: SortKey,
}

impl CacheKey {
    pub fn new(key: impl Into<String>, sort_key: SortKey) -> Self {
        Self {
            key: key.into(),
            sort_key,
        }
    }
}

/// A cached value together with the sort key it was stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKeyCacheResult<V> {
    pub sort_key: SortKey,
    pub cached_value: V,
}

impl<V> SortKeyCacheResult<V> {
    pub fn new(sort_key: SortKey, cached_value: V) -> Self {
        Self {
            sort_key,
            cached_value,
        }
    }
}

/// Range filter over logical keys for `keys` / `kv_map`.
///
/// `gte` is inclusive, `lt` exclusive; results are ascending unless
/// `reverse` is set, and cut to `limit` after ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeOptions {
    pub gte: Option<String>,
    pub lt: Option<String>,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl RangeOptions {
    /// Whether a logical key falls inside `[gte, lt)`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.gte.as_deref().map_or(true, |gte| key >= gte)
            && self.lt.as_deref().map_or(true, |lt| key < lt)
    }
}

/// One operation of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp<V> {
    /// Store a value version.
    Put { key: CacheKey, value: V },
    /// Store a tombstone version.
    Del { key: CacheKey },
}

impl<V> BatchOp<V> {
    /// The versioned key the operation targets.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        match self {
            Self::Put { key, .. } | Self::Del { key } => key,
        }
    }
}

/// Before/after statistics of a prune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneStats {
    pub entries_before: usize,
    pub entries_after: usize,
    pub size_before: u64,
    pub size_after: u64,
}
