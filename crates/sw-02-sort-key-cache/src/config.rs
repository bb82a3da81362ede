//! # Cache Configuration

use serde::{Deserialize, Serialize};

/// What to do when a put finds a different value already stored at the
/// exact same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    /// Overwrite, count the conflict and log a warning.
    #[default]
    Tolerate,
    /// Refuse the write with [`crate::CacheError::Conflict`].
    Reject,
}

/// Sort key cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Behaviour on conflicting puts
    pub conflict_policy: ConflictPolicy,
    /// Versions kept per key when `prune` is called without an explicit count
    pub default_prune_keep: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::Tolerate,
            default_prune_keep: 1,
        }
    }
}
