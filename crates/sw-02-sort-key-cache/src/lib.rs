//! # Sort Key Cache
//!
//! Versioned storage of contract states and contract KV data.
//!
//! Every value is stored under a `(key, sort key)` pair. Reads ask for the
//! latest version at or below a sort key, which is what lets evaluation
//! resume from the nearest cached state instead of replaying from genesis.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐   BasicSortKeyCache<V>   ┌──────────────────────┐
//! │ state evaluation   │ ───────────────────────▶ │ MemorySortKeyCache<V>│
//! └────────────────────┘                          └──────────────────────┘
//! ```
//!
//! ## Transactions
//!
//! `begin` takes an exclusive async lock, so at most one transaction is
//! open per cache, and hands back a transaction handle. Writes through the
//! handle are visible only through that handle until `commit`; other users
//! of the cache keep reading and writing committed data.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::MemorySortKeyCache;
pub use config::{CacheConfig, ConflictPolicy};
pub use domain::entities::{BatchOp, CacheKey, PruneStats, RangeOptions, SortKeyCacheResult};
pub use domain::errors::CacheError;
pub use ports::BasicSortKeyCache;
