//! # Shared Types Crate
//!
//! Protocol primitives shared by the sort-key, cache and evaluation crates.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary
//!   (sort keys, interaction records, evaluation results) is defined here.
//! - **Immutable records**: an [`InteractionRecord`] is never mutated after
//!   it has been sorted; evaluation only derives new [`EvalStateResult`]s.
//! - **Deterministic serialization**: maps use `BTreeMap` so that two nodes
//!   folding the same history serialize byte-identical results.

pub mod entities;
pub mod errors;
pub mod sort_key;

pub use entities::*;
pub use errors::*;
pub use sort_key::SortKey;
