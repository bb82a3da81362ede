//! # SW-01: Sort Key Protocol
//!
//! Canonical total ordering of contract interactions.
//!
//! ## Architecture
//!
//! - **Domain**: protocol constants and sort key generation
//! - **Sorter**: `LexicographicalSorter`, assigning missing keys and ordering records
//!
//! ## Key Layout
//!
//! | Segment | Width | Content |
//! |---------|-------|---------|
//! | height | 12 | block height, zero padded |
//! | bucket | 13 | millisecond bucket (all `9` or all `0`, see [`domain::constants`]) |
//! | hash | 64 | hex SHA-256 of block id bytes followed by tx id bytes |
//!
//! Byte-wise string comparison of two keys is the evaluation order.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod domain;
pub mod sorter;

pub use domain::constants::{
    DEFAULT_BUCKET, LAST_BUCKET, LEGACY_BUCKET_MAX_HEIGHT, SORTING_FIRST, SORTING_LAST,
};
pub use domain::generator::{
    create_sort_key, extract_block_height, generate_last_sort_key, genesis_sort_key,
};
pub use sorter::LexicographicalSorter;
