//! Ports (hexagonal architecture).

pub mod cache;

pub use cache::BasicSortKeyCache;
