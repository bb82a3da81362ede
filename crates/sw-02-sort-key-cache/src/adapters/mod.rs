//! Cache adapters.

pub mod memory;

pub use memory::MemorySortKeyCache;
