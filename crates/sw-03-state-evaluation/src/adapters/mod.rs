//! Adapters layer: in-memory implementations of the outbound ports and the
//! built-in context modifiers.

pub mod definition_cache;
pub mod evolve;
pub mod handler_registry;
pub mod kv_storage;
pub mod ledger;

pub use definition_cache::CacheableDefinitionLoader;
pub use evolve::Evolve;
pub use handler_registry::HandlerRegistry;
pub use kv_storage::InMemoryKvStorageFactory;
pub use ledger::{InMemoryLedger, GENESIS_HEIGHT};
