//! Ports: the client-facing contract API and the capabilities the engine
//! depends on.

pub mod inbound;
pub mod outbound;

pub use inbound::{ReadTarget, SmartWeaveContract};
pub use outbound::{
    ContractHandler, DefinitionLoader, ExecutionContextModifier, ExecutorFactory,
    InteractionsLoader, KvStorageFactory, NetworkInfoProvider, VrfVerifier,
};
