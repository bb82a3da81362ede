//! # State Evaluation
//!
//! Lazy evaluation of contract state: the state of a contract is the fold of
//! its initial state over every interaction addressed to it, in sort key
//! order. Folded states are stored in a sort key cache so that later reads
//! resume from the nearest cached state.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | Interactions applied in sort key order | `session.rs` - sort then filter by bounds |
//! | Cache only holds states after confirmable interactions | `evaluator.rs` - `Frontier` |
//! | A failed interaction leaves the state untouched | `evaluator.rs` - `apply()` |
//! | Internal writes publish only when the writer's interaction is valid | `evaluator.rs` - write set commit |
//! | Nested reads never look past the root read | `session.rs` - `Upper::capped` |
//! | Dry runs and views never persist | `contract.rs` - `run_in_session()` |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - in-memory ledger, handler registry, definition     │
//! │              LRU, KV storage, evolve modifier                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - SmartWeaveContract                        │
//! │  ports/outbound.rs - loaders, ContractHandler, VrfVerifier,    │
//! │                      KvStorageFactory, ExecutionContextModifier │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/   - tags, results, call stack, inner writes, evolve   │
//! │  session / evaluator / interaction_state - the fold engine     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let ledger = Arc::new(InMemoryLedger::new());
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.register(SRC, Arc::new(MyHandler));
//! let engine = SmartWeave::builder()
//!     .ledger(ledger.clone())
//!     .executor_factory(registry)
//!     .build()?;
//! let state = engine.contract(&contract_id).read_state(None).await?;
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod contract;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod frame;
pub mod ports;

mod evaluator;
mod interaction_state;
mod session;

pub use adapters::{CacheableDefinitionLoader, Evolve, HandlerRegistry, InMemoryKvStorageFactory, InMemoryLedger};
pub use cancellation::{cancellation_pair, CancellationHandle, CancellationSignal};
pub use config::{EngineConfig, EvaluationOptions, StackTraceOptions};
pub use context::ExecutionContext;
pub use contract::HandlerBasedContract;
pub use domain::call_stack::{CallStackNode, ContractCallStack, InnerCallType, InteractionCall};
pub use domain::inner_writes::InnerWritesEvaluator;
pub use domain::interaction::{parse_action, HandlerOutput, InteractionResult, ResultKind};
pub use domain::tags::{SmartWeaveTags, TagsParser};
pub use engine::{EngineCore, SmartWeave, SmartWeaveBuilder};
pub use errors::{ErrorKind, EvalError, HandlerError, LoaderError};
pub use frame::{ContractInfo, EvaluationFrame, TransactionInfo};
pub use ports::{
    ContractHandler, DefinitionLoader, ExecutionContextModifier, ExecutorFactory,
    InteractionsLoader, KvStorageFactory, NetworkInfoProvider, ReadTarget, SmartWeaveContract,
    VrfVerifier,
};

/// Everything a contract handler implementation needs.
pub mod prelude {
    pub use crate::domain::interaction::{parse_action, HandlerOutput, InteractionResult};
    pub use crate::errors::HandlerError;
    pub use crate::frame::EvaluationFrame;
    pub use crate::ports::ContractHandler;
    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};
}
