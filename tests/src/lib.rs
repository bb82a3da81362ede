//! # SmartWeave Test Suite
//!
//! Unified test crate: a native test contract plus end-to-end scenarios.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Test contract and in-memory world
//! └── integration/      # End-to-end evaluation scenarios
//!     ├── evaluation.rs      # caching, determinism, dry runs
//!     ├── internal_writes.rs # writes, allow-lists, call depth, cycles
//!     ├── evolve.rs          # source swaps
//!     ├── kv_storage.rs      # per-contract KV
//!     └── protocol.rs        # VRF, confirmation, cancellation, timeouts
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sw-tests
//! cargo test -p sw-tests integration::internal_writes::
//!
//! # Benchmarks
//! cargo bench -p sw-tests
//! ```

pub mod fixtures;
pub mod integration;
