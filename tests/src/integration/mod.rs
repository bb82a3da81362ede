//! End-to-end scenarios against the in-memory ledger.

mod evaluation;
mod internal_writes;
mod kv_storage;
mod protocol;
