//! Pure domain logic: tags, results, the call stack and evolve signals.

pub mod call_stack;
pub mod evolve;
pub mod inner_writes;
pub mod interaction;
pub mod tags;
