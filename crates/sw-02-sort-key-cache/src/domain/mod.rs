//! Cache domain: keys, results, range options and errors.

pub mod entities;
pub mod errors;
