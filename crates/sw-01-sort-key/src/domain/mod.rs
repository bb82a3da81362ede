//! Sort key domain: protocol constants and key generation.

pub mod constants;
pub mod generator;
