//! CLI command implementations.

pub mod clear;
pub mod dump;
pub mod sync;
