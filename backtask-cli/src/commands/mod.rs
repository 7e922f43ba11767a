//! CLI command implementations

pub mod enqueue;
