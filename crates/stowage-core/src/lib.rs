//! Stowage Core
//!
//! Utilities shared by the Stowage crates: logging setup, the hash map
//! alias and optional profiling scopes.

pub mod alloc;
pub mod logging;
pub mod profiling;
