//! Storage abstraction and implementations for Ratchet.
//!
//! This crate provides the trait-based store interface the engine consumes,
//! an in-memory reference implementation and a JSON state file used to keep
//! that store between CLI invocations.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_storage;

pub use trait_::{Storage, StorageError, Result, VersionStore, CheckStore, PipelineStore};
pub use memory::{MemoryStorage, State};
pub use json_storage::JsonStateFile;
