//! Build-input version resolution for Ratchet.
//!
//! Given a job's declared inputs and a [`ratchet_core::VersionsDb`]
//! snapshot, picks the newest combination of versions in which inputs that
//! name the same upstream job in `passed` all went through one build of it.
//! Pinned and exact inputs are fixed up front; everything else is found by a
//! bounded backtracking search.

#![warn(missing_docs)]

pub mod error;
pub mod candidates;
pub mod search;
pub mod resolver;
pub mod mapper;

pub use error::{ResolveError, Result};
pub use resolver::{ResolverConfig, VersionResolver};
pub use mapper::{next_inputs_changed, InputMapper, InputMapping};
