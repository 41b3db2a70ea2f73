//! Check scheduling for Ratchet.
//!
//! Decides when a resource, resource type or prototype gets a new check,
//! keeps at most one check per resource config scope in flight and records
//! what finished checks discovered.

#![warn(missing_docs)]

pub mod error;
pub mod interval;
pub mod resolver;
pub mod scheduler;
pub mod completion;

pub use error::{CheckError, Result};
pub use interval::{parse_check_every, parse_duration, CheckEvery, DurationError};
pub use resolver::CheckableResolver;
pub use scheduler::{CheckOutcome, CheckRequest, CheckScheduler, SkipReason};
pub use completion::{CheckReport, CheckReporter};
