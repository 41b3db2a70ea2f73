//! Ratchet core data models.
//!
//! This crate defines the entities shared by the check scheduler and the
//! build-input version resolver: checkables and their config scopes, versions
//! ordered by check order, checks, jobs, build history and the point-in-time
//! VersionsDB snapshot used for one resolution pass.

#![warn(missing_docs)]

// Identities and time
mod id;
mod clock;

// Versions and what produces them
mod version;
mod checkable;
mod check;

// Pipelines, jobs and build history
mod pipeline;
mod job;
mod build;
mod versions_db;
mod resolved;

// Re-exports
pub use id::*;
pub use clock::{Clock, SystemClock, FixedClock};

pub use version::{Version, VersionContent, DiscoveredVersion, MetadataField, ResourceConfigScope};
pub use checkable::{
    Checkable, CheckableKind, CheckableRef, Resource, ResourceType, Prototype, ResourceTypes,
};
pub use check::{Check, CheckStatus};

pub use pipeline::Pipeline;
pub use job::{Job, JobInput, VersionConstraint};
pub use build::{BuildStatus, BuildInput, BuildOutput, BuildRerun, BuildRecord};
pub use versions_db::{VersionsDb, ResourceVersion, PipelineSnapshot};
pub use resolved::{ResolvedInputSet, InputResolution, ResolvedVersion, UnresolvedReason};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
