//! Result of resolving a job's inputs.

use crate::id::{ResourceId, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A version chosen for one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVersion {
    /// Chosen version
    pub version_id: VersionId,
    /// Resource it came from
    pub resource_id: ResourceId,
    /// Check order of the chosen version
    pub check_order: u64,
    /// True if this job never used this version for this input before
    pub first_occurrence: bool,
}

/// Why an input could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum UnresolvedReason {
    /// The input names a resource the pipeline does not have
    UnknownResource {
        /// Resource name
        resource: String,
    },
    /// A `passed` job does not exist in the pipeline
    UnknownJobs {
        /// Job names
        jobs: Vec<String>,
    },
    /// The resource has no enabled versions
    NoVersions,
    /// The pinned or exact version is not an enabled version of the resource
    PinnedVersionNotFound,
    /// No version made it through every `passed` job
    NoVersionsPassed {
        /// Job names
        jobs: Vec<String>,
    },
    /// No candidate agrees with the builds a pinned input fixed
    ConflictsWithPinned,
    /// Candidates exist but no combination is mutually consistent
    NoSatisfyingVersion,
    /// The search gave up before exhausting the candidates
    SearchLimitReached,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnresolvedReason::UnknownResource { resource } => write!(f, "unknown resource '{}'", resource),
            UnresolvedReason::UnknownJobs { jobs } => write!(f, "unknown passed jobs: {}", jobs.join(", ")),
            UnresolvedReason::NoVersions => write!(f, "no versions available"),
            UnresolvedReason::PinnedVersionNotFound => write!(f, "pinned version not found"),
            UnresolvedReason::NoVersionsPassed { jobs } => {
                write!(f, "no versions satisfy passed constraints: {}", jobs.join(", "))
            }
            UnresolvedReason::ConflictsWithPinned => write!(f, "conflicts with pinned version"),
            UnresolvedReason::NoSatisfyingVersion =>write!(f, "no satisfiable combination of versions"),
            UnresolvedReason::SearchLimitReached => write!(f, "search limit reached"),
        }
    }
}

/// Outcome for a single input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputResolution {
    /// A version was chosen
    Resolved(ResolvedVersion),
    /// No version could be chosen
    Unresolved(UnresolvedReason),
}

impl InputResolution {
    /// The chosen version, if any.
    pub fn version(&self) -> Option<&ResolvedVersion> {
        match self {
            InputResolution::Resolved(v) => Some(v),
            InputResolution::Unresolved(_) => None,
        }
    }
}

/// Mapping from input name to its resolution.
///
/// Kept in a `BTreeMap` so equal results serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInputSet {
    /// Per-input outcome
    pub inputs: BTreeMap<String, InputResolution>,
    /// Whether every input resolved consistently
    pub satisfied: bool,
}

impl ResolvedInputSet {
    /// Chosen version for an input.
    pub fn version(&self, input: &str) -> Option<&ResolvedVersion> {
        self.inputs.get(input).and_then(InputResolution::version)
    }

    /// Inputs that failed to resolve.
    pub fn unresolved(&self) -> impl Iterator<Item = (&String, &UnresolvedReason)> {
        self.inputs.iter().filter_map(|(name, r)| match r {
            InputResolution::Unresolved(reason) => Some((name, reason)),
            InputResolution::Resolved(_) => None,
        })
    }

    /// Version ids referenced by the set.
    pub fn version_ids(&self) -> impl Iterator<Item = VersionId> + '_ {
        self.inputs.values().filter_map(|r| r.version().map(|v| v.version_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(id: u64) -> InputResolution {
        InputResolution::Resolved(ResolvedVersion {
            version_id: VersionId(id),
            resource_id: ResourceId(1),
            check_order: id,
            first_occurrence: true,
        })
    }

    #[test]
    fn test_accessors() {
        let mut set = ResolvedInputSet::default();
        set.inputs.insert("a".to_string(), resolved(3));
        set.inputs.insert("b".to_string(), InputResolution::Unresolved(UnresolvedReason::NoVersions));

        assert_eq!(set.version("a").unwrap().version_id, VersionId(3));
        assert!(set.version("b").is_none());
        assert_eq!(set.unresolved().count(), 1);
        assert_eq!(set.version_ids().collect::<Vec<_>>(), vec![VersionId(3)]);
    }

    #[test]
    fn test_serialization_is_stable() {
        let mut a = ResolvedInputSet { satisfied: true, ..Default::default() };
        let mut b = a.clone();
        a.inputs.insert("x".to_string(), resolved(1));
        a.inputs.insert("y".to_string(), resolved(2));
        b.inputs.insert("y".to_string(), resolved(2));
        b.inputs.insert("x".to_string(), resolved(1));

        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_reason_display() {
        let reason = UnresolvedReason::NoVersionsPassed { jobs: vec!["build".to_string()] };
        assert_eq!(reason.to_string(), "no versions satisfy passed constraints: build");
    }
}
