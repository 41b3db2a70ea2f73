//! VersionsDB - point-in-time view of the version/build causality graph.
//!
//! One snapshot is taken atomically at the start of a scheduling pass and every
//! job of the pass is resolved against it. The same structure doubles as the
//! operator-facing debug dump.

use crate::build::{BuildInput, BuildOutput, BuildRerun};
use crate::checkable::Resource;
use crate::job::Job;
use crate::pipeline::Pipeline;
use crate::id::{BuildId, JobId, PipelineId, ResourceId, VersionId};
use crate::version::VersionContent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An enabled version as seen by one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVersion {
    /// Version id
    pub version_id: VersionId,
    /// Resource whose scope owns the version
    pub resource_id: ResourceId,
    /// Check order within the scope
    pub check_order: u64,
    /// Version content, used to match pins
    pub version: VersionContent,
}

/// Read-only snapshot consumed by the version resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionsDb {
    /// Pipeline the snapshot belongs to
    pub pipeline_id: PipelineId,
    /// Enabled versions, per resource
    pub resource_versions: Vec<ResourceVersion>,
    /// Outputs of succeeded builds (explicit and implicit)
    pub build_outputs: Vec<BuildOutput>,
    /// Inputs of all builds
    pub build_inputs: Vec<BuildInput>,
    /// Rerun relationships
    pub build_reruns: Vec<BuildRerun>,
    /// Job name to id
    pub jobs: BTreeMap<String, JobId>,
    /// Resource name to id
    pub resources: BTreeMap<String, ResourceId>,
}

/// Everything one scheduling pass reads, taken at a single point in time.
///
/// Resources carry their pins and jobs carry their cached build inputs, so
/// both have to come from the same read as the versions.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSnapshot {
    /// The pipeline
    pub pipeline: Pipeline,
    /// Version/build graph
    pub versions: VersionsDb,
    /// Resources, by name
    pub resources: Vec<Resource>,
    /// Jobs, by name
    pub jobs: Vec<Job>,
}

impl VersionsDb {
    /// Resource id by name.
    pub fn resource_id(&self, name: &str) -> Option<ResourceId> {
        self.resources.get(name).copied()
    }

    /// Job id by name.
    pub fn job_id(&self, name: &str) -> Option<JobId> {
        self.jobs.get(name).copied()
    }

    /// Versions of a resource, newest first: check order descending, ties
    /// broken by version id descending.
    pub fn versions_of(&self, resource: ResourceId) -> Vec<&ResourceVersion> {
        let mut versions: Vec<&ResourceVersion> = self
            .resource_versions
            .iter()
            .filter(|v| v.resource_id == resource)
            .collect();
        versions.sort_by(|a, b| {
            b.check_order
                .cmp(&a.check_order)
                .then_with(|| b.version_id.cmp(&a.version_id))
        });
        versions
    }

    /// Look up an enabled version of a resource by content.
    pub fn find_version(&self, resource: ResourceId, content: &VersionContent) -> Option<&ResourceVersion> {
        self.resource_versions
            .iter()
            .find(|v| v.resource_id == resource && &v.version == content)
    }

    /// Builds that are reruns of an earlier build.
    pub fn rerun_builds(&self) -> BTreeSet<BuildId> {
        self.build_reruns.iter().map(|r| r.build_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(id: u64, resource: u64, order: u64) -> ResourceVersion {
        ResourceVersion {
            version_id: VersionId(id),
            resource_id: ResourceId(resource),
            check_order: order,
            version: [("v".to_string(), id.to_string())].into(),
        }
    }

    #[test]
    fn test_versions_of_orders_by_check_order_then_id() {
        let db = VersionsDb {
            resource_versions: vec![version(1, 1, 1), version(2, 1, 3), version(3, 1, 3), version(4, 2, 9)],
            ..Default::default()
        };

        let ids: Vec<u64> = db.versions_of(ResourceId(1)).iter().map(|v| v.version_id.0).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_find_version_by_content() {
        let db = VersionsDb {
            resource_versions: vec![version(1, 1, 1), version(2, 1, 2)],
            ..Default::default()
        };
        let wanted: VersionContent = [("v".to_string(), "2".to_string())].into();

        assert_eq!(db.find_version(ResourceId(1), &wanted).unwrap().version_id, VersionId(2));
        assert!(db.find_version(ResourceId(2), &wanted).is_none());
    }

    #[test]
    fn test_debug_dump_field_names() {
        let json = serde_json::to_value(VersionsDb::default()).unwrap();
        for key in ["ResourceVersions", "BuildOutputs", "BuildInputs", "BuildReruns", "Jobs", "Resources"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
