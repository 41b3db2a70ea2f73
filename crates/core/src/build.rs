//! Build history - the edges of the version causality graph.

use crate::id::{BuildId, JobId, ResourceId, VersionId};
use serde::{Deserialize, Serialize};

/// Build status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Created, not yet running
    Pending,
    /// Running
    Started,
    /// Finished successfully
    Succeeded,
    /// Finished with a failing step
    Failed,
    /// Finished with an infrastructure error
    Errored,
    /// Cancelled
    Aborted,
}

impl std::str::FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BuildStatus::Pending),
            "started" => Ok(BuildStatus::Started),
            "succeeded" => Ok(BuildStatus::Succeeded),
            "failed" => Ok(BuildStatus::Failed),
            "errored" => Ok(BuildStatus::Errored),
            "aborted" => Ok(BuildStatus::Aborted),
            other => Err(format!("unknown build status: {}", other)),
        }
    }
}

/// A version used as an input by a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInput {
    /// Build that used the version
    pub build_id: BuildId,
    /// Job of that build
    pub job_id: JobId,
    /// Name of the input that received it
    pub input_name: String,
    /// Resource the version was fetched from
    pub resource_id: ResourceId,
    /// Version used
    pub version_id: VersionId,
    /// Check order of the version at snapshot time
    pub check_order: u64,
}

/// A version produced by a succeeded build, explicitly or as an implicit
/// output of one of its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    /// Build that produced the version
    pub build_id: BuildId,
    /// Job of that build
    pub job_id: JobId,
    /// Resource the version belongs to
    pub resource_id: ResourceId,
    /// Version produced
    pub version_id: VersionId,
    /// Check order of the version at snapshot time
    pub check_order: u64,
}

/// A build that re-ran an earlier build of the same job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRerun {
    /// The rerun build
    pub build_id: BuildId,
    /// The build it re-ran
    pub rerun_of: BuildId,
    /// Job of both builds
    pub job_id: JobId,
}

/// A finished (or running) build as recorded by the build collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Unique identifier
    pub id: BuildId,
    /// Job
    pub job_id: JobId,
    /// Status
    pub status: BuildStatus,
    /// Build this one re-ran, if any
    #[serde(default)]
    pub rerun_of: Option<BuildId>,
    /// Inputs: (input name, resource, version)
    #[serde(default)]
    pub inputs: Vec<(String, ResourceId, VersionId)>,
    /// Explicit outputs: (resource, version)
    #[serde(default)]
    pub outputs: Vec<(ResourceId, VersionId)>,
}

impl BuildRecord {
    /// Versions this build counts as having passed: explicit outputs plus its
    /// inputs, once the build succeeded.
    pub fn passed_versions(&self) -> Vec<(ResourceId, VersionId)> {
        if self.status != BuildStatus::Succeeded {
            return Vec::new();
        }

        let mut passed: Vec<(ResourceId, VersionId)> = self.outputs.clone();
        for (_, resource, version) in &self.inputs {
            if !passed.contains(&(*resource, *version)) {
                passed.push((*resource, *version));
            }
        }
        passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: BuildStatus) -> BuildRecord {
        BuildRecord {
            id: BuildId(1),
            job_id: JobId(1),
            status,
            rerun_of: None,
            inputs: vec![("repo".to_string(), ResourceId(1), VersionId(10))],
            outputs: vec![(ResourceId(2), VersionId(20)), (ResourceId(1), VersionId(10))],
        }
    }

    #[test]
    fn test_passed_versions_include_implicit_outputs() {
        let passed = record(BuildStatus::Succeeded).passed_versions();
        assert_eq!(passed, vec![(ResourceId(2), VersionId(20)), (ResourceId(1), VersionId(10))]);
    }

    #[test]
    fn test_failed_builds_pass_nothing() {
        assert!(record(BuildStatus::Failed).passed_versions().is_empty());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!("Succeeded".parse::<BuildStatus>().unwrap(), BuildStatus::Succeeded);
        assert!("weird".parse::<BuildStatus>().is_err());
    }
}
