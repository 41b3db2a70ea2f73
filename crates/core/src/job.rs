//! Job model - declared inputs and the per-job resolution cache.

use crate::id::{JobId, PipelineId};
use crate::resolved::ResolvedInputSet;
use crate::version::VersionContent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How an input picks among a resource's versions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionConstraint {
    /// Newest consistent version
    #[default]
    Latest,
    /// Every version in turn, oldest unused first
    Every,
    /// Fixed by a resource-level pin
    Pinned(VersionContent),
    /// Fixed by the job's own configuration
    Exact(VersionContent),
}

impl VersionConstraint {
    /// The fixed version content, for pinned and exact constraints.
    pub fn fixed_version(&self) -> Option<&VersionContent> {
        match self {
            VersionConstraint::Pinned(v) | VersionConstraint::Exact(v) => Some(v),
            VersionConstraint::Latest | VersionConstraint::Every => None,
        }
    }
}

/// One declared input of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInput {
    /// Input name (the `get` name)
    pub name: String,

    /// Source resource name
    pub resource: String,

    /// Version constraint
    #[serde(default, rename = "version")]
    pub constraint: VersionConstraint,

    /// Upstream jobs the version must have passed through
    #[serde(default)]
    pub passed: BTreeSet<String>,

    /// Whether a new version of this input triggers a build
    #[serde(default)]
    pub trigger: bool,
}

impl JobInput {
    /// Input named after its resource, latest version, no constraints.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            resource: name.clone(),
            name,
            constraint: VersionConstraint::Latest,
            passed: BTreeSet::new(),
            trigger: false,
        }
    }

    /// Take versions from a differently named resource.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Require the version to have passed these jobs.
    pub fn with_passed<I, S>(mut self, jobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passed = jobs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the version constraint.
    pub fn with_constraint(mut self, constraint: VersionConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    /// Mark as triggering.
    pub fn triggering(mut self) -> Self {
        self.trigger = true;
        self
    }
}

/// A job and its cached resolution results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier
    pub id: JobId,

    /// Owning pipeline
    pub pipeline_id: PipelineId,

    /// Job name
    pub name: String,

    /// Declared inputs, in plan order
    #[serde(default)]
    pub inputs: Vec<JobInput>,

    /// Last satisfied resolution; `None` when the inputs are unsatisfiable
    #[serde(default)]
    pub next_build_inputs: Option<ResolvedInputSet>,

    /// Last per-input resolution, each input resolved on its own
    #[serde(default)]
    pub independent_build_inputs: Option<ResolvedInputSet>,
}

impl Job {
    /// Create a job with no inputs.
    pub fn new(id: JobId, pipeline_id: PipelineId, name: impl Into<String>) -> Self {
        Self {
            id,
            pipeline_id,
            name: name.into(),
            inputs: Vec::new(),
            next_build_inputs: None,
            independent_build_inputs: None,
        }
    }

    /// Set the declared inputs.
    pub fn with_inputs(mut self, inputs: Vec<JobInput>) -> Self {
        self.inputs = inputs;
        self
    }
}
