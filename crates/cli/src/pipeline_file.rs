//! Pipeline definition files.
//!
//! ```yaml
//! name: main
//! resource_types:
//!   - name: slack
//!     type: registry-image
//!     source: { repository: example/slack-resource }
//! resources:
//!   - name: repo
//!     type: git
//!     source: { uri: https://example.com/repo.git }
//!     check_every: 5m
//! jobs:
//!   - name: unit
//!     plan:
//!       - get: repo
//!         trigger: true
//!   - name: deploy
//!     plan:
//!       - get: repo
//!         passed: [unit]
//!         version: every
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ratchet_core::{
    Job, JobId, JobInput, Pipeline, Resource, ResourceId, ResourceType, VersionConstraint, VersionContent,
};
use ratchet_storage::MemoryStorage;
use serde::Deserialize;

/// A pipeline as written by an operator.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineFile {
    /// Pipeline name
    pub name: String,
    /// Custom resource types
    #[serde(default)]
    pub resource_types: Vec<TypeConfig>,
    /// Resources
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    /// Jobs
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// A `resource_types` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeConfig {
    /// Type name
    pub name: String,
    /// The type providing this type
    #[serde(rename = "type")]
    pub type_name: String,
    /// Source configuration
    #[serde(default)]
    pub source: serde_json::Value,
    /// Check interval
    pub check_every: Option<String>,
    /// Fixed version; a type with one is never checked
    pub version: Option<VersionContent>,
}

/// A `resources` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    /// Resource name
    pub name: String,
    /// Type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Source configuration
    #[serde(default)]
    pub source: serde_json::Value,
    /// Check interval
    pub check_every: Option<String>,
}

/// A `jobs` entry. Only `get` steps matter for scheduling.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Job name
    pub name: String,
    /// Get steps
    #[serde(default)]
    pub plan: Vec<GetStep>,
}

/// One `get` step.
#[derive(Debug, Clone, Deserialize)]
pub struct GetStep {
    /// Input name
    pub get: String,
    /// Resource, when it differs from the input name
    pub resource: Option<String>,
    /// Upstream jobs
    #[serde(default)]
    pub passed: BTreeSet<String>,
    /// Whether new versions trigger the job
    #[serde(default)]
    pub trigger: bool,
    /// `latest`, `every` or an exact version
    pub version: Option<StepVersion>,
}

/// The `version` of a get step.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StepVersion {
    /// `latest` or `every`
    Keyword(String),
    /// A specific version
    Exact(VersionContent),
}

impl GetStep {
    fn constraint(&self) -> Result<VersionConstraint> {
        Ok(match &self.version {
            None => VersionConstraint::Latest,
            Some(StepVersion::Exact(version)) => VersionConstraint::Exact(version.clone()),
            Some(StepVersion::Keyword(k)) if k == "latest" => VersionConstraint::Latest,
            Some(StepVersion::Keyword(k)) if k == "every" => VersionConstraint::Every,
            Some(StepVersion::Keyword(k)) => bail!("get {}: unknown version '{}'", self.get, k),
        })
    }

    fn to_input(&self) -> Result<JobInput> {
        let mut input = JobInput::new(&self.get)
            .with_passed(self.passed.iter().cloned())
            .with_constraint(self.constraint()?);
        if let Some(resource) = &self.resource {
            input = input.with_resource(resource);
        }
        input.trigger = self.trigger;
        Ok(input)
    }
}

/// What an import saved.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    /// The pipeline
    pub pipeline: Pipeline,
    /// Resource types saved
    pub resource_types: usize,
    /// Resources saved
    pub resources: usize,
    /// Jobs saved
    pub jobs: usize,
}

impl PipelineFile {
    /// Parse YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("parsing pipeline")
    }

    /// Read a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    /// Reject references to resources or jobs the file does not define.
    pub fn validate(&self) -> Result<()> {
        let resources: BTreeSet<&str> = self.resources.iter().map(|r| r.name.as_str()).collect();
        let jobs: BTreeSet<&str> = self.jobs.iter().map(|j| j.name.as_str()).collect();

        for job in &self.jobs {
            for step in &job.plan {
                let resource = step.resource.as_deref().unwrap_or(&step.get);
                if !resources.contains(resource) {
                    bail!("job {}: unknown resource '{}'", job.name, resource);
                }
                if let Some(missing) = step.passed.iter().find(|p| !jobs.contains(p.as_str())) {
                    bail!("job {}: passed names unknown job '{}'", job.name, missing);
                }
                step.constraint()?;
            }
        }
        Ok(())
    }

    /// Save everything into the store. Existing entries with the same names
    /// are updated in place.
    pub async fn import(&self, store: &MemoryStorage) -> Result<ImportSummary> {
        self.validate()?;
        let pipeline = store.save_pipeline(&self.name).await?;

        for config in &self.resource_types {
            let mut resource_type =
                ResourceType::new(pipeline.id, &config.name, &config.type_name).with_source(config.source.clone());
            resource_type.check_every = config.check_every.clone();
            resource_type.version = config.version.clone();
            store.save_resource_type(resource_type).await?;
        }

        for config in &self.resources {
            let mut resource = Resource::new(ResourceId(0), pipeline.id, &config.name, &config.type_name)
                .with_source(config.source.clone());
            resource.check_every = config.check_every.clone();
            store.save_resource(resource).await?;
        }

        for config in &self.jobs {
            let inputs = config.plan.iter().map(GetStep::to_input).collect::<Result<Vec<_>>>()?;
            store
                .save_job(Job::new(JobId(0), pipeline.id, &config.name).with_inputs(inputs))
                .await?;
        }

        Ok(ImportSummary {
            pipeline,
            resource_types: self.resource_types.len(),
            resources: self.resources.len(),
            jobs: self.jobs.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratchet_storage::PipelineStore;

    const PIPELINE: &str = r#"
name: main
resource_types:
  - name: slack
    type: registry-image
    source: { repository: example/slack }
    version: { tag: "1.2" }
resources:
  - name: repo
    type: git
    source: { uri: "https://example.com/repo.git" }
    check_every: 5m
  - name: notify
    type: slack
jobs:
  - name: unit
    plan:
      - get: repo
        trigger: true
  - name: deploy
    plan:
      - get: code
        resource: repo
        passed: [unit]
        version: every
      - get: notify
        version: { ref: abc }
"#;

    #[tokio::test]
    async fn test_import_saves_pipeline() {
        let store = MemoryStorage::new();
        let file = PipelineFile::from_yaml(PIPELINE).unwrap();

        let summary = file.import(&store).await.unwrap();
        assert_eq!((summary.resource_types, summary.resources, summary.jobs), (1, 2, 2));

        let pipeline = summary.pipeline.id;
        let types = store.list_resource_types(pipeline).await.unwrap();
        assert_eq!(types.types[0].version.as_ref().map(|v| v["tag"].as_str()), Some("1.2"));

        let resources = store.list_resources(pipeline).await.unwrap();
        let repo = resources.iter().find(|r| r.name == "repo").unwrap();
        assert_eq!(repo.check_every.as_deref(), Some("5m"));

        let jobs = store.list_jobs(pipeline).await.unwrap();
        let deploy = &jobs[0];
        assert_eq!(deploy.name, "deploy");
        assert_eq!(deploy.inputs[0].resource, "repo");
        assert_eq!(deploy.inputs[0].constraint, VersionConstraint::Every);
        assert!(deploy.inputs[0].passed.contains("unit"));
        assert!(matches!(deploy.inputs[1].constraint, VersionConstraint::Exact(_)));
        assert!(jobs[1].inputs[0].trigger);
    }

    #[tokio::test]
    async fn test_reimport_updates_in_place() {
        let store = MemoryStorage::new();
        let file = PipelineFile::from_yaml(PIPELINE).unwrap();
        let first = file.import(&store).await.unwrap();
        let second = file.import(&store).await.unwrap();

        assert_eq!(first.pipeline.id, second.pipeline.id);
        assert_eq!(store.list_jobs(first.pipeline.id).await.unwrap().len(), 2);
    }

    #[test]
    fn test_validation_errors() {
        let unknown_resource = PipelineFile::from_yaml("name: p\njobs:\n  - name: j\n    plan:\n      - get: nope\n").unwrap();
        assert!(unknown_resource.validate().is_err());

        let unknown_job = PipelineFile::from_yaml(
            "name: p\nresources:\n  - name: r\n    type: git\njobs:\n  - name: j\n    plan:\n      - get: r\n        passed: [ghost]\n",
        )
        .unwrap();
        assert!(unknown_job.validate().is_err());

        let bad_version = PipelineFile::from_yaml(
            "name: p\nresources:\n  - name: r\n    type: git\njobs:\n  - name: j\n    plan:\n      - get: r\n        version: oldest\n",
        )
        .unwrap();
        assert!(bad_version.validate().is_err());
    }
}
