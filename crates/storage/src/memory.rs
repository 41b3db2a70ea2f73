//! In-memory storage implementation.
//!
//! All state sits behind one `tokio::sync::Mutex`, so every trait method is
//! atomic with respect to the others. That is what makes
//! `create_check_if_absent` a real compare-and-create and what lets
//! `snapshot_pipeline` observe a single point in time.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use ratchet_core::{
    BuildId, BuildInput, BuildOutput, BuildRecord, BuildRerun, Check, CheckId, CheckStatus, Checkable,
    CheckableKind, CheckableRef, DiscoveredVersion, Job, JobId, Pipeline, PipelineId, PipelineSnapshot, Prototype, Resource,
    ResourceConfigScope, ResourceId, ResourceType, ResourceTypes, ResourceVersion, ResolvedInputSet, ScopeId,
    Time, Version, VersionConstraint, VersionContent, VersionId, VersionsDb,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{CheckStore, PipelineStore, Result, StorageError, VersionStore};

/// Serializable contents of a [`MemoryStorage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    /// Last id handed out
    #[serde(default)]
    pub last_id: u64,
    /// Pipelines by id
    #[serde(default)]
    pub pipelines: BTreeMap<PipelineId, Pipeline>,
    /// Resources by id
    #[serde(default)]
    pub resources: BTreeMap<ResourceId, Resource>,
    /// Pipeline resource types
    #[serde(default)]
    pub resource_types: Vec<ResourceType>,
    /// Global prototypes
    #[serde(default)]
    pub prototypes: Vec<Prototype>,
    /// Jobs by id
    #[serde(default)]
    pub jobs: BTreeMap<JobId, Job>,
    /// Resource config scopes by id
    #[serde(default)]
    pub scopes: BTreeMap<ScopeId, ResourceConfigScope>,
    /// Versions by id
    #[serde(default)]
    pub versions: BTreeMap<VersionId, Version>,
    /// Checks by id
    #[serde(default)]
    pub checks: BTreeMap<CheckId, Check>,
    /// Builds by id
    #[serde(default)]
    pub builds: BTreeMap<BuildId, BuildRecord>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn scope_versions(&self, scope: &ScopeId) -> impl Iterator<Item = &Version> + '_ {
        let scope = scope.clone();
        self.versions.values().filter(move |v| v.scope_id == scope)
    }

    fn max_check_order(&self, scope: &ScopeId) -> u64 {
        self.scope_versions(scope).map(|v| v.check_order).max().unwrap_or(0)
    }

    fn enabled_newest_first(&self, scope: &ScopeId) -> Vec<Version> {
        let mut versions: Vec<Version> = self.scope_versions(scope).filter(|v| v.enabled).cloned().collect();
        versions.sort_by(|a, b| b.check_order.cmp(&a.check_order).then_with(|| b.id.cmp(&a.id)));
        versions
    }

    fn resource_type_mut(&mut self, pipeline: Option<PipelineId>, name: &str) -> Option<&mut ResourceType> {
        self.resource_types
            .iter_mut()
            .find(|t| Some(t.pipeline_id) == pipeline && t.name == name)
    }

    fn checkable_mut(&mut self, checkable: &CheckableRef) -> Option<&mut dyn Checkable> {
        match checkable.kind {
            CheckableKind::Resource => self
                .resources
                .values_mut()
                .find(|r| Some(r.pipeline_id) == checkable.pipeline_id && r.name == checkable.name)
                .map(|r| r as &mut dyn Checkable),
            CheckableKind::ResourceType => self
                .resource_type_mut(checkable.pipeline_id, &checkable.name)
                .map(|t| t as &mut dyn Checkable),
            CheckableKind::Prototype => self
                .prototypes
                .iter_mut()
                .find(|p| p.name == checkable.name)
                .map(|p| p as &mut dyn Checkable),
        }
    }

    fn pipeline_jobs(&self, pipeline: PipelineId) -> impl Iterator<Item = &Job> + '_ {
        self.jobs.values().filter(move |j| j.pipeline_id == pipeline)
    }

    fn job_mut(&mut self, id: JobId) -> Result<&mut Job> {
        self.jobs
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("job {}", id)))
    }

    fn check_order_of(&self, version: VersionId) -> Result<u64> {
        self.versions
            .get(&version)
            .map(|v| v.check_order)
            .ok_or_else(|| StorageError::NotFound(format!("version {}", version)))
    }

    fn outputs_of(&self, build: &BuildRecord) -> Result<Vec<BuildOutput>> {
        build
            .passed_versions()
            .into_iter()
            .map(|(resource_id, version_id)| {
                Ok(BuildOutput {
                    build_id: build.id,
                    job_id: build.job_id,
                    resource_id,
                    version_id,
                    check_order: self.check_order_of(version_id)?,
                })
            })
            .collect()
    }

    fn inputs_of(&self, build: &BuildRecord) -> Result<Vec<BuildInput>> {
        build
            .inputs
            .iter()
            .map(|(input_name, resource_id, version_id)| {
                Ok(BuildInput {
                    build_id: build.id,
                    job_id: build.job_id,
                    input_name: input_name.clone(),
                    resource_id: *resource_id,
                    version_id: *version_id,
                    check_order: self.check_order_of(*version_id)?,
                })
            })
            .collect()
    }

    fn versions_db(&self, pipeline: PipelineId) -> Result<VersionsDb> {
        if !self.pipelines.contains_key(&pipeline) {
            return Err(StorageError::NotFound(format!("pipeline {}", pipeline)));
        }

        let mut db = VersionsDb {
            pipeline_id: pipeline,
            ..Default::default()
        };

        for resource in self.resources.values().filter(|r| r.pipeline_id == pipeline) {
            db.resources.insert(resource.name.clone(), resource.id);
            let Some(scope) = &resource.scope_id else {
                continue;
            };
            for version in self.scope_versions(scope).filter(|v| v.enabled) {
                db.resource_versions.push(ResourceVersion {
                    version_id: version.id,
                    resource_id: resource.id,
                    check_order: version.check_order,
                    version: version.content.clone(),
                });
            }
        }

        let job_ids: BTreeSet<JobId> = self.pipeline_jobs(pipeline).map(|j| j.id).collect();
        for job in self.pipeline_jobs(pipeline) {
            db.jobs.insert(job.name.clone(), job.id);
        }

        for build in self.builds.values().filter(|b| job_ids.contains(&b.job_id)) {
            db.build_outputs.extend(self.outputs_of(build)?);
            db.build_inputs.extend(self.inputs_of(build)?);
            if let Some(rerun_of) = build.rerun_of {
                db.build_reruns.push(BuildRerun {
                    build_id: build.id,
                    rerun_of,
                    job_id: build.job_id,
                });
            }
        }

        debug!(
            "Snapshot of pipeline {}: {} versions, {} outputs, {} inputs",
            pipeline,
            db.resource_versions.len(),
            db.build_outputs.len(),
            db.build_inputs.len()
        );
        Ok(db)
    }

    fn sorted_resources(&self, pipeline: PipelineId) -> Vec<Resource> {
        let mut resources: Vec<Resource> = self
            .resources
            .values()
            .filter(|r| r.pipeline_id == pipeline)
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        resources
    }

    fn sorted_jobs(&self, pipeline: PipelineId) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.pipeline_jobs(pipeline).cloned().collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }
}

/// Process-local storage backend.
///
/// Cloning is cheap and clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage from previously exported state.
    pub fn from_state(state: State) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current state.
    pub async fn export_state(&self) -> State {
        self.state.lock().await.clone()
    }

    // === Configuration ===

    /// Find a pipeline by name, creating it if needed.
    pub async fn save_pipeline(&self, name: &str) -> Result<Pipeline> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.pipelines.values().find(|p| p.name == name) {
            return Ok(existing.clone());
        }
        let pipeline = Pipeline {
            id: PipelineId(state.next_id()),
            name: name.to_string(),
            paused: false,
        };
        state.pipelines.insert(pipeline.id, pipeline.clone());
        Ok(pipeline)
    }

    /// Pause or unpause a pipeline.
    pub async fn set_pipeline_paused(&self, pipeline: PipelineId, paused: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let found = state
            .pipelines
            .get_mut(&pipeline)
            .ok_or_else(|| StorageError::NotFound(format!("pipeline {}", pipeline)))?;
        found.paused = paused;
        Ok(())
    }

    /// Create or update a resource, matched by pipeline and name.
    ///
    /// Updating keeps the id, pin, scope and check error; the scope is
    /// reassigned by the next check if type or source changed.
    pub async fn save_resource(&self, resource: Resource) -> Result<Resource> {
        let mut state = self.state.lock().await;
        let existing = state
            .resources
            .values()
            .find(|r| r.pipeline_id == resource.pipeline_id && r.name == resource.name)
            .cloned();

        let saved = match existing {
            Some(old) => Resource {
                id: old.id,
                pinned_version: resource.pinned_version.or(old.pinned_version),
                scope_id: old.scope_id,
                last_check_error: old.last_check_error,
                ..resource
            },
            None => Resource {
                id: ResourceId(state.next_id()),
                ..resource
            },
        };
        state.resources.insert(saved.id, saved.clone());
        Ok(saved)
    }

    /// Create or update a pipeline resource type, matched by pipeline and name.
    pub async fn save_resource_type(&self, resource_type: ResourceType) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.resource_type_mut(Some(resource_type.pipeline_id), &resource_type.name) {
            Some(old) => {
                let scope_id = old.scope_id.take();
                let last_check_error = old.last_check_error.take();
                *old = ResourceType {
                    scope_id,
                    last_check_error,
                    ..resource_type
                };
            }
            None => state.resource_types.push(resource_type),
        }
        Ok(())
    }

    /// Create or update a global prototype, matched by name.
    pub async fn save_prototype(&self, prototype: Prototype) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.prototypes.iter_mut().find(|p| p.name == prototype.name) {
            Some(old) => {
                let scope_id = old.scope_id.take();
                let last_check_error = old.last_check_error.take();
                *old = Prototype {
                    scope_id,
                    last_check_error,
                    ..prototype
                };
            }
            None => state.prototypes.push(prototype),
        }
        Ok(())
    }

    /// Create or update a job, matched by pipeline and name. Resolution
    /// caches of an existing job are kept.
    pub async fn save_job(&self, job: Job) -> Result<Job> {
        let mut state = self.state.lock().await;
        let existing = state
            .pipeline_jobs(job.pipeline_id)
            .find(|j| j.name == job.name)
            .cloned();

        let saved = match existing {
            Some(old) => Job {
                id: old.id,
                next_build_inputs: old.next_build_inputs,
                independent_build_inputs: old.independent_build_inputs,
                ..job
            },
            None => Job {
                id: JobId(state.next_id()),
                ..job
            },
        };
        state.jobs.insert(saved.id, saved.clone());
        Ok(saved)
    }

    /// Pin (or unpin) a resource to a version.
    pub async fn pin_version(&self, resource: ResourceId, version: Option<VersionContent>) -> Result<()> {
        let mut state = self.state.lock().await;
        let found = state
            .resources
            .get_mut(&resource)
            .ok_or_else(|| StorageError::NotFound(format!("resource {}", resource)))?;
        found.pinned_version = version;
        Ok(())
    }

    /// Enable or disable a version.
    pub async fn set_version_enabled(&self, version: VersionId, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let found = state
            .versions
            .get_mut(&version)
            .ok_or_else(|| StorageError::NotFound(format!("version {}", version)))?;
        found.enabled = enabled;
        Ok(())
    }

    // === Build history ===

    /// Record a build. An id of zero asks the store to assign one.
    pub async fn record_build(&self, build: BuildRecord) -> Result<BuildRecord> {
        let mut state = self.state.lock().await;
        if !state.jobs.contains_key(&build.job_id) {
            return Err(StorageError::NotFound(format!("job {}", build.job_id)));
        }
        for version in build.inputs.iter().map(|(_, _, v)| v).chain(build.outputs.iter().map(|(_, v)| v)) {
            if !state.versions.contains_key(version) {
                return Err(StorageError::NotFound(format!("version {}", version)));
            }
        }

        let build = if build.id == BuildId(0) {
            BuildRecord {
                id: BuildId(state.next_id()),
                ..build
            }
        } else if state.builds.contains_key(&build.id) {
            return Err(StorageError::Conflict(format!("build {} already recorded", build.id)));
        } else {
            state.last_id = state.last_id.max(build.id.get());
            build
        };

        debug!("Recorded build {} of job {} ({:?})", build.id, build.job_id, build.status);
        state.builds.insert(build.id, build.clone());
        Ok(build)
    }
}

#[async_trait]
impl VersionStore for MemoryStorage {
    async fn latest_versions(&self, scope: &ScopeId) -> Result<Vec<Version>> {
        Ok(self.state.lock().await.enabled_newest_first(scope))
    }

    async fn candidate_versions(&self, scope: &ScopeId, constraint: &VersionConstraint) -> Result<Vec<Version>> {
        let versions = self.state.lock().await.enabled_newest_first(scope);
        Ok(match constraint.fixed_version() {
            Some(fixed) => versions.into_iter().filter(|v| &v.content == fixed).collect(),
            None => versions,
        })
    }

    async fn record_versions(&self, scope: &ScopeId, versions: &[DiscoveredVersion]) -> Result<Vec<Version>> {
        let mut state = self.state.lock().await;
        if !state.scopes.contains_key(scope) {
            return Err(StorageError::NotFound(format!("scope {}", scope.short())));
        }

        let mut saved = Vec::with_capacity(versions.len());
        for discovered in versions {
            let existing = state
                .scope_versions(scope)
                .find(|v| v.content == discovered.content)
                .map(|v| v.id);

            let id = match existing {
                Some(id) => id,
                None => {
                    let version = Version {
                        id: VersionId(state.next_id()),
                        scope_id: scope.clone(),
                        content: discovered.content.clone(),
                        metadata: discovered.metadata.clone(),
                        check_order: state.max_check_order(scope) + 1,
                        enabled: true,
                        pin_comment: None,
                    };
                    let id = version.id;
                    state.versions.insert(id, version);
                    id
                }
            };
            saved.push(id);
        }

        // The last reported version is the current one; make sure it sorts on top.
        if let Some(&last) = saved.last() {
            let max = state.max_check_order(scope);
            if let Some(version) = state.versions.get_mut(&last) {
                if version.check_order < max {
                    version.check_order = max + 1;
                }
            }
        }

        let mut out = Vec::with_capacity(saved.len());
        for id in saved {
            if let Some(version) = state.versions.get(&id) {
                out.push(version.clone());
            }
        }
        debug!("Recorded {} versions for scope {}", out.len(), scope.short());
        Ok(out)
    }

    async fn build_outputs_for(&self, job: JobId, resource: ResourceId) -> Result<Vec<BuildOutput>> {
        let state = self.state.lock().await;
        let mut outputs = Vec::new();
        for build in state.builds.values().filter(|b| b.job_id == job) {
            outputs.extend(state.outputs_of(build)?.into_iter().filter(|o| o.resource_id == resource));
        }
        Ok(outputs)
    }

    async fn build_inputs_for(&self, job: JobId) -> Result<Vec<BuildInput>> {
        let state = self.state.lock().await;
        let mut inputs = Vec::new();
        for build in state.builds.values().filter(|b| b.job_id == job) {
            inputs.extend(state.inputs_of(build)?);
        }
        Ok(inputs)
    }

    async fn snapshot_versions_db(&self, pipeline: PipelineId) -> Result<VersionsDb> {
        self.state.lock().await.versions_db(pipeline)
    }

    async fn snapshot_pipeline(&self, pipeline: PipelineId) -> Result<PipelineSnapshot> {
        let state = self.state.lock().await;
        let versions = state.versions_db(pipeline)?;
        let record = state
            .pipelines
            .get(&pipeline)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("pipeline {}", pipeline)))?;
        Ok(PipelineSnapshot {
            pipeline: record,
            versions,
            resources: state.sorted_resources(pipeline),
            jobs: state.sorted_jobs(pipeline),
        })
    }
}

#[async_trait]
impl CheckStore for MemoryStorage {
    async fn find_or_create_scope(&self, scope: ResourceConfigScope) -> Result<ResourceConfigScope> {
        let mut state = self.state.lock().await;
        Ok(state.scopes.entry(scope.id.clone()).or_insert(scope).clone())
    }

    async fn set_checkable_scope(&self, checkable: &CheckableRef, scope: &ScopeId) -> Result<()> {
        let mut state = self.state.lock().await;
        let found = state
            .checkable_mut(checkable)
            .ok_or_else(|| StorageError::NotFound(checkable.to_string()))?;
        found.set_scope_id(scope.clone());
        Ok(())
    }

    async fn set_check_error(&self, checkable: &CheckableRef, error: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().await;
        let error = error.map(str::to_string);
        match checkable.kind {
            CheckableKind::Resource => {
                let found = state
                    .resources
                    .values_mut()
                    .find(|r| Some(r.pipeline_id) == checkable.pipeline_id && r.name == checkable.name)
                    .ok_or_else(|| StorageError::NotFound(checkable.to_string()))?;
                found.last_check_error = error;
            }
            CheckableKind::ResourceType => {
                let found = state
                    .resource_type_mut(checkable.pipeline_id, &checkable.name)
                    .ok_or_else(|| StorageError::NotFound(checkable.to_string()))?;
                found.last_check_error = error;
            }
            CheckableKind::Prototype => {
                let found = state
                    .prototypes
                    .iter_mut()
                    .find(|p| p.name == checkable.name)
                    .ok_or_else(|| StorageError::NotFound(checkable.to_string()))?;
                found.last_check_error = error;
            }
        }
        Ok(())
    }

    async fn in_flight_check(&self, scope: &ScopeId) -> Result<Option<Check>> {
        let state = self.state.lock().await;
        Ok(state
            .checks
            .values()
            .find(|c| &c.scope_id == scope && c.is_running())
            .cloned())
    }

    async fn in_flight_checks(&self) -> Result<Vec<Check>> {
        let state = self.state.lock().await;
        Ok(state.checks.values().filter(|c| c.is_running()).cloned().collect())
    }

    async fn create_check_if_absent(&self, check: Check) -> Result<(Check, bool)> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .checks
            .values()
            .find(|c| c.scope_id == check.scope_id && c.is_running())
        {
            return Ok((existing.clone(), false));
        }
        state.checks.insert(check.id, check.clone());
        Ok((check, true))
    }

    async fn finish_check(&self, check: &Check) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .checks
            .get_mut(&check.id)
            .ok_or_else(|| StorageError::NotFound(format!("check {}", check.id)))?;
        if stored.status.is_finished() {
            return Err(StorageError::Conflict(format!("check {} already finished", check.id)));
        }
        *stored = check.clone();
        Ok(())
    }

    async fn load_check(&self, id: CheckId) -> Result<Option<Check>> {
        Ok(self.state.lock().await.checks.get(&id).cloned())
    }

    async fn last_check_end(&self, scope: &ScopeId) -> Result<Option<Time>> {
        let state = self.state.lock().await;
        Ok(state
            .checks
            .values()
            .filter(|c| &c.scope_id == scope && c.status != CheckStatus::Started)
            .filter_map(|c| c.end_time)
            .max())
    }
}

#[async_trait]
impl PipelineStore for MemoryStorage {
    async fn load_pipeline(&self, id: PipelineId) -> Result<Option<Pipeline>> {
        Ok(self.state.lock().await.pipelines.get(&id).cloned())
    }

    async fn find_pipeline(&self, name: &str) -> Result<Option<Pipeline>> {
        let state = self.state.lock().await;
        Ok(state.pipelines.values().find(|p| p.name == name).cloned())
    }

    async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        Ok(self.state.lock().await.pipelines.values().cloned().collect())
    }

    async fn list_resources(&self, pipeline: PipelineId) -> Result<Vec<Resource>> {
        Ok(self.state.lock().await.sorted_resources(pipeline))
    }

    async fn list_resource_types(&self, pipeline: PipelineId) -> Result<ResourceTypes> {
        let state = self.state.lock().await;
        let types = state
            .resource_types
            .iter()
            .filter(|t| t.pipeline_id == pipeline)
            .cloned()
            .collect();
        Ok(ResourceTypes::new(types, state.prototypes.clone()))
    }

    async fn list_jobs(&self, pipeline: PipelineId) -> Result<Vec<Job>> {
        Ok(self.state.lock().await.sorted_jobs(pipeline))
    }

    async fn load_checkable(&self, checkable: &CheckableRef) -> Result<Option<Box<dyn Checkable>>> {
        let state = self.state.lock().await;
        let found: Option<Box<dyn Checkable>> = match checkable.kind {
            CheckableKind::Resource => state
                .resources
                .values()
                .find(|r| Some(r.pipeline_id) == checkable.pipeline_id && r.name == checkable.name)
                .map(|r| Box::new(r.clone()) as Box<dyn Checkable>),
            CheckableKind::ResourceType => state
                .resource_types
                .iter()
                .find(|t| Some(t.pipeline_id) == checkable.pipeline_id && t.name == checkable.name)
                .map(|t| Box::new(t.clone()) as Box<dyn Checkable>),
            CheckableKind::Prototype => state
                .prototypes
                .iter()
                .find(|p| p.name == checkable.name)
                .map(|p| Box::new(p.clone()) as Box<dyn Checkable>),
        };
        Ok(found)
    }

    async fn save_next_build_inputs(&self, job: JobId, inputs: Option<&ResolvedInputSet>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.job_mut(job)?.next_build_inputs = inputs.cloned();
        Ok(())
    }

    async fn save_independent_build_inputs(&self, job: JobId, inputs: &ResolvedInputSet) -> Result<()> {
        let mut state = self.state.lock().await;
        state.job_mut(job)?.independent_build_inputs = Some(inputs.clone());
        Ok(())
    }
}
