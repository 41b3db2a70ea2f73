//! Storage trait abstraction.
//!
//! The engine only ever talks to storage through these traits. They are split
//! by concern so that components can ask for exactly the part they read.

use async_trait::async_trait;
use ratchet_core::{
    BuildInput, BuildOutput, Check, CheckId, Checkable, CheckableRef, DiscoveredVersion, Job, JobId,
    Pipeline, PipelineId, PipelineSnapshot, Resource, ResourceConfigScope, ResourceId, ResourceTypes, ResolvedInputSet,
    ScopeId, Time, Version, VersionConstraint, VersionsDb,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected because it contradicts stored state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Versions and the build history that links them.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Enabled versions of a scope, newest first.
    async fn latest_versions(&self, scope: &ScopeId) -> Result<Vec<Version>>;

    /// Enabled versions of a scope matching a constraint, newest first.
    async fn candidate_versions(&self, scope: &ScopeId, constraint: &VersionConstraint) -> Result<Vec<Version>>;

    /// Save versions reported by a check, oldest first. Returns the stored
    /// versions in the order given.
    async fn record_versions(&self, scope: &ScopeId, versions: &[DiscoveredVersion]) -> Result<Vec<Version>>;

    /// Outputs (explicit and implicit) of a job's succeeded builds for one resource.
    async fn build_outputs_for(&self, job: JobId, resource: ResourceId) -> Result<Vec<BuildOutput>>;

    /// Inputs of every build of a job.
    async fn build_inputs_for(&self, job: JobId) -> Result<Vec<BuildInput>>;

    /// Consistent point-in-time view of a pipeline's version/build graph.
    async fn snapshot_versions_db(&self, pipeline: PipelineId) -> Result<VersionsDb>;

    /// The VersionsDB together with the pipeline, its resources and its jobs,
    /// all read at the same instant.
    async fn snapshot_pipeline(&self, pipeline: PipelineId) -> Result<PipelineSnapshot>;
}

/// Checks and the scopes they run against.
#[async_trait]
pub trait CheckStore: Send + Sync {
    /// Return the stored scope with this id, creating it if needed.
    async fn find_or_create_scope(&self, scope: ResourceConfigScope) -> Result<ResourceConfigScope>;

    /// Point a checkable at a scope.
    async fn set_checkable_scope(&self, checkable: &CheckableRef, scope: &ScopeId) -> Result<()>;

    /// Record (or clear) a checkable's last check error.
    async fn set_check_error(&self, checkable: &CheckableRef, error: Option<&str>) -> Result<()>;

    /// The Started check of a scope, if one exists.
    async fn in_flight_check(&self, scope: &ScopeId) -> Result<Option<Check>>;

    /// All Started checks.
    async fn in_flight_checks(&self) -> Result<Vec<Check>>;

    /// Insert `check` unless its scope already has a Started check.
    ///
    /// Returns the check that is in flight afterwards and whether it is the
    /// one passed in. This is the only way checks are created, which keeps at
    /// most one check per scope in flight.
    async fn create_check_if_absent(&self, check: Check) -> Result<(Check, bool)>;

    /// Persist a terminated check.
    async fn finish_check(&self, check: &Check) -> Result<()>;

    /// Load a check by id.
    async fn load_check(&self, id: CheckId) -> Result<Option<Check>>;

    /// When the newest finished check of a scope ended.
    async fn last_check_end(&self, scope: &ScopeId) -> Result<Option<Time>>;
}

/// Pipeline configuration and per-job resolution caches.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Load a pipeline by id.
    async fn load_pipeline(&self, id: PipelineId) -> Result<Option<Pipeline>>;

    /// Find a pipeline by name.
    async fn find_pipeline(&self, name: &str) -> Result<Option<Pipeline>>;

    /// List all pipelines.
    async fn list_pipelines(&self) -> Result<Vec<Pipeline>>;

    /// Resources of a pipeline, by name.
    async fn list_resources(&self, pipeline: PipelineId) -> Result<Vec<Resource>>;

    /// Resource types of a pipeline plus the global prototypes.
    async fn list_resource_types(&self, pipeline: PipelineId) -> Result<ResourceTypes>;

    /// Jobs of a pipeline, by name.
    async fn list_jobs(&self, pipeline: PipelineId) -> Result<Vec<Job>>;

    /// Load any checkable variant by reference.
    async fn load_checkable(&self, checkable: &CheckableRef) -> Result<Option<Box<dyn Checkable>>>;

    /// Replace a job's next-build-inputs cache. `None` clears it.
    async fn save_next_build_inputs(&self, job: JobId, inputs: Option<&ResolvedInputSet>) -> Result<()>;

    /// Replace a job's independent-build-inputs cache.
    async fn save_independent_build_inputs(&self, job: JobId, inputs: &ResolvedInputSet) -> Result<()>;
}

/// Everything the engine needs from one backend.
pub trait Storage: VersionStore + CheckStore + PipelineStore {}

impl<T: VersionStore + CheckStore + PipelineStore> Storage for T {}
