//! Checkables - anything that can be checked for new versions.
//!
//! Resources, resource types and prototypes all share one capability trait so
//! the check scheduler is written once against `&dyn Checkable`.

use crate::id::{PipelineId, ResourceId, ScopeId};
use crate::version::{ResourceConfigScope, VersionContent};
use serde::{Deserialize, Serialize};

/// Which variant a checkable is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckableKind {
    /// A pipeline resource
    Resource,
    /// A pipeline resource type
    ResourceType,
    /// A global prototype
    Prototype,
}

impl CheckableKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckableKind::Resource => "resource",
            CheckableKind::ResourceType => "resource-type",
            CheckableKind::Prototype => "prototype",
        }
    }
}

/// Stable reference to a checkable, used by checks and store lookups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckableRef {
    /// Variant
    pub kind: CheckableKind,
    /// Owning pipeline; `None` for global prototypes
    pub pipeline_id: Option<PipelineId>,
    /// Name within the pipeline (or globally)
    pub name: String,
}

impl std::fmt::Display for CheckableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pipeline_id {
            Some(pipeline) => write!(f, "{} {}/{}", self.kind.as_str(), pipeline, self.name),
            None => write!(f, "{} {}", self.kind.as_str(), self.name),
        }
    }
}

/// Capability shared by every checkable variant.
pub trait Checkable: Send + Sync + std::fmt::Debug {
    /// Variant of this checkable.
    fn kind(&self) -> CheckableKind;

    /// Name within its pipeline (or globally for prototypes).
    fn name(&self) -> &str;

    /// Owning pipeline.
    fn pipeline_id(&self) -> Option<PipelineId>;

    /// Declared type name.
    fn type_name(&self) -> &str;

    /// Source configuration.
    fn source(&self) -> &serde_json::Value;

    /// Raw `check_every` override, e.g. `"30s"` or `"never"`.
    fn check_every(&self) -> Option<&str>;

    /// Scope currently assigned to this checkable.
    fn scope_id(&self) -> Option<&ScopeId>;

    /// Assign the scope.
    fn set_scope_id(&mut self, scope: ScopeId);

    /// Error recorded by the last check.
    fn last_check_error(&self) -> Option<&str>;

    /// Pinned or fixed version, if any.
    fn pinned_version(&self) -> Option<&VersionContent> {
        None
    }

    /// Whether periodic checking is paused.
    fn paused(&self) -> bool {
        false
    }

    /// Stable reference.
    fn reference(&self) -> CheckableRef {
        CheckableRef {
            kind: self.kind(),
            pipeline_id: self.pipeline_id(),
            name: self.name().to_string(),
        }
    }

    /// Scope derived from the current type + source configuration.
    fn config_scope(&self) -> ResourceConfigScope {
        ResourceConfigScope::new(self.type_name(), self.source().clone())
    }
}

/// A pipeline resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique identifier
    pub id: ResourceId,

    /// Owning pipeline
    pub pipeline_id: PipelineId,

    /// Resource name
    pub name: String,

    /// Declared type
    #[serde(rename = "type")]
    pub type_name: String,

    /// Source configuration
    #[serde(default)]
    pub source: serde_json::Value,

    /// Check interval override
    #[serde(default)]
    pub check_every: Option<String>,

    /// Version pinned by an operator; overrides job input constraints
    #[serde(default)]
    pub pinned_version: Option<VersionContent>,

    /// Paused resources are not checked periodically
    #[serde(default)]
    pub paused: bool,

    /// Assigned scope
    #[serde(default)]
    pub scope_id: Option<ScopeId>,

    /// Last check error
    #[serde(default)]
    pub last_check_error: Option<String>,
}

impl Resource {
    /// Create a resource with empty source.
    pub fn new(id: ResourceId, pipeline_id: PipelineId, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id,
            pipeline_id,
            name: name.into(),
            type_name: type_name.into(),
            source: serde_json::Value::Null,
            check_every: None,
            pinned_version: None,
            paused: false,
            scope_id: None,
            last_check_error: None,
        }
    }

    /// Set source configuration.
    pub fn with_source(mut self, source: serde_json::Value) -> Self {
        self.source = source;
        self
    }

    /// Set check interval override.
    pub fn with_check_every(mut self, every: impl Into<String>) -> Self {
        self.check_every = Some(every.into());
        self
    }
}

impl Checkable for Resource {
    fn kind(&self) -> CheckableKind {
        CheckableKind::Resource
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn pipeline_id(&self) -> Option<PipelineId> {
        Some(self.pipeline_id)
    }
    fn type_name(&self) -> &str {
        &self.type_name
    }
    fn source(&self) -> &serde_json::Value {
        &self.source
    }
    fn check_every(&self) -> Option<&str> {
        self.check_every.as_deref()
    }
    fn scope_id(&self) -> Option<&ScopeId> {
        self.scope_id.as_ref()
    }
    fn set_scope_id(&mut self, scope: ScopeId) {
        self.scope_id = Some(scope);
    }
    fn last_check_error(&self) -> Option<&str> {
        self.last_check_error.as_deref()
    }
    fn pinned_version(&self) -> Option<&VersionContent> {
        self.pinned_version.as_ref()
    }
    fn paused(&self) -> bool {
        self.paused
    }
}

/// A pipeline-scoped custom resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceType {
    /// Owning pipeline
    pub pipeline_id: PipelineId,

    /// Type name, referenced by resources' `type`
    pub name: String,

    /// The type this type's image is fetched with
    #[serde(rename = "type")]
    pub type_name: String,

    /// Source configuration
    #[serde(default)]
    pub source: serde_json::Value,

    /// Check interval override
    #[serde(default)]
    pub check_every: Option<String>,

    /// Fixed version; a type with a fixed version is never checked
    #[serde(default)]
    pub version: Option<VersionContent>,

    /// Assigned scope
    #[serde(default)]
    pub scope_id: Option<ScopeId>,

    /// Last check error
    #[serde(default)]
    pub last_check_error: Option<String>,
}

impl ResourceType {
    /// Create a resource type with empty source.
    pub fn new(pipeline_id: PipelineId, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            pipeline_id,
            name: name.into(),
            type_name: type_name.into(),
            source: serde_json::Value::Null,
            check_every: None,
            version: None,
            scope_id: None,
            last_check_error: None,
        }
    }

    /// Set source configuration.
    pub fn with_source(mut self, source: serde_json::Value) -> Self {
        self.source = source;
        self
    }
}

impl Checkable for ResourceType {
    fn kind(&self) -> CheckableKind {
        CheckableKind::ResourceType
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn pipeline_id(&self) -> Option<PipelineId> {
        Some(self.pipeline_id)
    }
    fn type_name(&self) -> &str {
        &self.type_name
    }
    fn source(&self) -> &serde_json::Value {
        &self.source
    }
    fn check_every(&self) -> Option<&str> {
        self.check_every.as_deref()
    }
    fn scope_id(&self) -> Option<&ScopeId> {
        self.scope_id.as_ref()
    }
    fn set_scope_id(&mut self, scope: ScopeId) {
        self.scope_id = Some(scope);
    }
    fn last_check_error(&self) -> Option<&str> {
        self.last_check_error.as_deref()
    }
    fn pinned_version(&self) -> Option<&VersionContent> {
        self.version.as_ref()
    }
}

/// A globally shared type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    /// Prototype name
    pub name: String,

    /// The type this prototype's image is fetched with
    #[serde(rename = "type")]
    pub type_name: String,

    /// Source configuration
    #[serde(default)]
    pub source: serde_json::Value,

    /// Check interval override
    #[serde(default)]
    pub check_every: Option<String>,

    /// Assigned scope
    #[serde(default)]
    pub scope_id: Option<ScopeId>,

    /// Last check error
    #[serde(default)]
    pub last_check_error: Option<String>,
}

impl Prototype {
    /// Create a prototype with empty source.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            source: serde_json::Value::Null,
            check_every: None,
            scope_id: None,
            last_check_error: None,
        }
    }
}

impl Checkable for Prototype {
    fn kind(&self) -> CheckableKind {
        CheckableKind::Prototype
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn pipeline_id(&self) -> Option<PipelineId> {
        None
    }
    fn type_name(&self) -> &str {
        &self.type_name
    }
    fn source(&self) -> &serde_json::Value {
        &self.source
    }
    fn check_every(&self) -> Option<&str> {
        self.check_every.as_deref()
    }
    fn scope_id(&self) -> Option<&ScopeId> {
        self.scope_id.as_ref()
    }
    fn set_scope_id(&mut self, scope: ScopeId) {
        self.scope_id = Some(scope);
    }
    fn last_check_error(&self) -> Option<&str> {
        self.last_check_error.as_deref()
    }
}

/// The custom types visible to one pipeline: its own resource types plus the
/// global prototypes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTypes {
    /// Pipeline resource types
    pub types: Vec<ResourceType>,
    /// Global prototypes
    pub prototypes: Vec<Prototype>,
}

impl ResourceTypes {
    /// Create from parts.
    pub fn new(types: Vec<ResourceType>, prototypes: Vec<Prototype>) -> Self {
        Self { types, prototypes }
    }

    /// Look up a pipeline resource type by name.
    pub fn resource_type(&self, name: &str) -> Option<&ResourceType> {
        self.types.iter().find(|t| t.name == name)
    }

    /// The custom type a checkable's own type refers to, or `None` when its
    /// type is a base type.
    ///
    /// A resource type never depends on itself, so a custom type may shadow a
    /// base type of the same name. Prototypes only resolve to prototypes.
    pub fn parent_of(&self, checkable: &dyn Checkable) -> Option<&dyn Checkable> {
        let wanted = checkable.type_name();
        let is_self = |kind: CheckableKind, name: &str| kind == checkable.kind() && name == checkable.name();

        if checkable.kind() != CheckableKind::Prototype {
            let pipeline = checkable.pipeline_id();
            if let Some(found) = self.types.iter().find(|t| {
                t.name == wanted
                    && Some(t.pipeline_id) == pipeline
                    && !is_self(CheckableKind::ResourceType, &t.name)
            }) {
                return Some(found as &dyn Checkable);
            }
        }

        self.prototypes
            .iter()
            .find(|p| p.name == wanted && !is_self(CheckableKind::Prototype, &p.name))
            .map(|p| p as &dyn Checkable)
    }
}
