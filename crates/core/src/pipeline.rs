//! Pipeline model.

use crate::id::PipelineId;
use serde::{Deserialize, Serialize};

/// A pipeline groups resources, resource types and jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Unique identifier
    pub id: PipelineId,

    /// Pipeline name
    pub name: String,

    /// Paused pipelines are neither checked nor scheduled periodically
    #[serde(default)]
    pub paused: bool,
}
