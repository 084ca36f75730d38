//! Pipeline model: a named, reusable sub-DAG of tasks.

use crate::core::task::TaskId;
use crate::version::VersionId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(pub Uuid);

impl PipelineId {
    /// Create a new unique pipeline identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PipelineId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// An ordered set of tasks forming one sub-DAG, reusable across scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Unique identifier for this pipeline.
    pub id: PipelineId,
    /// Id of the configuration this pipeline was materialized from.
    pub config_id: String,
    /// Tasks in declaration order.
    pub tasks: Vec<TaskId>,
    /// Configuration generation this pipeline was created under.
    pub version: VersionId,
}

impl Pipeline {
    /// Create a new pipeline over the given tasks.
    pub fn new(config_id: &str, tasks: Vec<TaskId>, version: VersionId) -> Self {
        Self {
            id: PipelineId::new(),
            config_id: config_id.to_string(),
            tasks,
            version,
        }
    }
}
