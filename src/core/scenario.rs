//! Scenario model: a time- and version-scoped instance of a task graph.

use crate::core::cycle::CycleId;
use crate::core::data_node::DataNodeId;
use crate::core::pipeline::PipelineId;
use crate::core::task::TaskId;
use crate::version::VersionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Unique identifier for a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub Uuid);

impl ScenarioId {
    /// Create a new unique scenario identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ScenarioId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A complete task graph instance, optionally grouped into a cycle.
///
/// A scenario owns its tasks (directly, or through pipelines) together
/// with "additional" data nodes not reachable from any task. At most one
/// scenario per cycle is primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique identifier for this scenario.
    pub id: ScenarioId,
    /// Id of the configuration this scenario was materialized from.
    pub config_id: String,
    /// All owned tasks in declaration order (direct and pipeline tasks,
    /// deduplicated).
    pub tasks: Vec<TaskId>,
    /// Pipelines materialized for this scenario.
    pub pipelines: Vec<PipelineId>,
    /// Data nodes owned by the scenario but not used by any task.
    pub additional_data_nodes: Vec<DataNodeId>,
    /// When the scenario instance was created.
    pub creation_date: DateTime<Utc>,
    /// Owning cycle; `None` for frequency-less scenarios.
    pub cycle: Option<CycleId>,
    /// Whether this is the primary scenario of its cycle.
    pub primary: bool,
    /// Free-form labels.
    pub tags: HashSet<String>,
    /// Optional display name.
    pub name: Option<String>,
    /// Free-form properties attached by the configuration.
    pub properties: HashMap<String, Value>,
    /// Configuration generation this scenario was created under.
    pub version: VersionId,
}

impl Scenario {
    /// Create a new scenario instance.
    pub fn new(config_id: &str, creation_date: DateTime<Utc>, version: VersionId) -> Self {
        Self {
            id: ScenarioId::new(),
            config_id: config_id.to_string(),
            tasks: Vec::new(),
            pipelines: Vec::new(),
            additional_data_nodes: Vec::new(),
            creation_date,
            cycle: None,
            primary: false,
            tags: HashSet::new(),
            name: None,
            properties: HashMap::new(),
            version,
        }
    }

    /// Whether the scenario carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
