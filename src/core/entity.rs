//! Kind-polymorphic entity references for the directory facade.

use crate::core::cycle::{Cycle, CycleId};
use crate::core::data_node::{DataNode, DataNodeId};
use crate::core::job::{Job, JobId};
use crate::core::pipeline::{Pipeline, PipelineId};
use crate::core::scenario::{Scenario, ScenarioId};
use crate::core::task::{Task, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of any entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum EntityId {
    DataNode(DataNodeId),
    Task(TaskId),
    Pipeline(PipelineId),
    Scenario(ScenarioId),
    Cycle(CycleId),
    Job(JobId),
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::DataNode(id) => write!(f, "data_node:{id}"),
            EntityId::Task(id) => write!(f, "task:{id}"),
            EntityId::Pipeline(id) => write!(f, "pipeline:{id}"),
            EntityId::Scenario(id) => write!(f, "scenario:{id}"),
            EntityId::Cycle(id) => write!(f, "cycle:{id}"),
            EntityId::Job(id) => write!(f, "job:{id}"),
        }
    }
}

impl From<DataNodeId> for EntityId {
    fn from(id: DataNodeId) -> Self {
        EntityId::DataNode(id)
    }
}

impl From<TaskId> for EntityId {
    fn from(id: TaskId) -> Self {
        EntityId::Task(id)
    }
}

impl From<PipelineId> for EntityId {
    fn from(id: PipelineId) -> Self {
        EntityId::Pipeline(id)
    }
}

impl From<ScenarioId> for EntityId {
    fn from(id: ScenarioId) -> Self {
        EntityId::Scenario(id)
    }
}

impl From<CycleId> for EntityId {
    fn from(id: CycleId) -> Self {
        EntityId::Cycle(id)
    }
}

impl From<JobId> for EntityId {
    fn from(id: JobId) -> Self {
        EntityId::Job(id)
    }
}

/// Any entity, by value.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    DataNode(DataNode),
    Task(Task),
    Pipeline(Pipeline),
    Scenario(Scenario),
    Cycle(Cycle),
    Job(Job),
}

impl Entity {
    /// The entity's kind-tagged identifier.
    pub fn id(&self) -> EntityId {
        match self {
            Entity::DataNode(e) => e.id.into(),
            Entity::Task(e) => e.id.into(),
            Entity::Pipeline(e) => e.id.into(),
            Entity::Scenario(e) => e.id.into(),
            Entity::Cycle(e) => e.id.into(),
            Entity::Job(e) => e.id.into(),
        }
    }
}

/// Kind of a direct referrer returned by `get_parents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    Tasks,
    Pipelines,
    Scenarios,
}

impl std::fmt::Display for ParentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParentKind::Tasks => write!(f, "tasks"),
            ParentKind::Pipelines => write!(f, "pipelines"),
            ParentKind::Scenarios => write!(f, "scenarios"),
        }
    }
}

/// Direct referrers of an entity, grouped by referrer kind.
pub type Parents = HashMap<ParentKind, Vec<Entity>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_from_typed_ids() {
        let id = ScenarioId::new();
        let entity_id: EntityId = id.into();
        assert_eq!(entity_id, EntityId::Scenario(id));
    }

    #[test]
    fn test_entity_id_display_carries_kind() {
        let id = TaskId::new();
        let display = format!("{}", EntityId::Task(id));
        assert!(display.starts_with("task:"));
        assert!(display.contains(&id.to_string()));
    }

    #[test]
    fn test_parent_kind_display() {
        assert_eq!(format!("{}", ParentKind::Tasks), "tasks");
        assert_eq!(format!("{}", ParentKind::Scenarios), "scenarios");
    }

    #[test]
    fn test_entity_id_serialization_is_tagged() {
        let id = CycleId::new();
        let json = serde_json::to_string(&EntityId::Cycle(id)).unwrap();
        assert!(json.contains("cycle"));
        let parsed: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EntityId::Cycle(id));
    }
}
