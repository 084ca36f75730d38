//! Core domain models for the orchestration graph.
//!
//! This module contains the fundamental data structures: data nodes,
//! tasks, pipelines, scenarios, cycles and jobs, plus the polymorphic
//! entity references the directory facade works with.

pub mod cycle;
pub mod data_node;
pub mod entity;
pub mod job;
pub mod pipeline;
pub mod scenario;
pub mod scope;
pub mod task;

pub use cycle::{Cycle, CycleId, Frequency};
pub use data_node::{DataNode, DataNodeId, StorageKind};
pub use entity::{Entity, EntityId, ParentKind, Parents};
pub use job::{Job, JobId, JobStatus, SubmitId};
pub use pipeline::{Pipeline, PipelineId};
pub use scenario::{Scenario, ScenarioId};
pub use scope::Scope;
pub use task::{Task, TaskFunction, TaskId};
