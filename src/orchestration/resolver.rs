//! Graph resolution: from a submittable entity to an ordered task set.
//!
//! Edges are mediated by data nodes: a task writing a node precedes
//! every task reading it. Resolution returns a topological order that
//! breaks ties by declaration order, so equal graphs always resolve to
//! the same sequence. The skip engine also lives here: it runs at
//! resolution time, before any job exists.

use crate::core::entity::EntityId;
use crate::core::{DataNodeId, PipelineId, ScenarioId, Task, TaskId};
use crate::error::{Error, Result};
use crate::registry::CoreContext;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A reference to something that can be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submittable {
    Scenario(ScenarioId),
    Pipeline(PipelineId),
    Task(TaskId),
}

impl From<ScenarioId> for Submittable {
    fn from(id: ScenarioId) -> Self {
        Submittable::Scenario(id)
    }
}

impl From<PipelineId> for Submittable {
    fn from(id: PipelineId) -> Self {
        Submittable::Pipeline(id)
    }
}

impl From<TaskId> for Submittable {
    fn from(id: TaskId) -> Self {
        Submittable::Task(id)
    }
}

impl From<&crate::core::Scenario> for Submittable {
    fn from(scenario: &crate::core::Scenario) -> Self {
        Submittable::Scenario(scenario.id)
    }
}

impl From<&crate::core::Pipeline> for Submittable {
    fn from(pipeline: &crate::core::Pipeline) -> Self {
        Submittable::Pipeline(pipeline.id)
    }
}

impl From<&crate::core::Task> for Submittable {
    fn from(task: &crate::core::Task) -> Self {
        Submittable::Task(task.id)
    }
}

impl TryFrom<EntityId> for Submittable {
    type Error = Error;

    /// Cycles, jobs and data nodes are not submittable kinds.
    fn try_from(id: EntityId) -> Result<Self> {
        match id {
            EntityId::Scenario(id) => Ok(Submittable::Scenario(id)),
            EntityId::Pipeline(id) => Ok(Submittable::Pipeline(id)),
            EntityId::Task(id) => Ok(Submittable::Task(id)),
            other => Err(Error::InvalidSubmission(other.to_string())),
        }
    }
}

/// The ordered task set a submission will execute.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Owning scenario when the submittable was one.
    pub scenario_id: Option<ScenarioId>,
    /// Tasks in execution order, deduplicated.
    pub tasks: Vec<Task>,
}

/// Whether the entity kind (and instance) accepts submission. Only
/// scenarios, pipelines and tasks are submittable; cycles, jobs and data
/// nodes never are.
pub fn is_submittable(ctx: &CoreContext, id: EntityId) -> bool {
    match id {
        EntityId::Scenario(_) | EntityId::Pipeline(_) | EntityId::Task(_) => ctx.exists(id),
        EntityId::Cycle(_) | EntityId::Job(_) | EntityId::DataNode(_) => false,
    }
}

/// Resolve a submittable into its ordered, deduplicated task set.
pub fn resolve(ctx: &CoreContext, submittable: &Submittable) -> Result<Resolution> {
    let (scenario_id, task_ids) = match submittable {
        Submittable::Scenario(id) => {
            let scenario = ctx.scenarios.store.get(id)?;
            (Some(*id), scenario.tasks)
        }
        Submittable::Pipeline(id) => {
            let pipeline = ctx.pipelines.store.get(id)?;
            (None, pipeline.tasks)
        }
        Submittable::Task(id) => (None, vec![*id]),
    };

    let mut tasks = Vec::with_capacity(task_ids.len());
    let mut seen = HashSet::new();
    for id in task_ids {
        if seen.insert(id) {
            tasks.push(ctx.tasks.store.get(&id)?);
        }
    }

    let ordered = topological_order(tasks)?;
    debug!(
        tasks = ordered.len(),
        "resolved submittable into ordered task set"
    );
    Ok(Resolution {
        scenario_id,
        tasks: ordered,
    })
}

/// Order tasks so that every producer precedes its consumers, breaking
/// ties by declaration order.
fn topological_order(tasks: Vec<Task>) -> Result<Vec<Task>> {
    // Producer map: data node -> declaration index of the task writing it.
    let mut producers: HashMap<DataNodeId, usize> = HashMap::new();
    for (index, task) in tasks.iter().enumerate() {
        for output in &task.outputs {
            producers.insert(*output, index);
        }
    }

    let mut edges: Vec<(usize, usize)> = Vec::new();
    for (index, task) in tasks.iter().enumerate() {
        for input in &task.inputs {
            if let Some(&producer) = producers.get(input) {
                if producer != index {
                    edges.push((producer, index));
                }
            }
        }
    }

    // Cycle detection on the same edge set.
    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..tasks.len()).map(|i| graph.add_node(i)).collect();
    for &(from, to) in &edges {
        graph.add_edge(nodes[from], nodes[to], ());
    }
    if is_cyclic_directed(&graph) {
        return Err(Error::Validation(
            "task graph contains a dependency cycle".to_string(),
        ));
    }

    // Deterministic Kahn pass: always take the lowest declaration index
    // among the ready tasks.
    let mut indegree = vec![0usize; tasks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for &(from, to) in &edges {
        indegree[to] += 1;
        dependents[from].push(to);
    }

    let mut done = vec![false; tasks.len()];
    let mut order = Vec::with_capacity(tasks.len());
    while order.len() < tasks.len() {
        let next = (0..tasks.len())
            .find(|&i| !done[i] && indegree[i] == 0)
            .expect("acyclic graph always has a ready task");
        done[next] = true;
        for &dependent in &dependents[next] {
            indegree[dependent] -= 1;
        }
        order.push(next);
    }

    let mut by_index: HashMap<usize, Task> = tasks.into_iter().enumerate().collect();
    Ok(order
        .into_iter()
        .filter_map(|i| by_index.remove(&i))
        .collect())
}

/// Whether a task may be omitted from a submission: it must be marked
/// skippable, have at least one output, and every output must hold a
/// still-valid value.
pub fn is_skippable(ctx: &CoreContext, task: &Task) -> bool {
    if !task.skippable || task.outputs.is_empty() {
        return false;
    }
    task.outputs.iter().all(|id| {
        ctx.data_nodes
            .store
            .try_get(id)
            .map(|node| node.is_valid())
            .unwrap_or(false)
    })
}
