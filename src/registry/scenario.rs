//! Scenario manager: materialization, cycle grouping, primary promotion,
//! tags, comparison and cascading hard delete.

use crate::config::ScenarioConfig;
use crate::core::entity::{EntityId, ParentKind};
use crate::core::{CycleId, DataNodeId, Job, Scenario, ScenarioId, TaskId};
use crate::error::{Error, Result};
use crate::registry::data::Owner;
use crate::registry::store::EntityStore;
use crate::registry::{CoreContext, SubscriptionId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Callback invoked with `(scenario, job)` on job state transitions.
pub type ScenarioCallback = Arc<dyn Fn(&Scenario, &Job) + Send + Sync>;

struct ScenarioSubscription {
    id: SubscriptionId,
    callback: ScenarioCallback,
    scenario: Option<ScenarioId>,
}

/// Comparison of one data node config across two scenarios.
#[derive(Debug, Clone, PartialEq)]
pub struct DataNodeComparison {
    /// The compared data node config id.
    pub config_id: String,
    /// Payload in the first scenario's node.
    pub left: Option<Value>,
    /// Payload in the second scenario's node.
    pub right: Option<Value>,
    /// Whether both payloads are equal.
    pub identical: bool,
}

/// Report produced by `compare`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioComparison {
    /// First compared scenario.
    pub left: ScenarioId,
    /// Second compared scenario.
    pub right: ScenarioId,
    /// Per-config comparisons, sorted by config id.
    pub data_nodes: Vec<DataNodeComparison>,
}

/// Materializes and stores scenarios.
#[derive(Default)]
pub struct ScenarioManager {
    /// The backing directory store.
    pub store: EntityStore<Scenario>,
    subscribers: RwLock<Vec<ScenarioSubscription>>,
}

impl ScenarioManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize a scenario instance from its configuration.
    ///
    /// Creates (or reuses, per scope) the cycle, pipelines, tasks and
    /// data nodes the configuration references, records every direct
    /// reference in the parent index and promotes the scenario to
    /// primary when it opens a fresh cycle.
    pub fn create(
        &self,
        ctx: &CoreContext,
        config: &ScenarioConfig,
        creation_date: Option<DateTime<Utc>>,
        name: Option<&str>,
    ) -> Result<Scenario> {
        let version = ctx.versions.current();
        let creation_date = creation_date.unwrap_or_else(Utc::now);

        let cycle_id = match config.frequency {
            Some(frequency) => Some(ctx.cycles.get_or_create(frequency, creation_date)?.id),
            None => None,
        };

        let mut scenario = Scenario::new(&config.id, creation_date, version);
        scenario.cycle = cycle_id;
        scenario.name = name.map(str::to_string);
        let fallback = Owner::Scenario(scenario.id);

        let mut task_ids: Vec<TaskId> = Vec::new();
        let mut seen = HashSet::new();

        for pipeline_cfg_id in &config.pipelines {
            let pipeline_cfg = ctx.configs.pipeline(pipeline_cfg_id)?;
            let mut pipeline_tasks = Vec::new();
            for task_cfg_id in &pipeline_cfg.tasks {
                let task_cfg = ctx.configs.task(task_cfg_id)?;
                let task = ctx.tasks.get_or_create(
                    &task_cfg,
                    &ctx.configs,
                    &ctx.data_nodes,
                    cycle_id,
                    fallback,
                    version,
                )?;
                pipeline_tasks.push(task.id);
                if seen.insert(task.id) {
                    task_ids.push(task.id);
                }
            }
            let pipeline =
                ctx.pipelines
                    .get_or_create(&pipeline_cfg.id, pipeline_tasks.clone(), version)?;
            ctx.parents.link(
                pipeline.id.into(),
                ParentKind::Scenarios,
                scenario.id.into(),
            );
            for task_id in &pipeline_tasks {
                ctx.parents
                    .link((*task_id).into(), ParentKind::Pipelines, pipeline.id.into());
            }
            scenario.pipelines.push(pipeline.id);
        }

        for task_cfg_id in &config.tasks {
            let task_cfg = ctx.configs.task(task_cfg_id)?;
            let task = ctx.tasks.get_or_create(
                &task_cfg,
                &ctx.configs,
                &ctx.data_nodes,
                cycle_id,
                fallback,
                version,
            )?;
            if seen.insert(task.id) {
                task_ids.push(task.id);
            }
        }

        for dn_cfg_id in &config.additional_data_nodes {
            let dn_cfg = ctx.configs.data_node(dn_cfg_id)?;
            let owner = Owner::for_scope(dn_cfg.scope, cycle_id, fallback);
            let node = ctx.data_nodes.get_or_create(&dn_cfg, owner, version)?;
            ctx.parents
                .link(node.id.into(), ParentKind::Scenarios, scenario.id.into());
            scenario.additional_data_nodes.push(node.id);
        }

        for task_id in &task_ids {
            ctx.parents
                .link((*task_id).into(), ParentKind::Scenarios, scenario.id.into());
            let task = ctx.tasks.store.get(task_id)?;
            for node_id in task.inputs.iter().chain(task.outputs.iter()) {
                ctx.parents
                    .link((*node_id).into(), ParentKind::Tasks, (*task_id).into());
                ctx.parents
                    .link((*node_id).into(), ParentKind::Scenarios, scenario.id.into());
            }
        }
        scenario.tasks = task_ids;

        if let Some(cycle) = cycle_id {
            if self.get_primary(cycle).is_none() {
                scenario.primary = true;
            }
        }

        info!(
            config_id = %config.id,
            id = %scenario.id.short(),
            tasks = scenario.tasks.len(),
            primary = scenario.primary,
            "created scenario"
        );
        self.store.set(scenario.clone());
        Ok(scenario)
    }

    /// Scenarios created from the given configuration id.
    pub fn get_by_config_id(&self, config_id: &str) -> Vec<Scenario> {
        self.store
            .get_all()
            .into_iter()
            .filter(|s| s.config_id == config_id)
            .collect()
    }

    /// Scenarios grouped under the given cycle.
    pub fn get_all_by_cycle(&self, cycle: CycleId) -> Vec<Scenario> {
        self.store
            .get_all()
            .into_iter()
            .filter(|s| s.cycle == Some(cycle))
            .collect()
    }

    /// Scenarios carrying the given tag.
    pub fn get_all_by_tag(&self, tag: &str) -> Vec<Scenario> {
        self.store
            .get_all()
            .into_iter()
            .filter(|s| s.has_tag(tag))
            .collect()
    }

    /// All scenarios grouped by owning cycle; frequency-less scenarios
    /// are grouped under `None`.
    pub fn get_cycles_scenarios(&self) -> HashMap<Option<CycleId>, Vec<Scenario>> {
        let mut groups: HashMap<Option<CycleId>, Vec<Scenario>> = HashMap::new();
        for scenario in self.store.get_all() {
            groups.entry(scenario.cycle).or_default().push(scenario);
        }
        groups
    }

    /// The primary scenario of a cycle, if any.
    pub fn get_primary(&self, cycle: CycleId) -> Option<Scenario> {
        self.store
            .get_all()
            .into_iter()
            .find(|s| s.cycle == Some(cycle) && s.primary)
    }

    /// Every cycle's primary scenario.
    pub fn get_primary_scenarios(&self) -> Vec<Scenario> {
        self.store
            .get_all()
            .into_iter()
            .filter(|s| s.primary)
            .collect()
    }

    /// Promote a scenario to primary, demoting the previous primary of
    /// its cycle.
    pub fn set_primary(&self, id: &ScenarioId) -> Result<Scenario> {
        let scenario = self.store.get(id)?;
        let cycle = scenario.cycle.ok_or_else(|| {
            Error::Validation(format!(
                "scenario {} has no cycle and cannot be primary",
                scenario.id
            ))
        })?;

        if let Some(current) = self.get_primary(cycle) {
            if current.id != *id {
                self.store.update(&current.id, |s| s.primary = false)?;
            }
        }
        self.store.update(id, |s| s.primary = true)
    }

    /// Attach a tag.
    pub fn tag(&self, id: &ScenarioId, tag: &str) -> Result<Scenario> {
        self.store.update(id, |s| {
            s.tags.insert(tag.to_string());
        })
    }

    /// Remove a tag.
    pub fn untag(&self, id: &ScenarioId, tag: &str) -> Result<Scenario> {
        self.store.update(id, |s| {
            s.tags.remove(tag);
        })
    }

    /// Whether hard delete would be accepted: primary scenarios are
    /// protected while their cycle holds other scenarios.
    pub fn is_deletable(&self, id: &ScenarioId) -> bool {
        match self.store.try_get(id) {
            None => false,
            Some(scenario) => match (scenario.primary, scenario.cycle) {
                (true, Some(cycle)) => self.get_all_by_cycle(cycle).len() <= 1,
                _ => true,
            },
        }
    }

    /// Whether the scenario can be promoted to primary: it must exist,
    /// belong to a cycle and not already be primary.
    pub fn is_promotable(&self, id: &ScenarioId) -> bool {
        self.store
            .try_get(id)
            .map(|s| s.cycle.is_some() && !s.primary)
            .unwrap_or(false)
    }

    /// Compare the data nodes of two scenarios created from the same
    /// configuration, optionally restricted to one data node config id.
    pub fn compare(
        &self,
        ctx: &CoreContext,
        left: &ScenarioId,
        right: &ScenarioId,
        data_node_config_id: Option<&str>,
    ) -> Result<ScenarioComparison> {
        let left_scenario = self.store.get(left)?;
        let right_scenario = self.store.get(right)?;
        if left_scenario.config_id != right_scenario.config_id {
            return Err(Error::NonComparable(format!(
                "{} was created from '{}' but {} from '{}'",
                left_scenario.id,
                left_scenario.config_id,
                right_scenario.id,
                right_scenario.config_id
            )));
        }

        let left_nodes = self.data_nodes_by_config(ctx, &left_scenario)?;
        let right_nodes = self.data_nodes_by_config(ctx, &right_scenario)?;

        let mut config_ids: Vec<String> = match data_node_config_id {
            Some(id) => {
                if !left_nodes.contains_key(id) && !right_nodes.contains_key(id) {
                    return Err(Error::NonComparable(format!(
                        "no data node with config id '{id}' in either scenario"
                    )));
                }
                vec![id.to_string()]
            }
            None => {
                let mut ids: Vec<String> = left_nodes
                    .keys()
                    .chain(right_nodes.keys())
                    .cloned()
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                ids.sort();
                ids
            }
        };

        let data_nodes = config_ids
            .drain(..)
            .map(|config_id| {
                let left = left_nodes.get(&config_id).and_then(|n| n.data.clone());
                let right = right_nodes.get(&config_id).and_then(|n| n.data.clone());
                let identical = left == right;
                DataNodeComparison {
                    config_id,
                    left,
                    right,
                    identical,
                }
            })
            .collect();

        Ok(ScenarioComparison {
            left: left_scenario.id,
            right: right_scenario.id,
            data_nodes,
        })
    }

    fn data_nodes_by_config(
        &self,
        ctx: &CoreContext,
        scenario: &Scenario,
    ) -> Result<HashMap<String, crate::core::DataNode>> {
        let mut nodes = HashMap::new();
        for task_id in &scenario.tasks {
            let task = ctx.tasks.store.get(task_id)?;
            for node_id in task.inputs.iter().chain(task.outputs.iter()) {
                let node = ctx.data_nodes.store.get(node_id)?;
                nodes.insert(node.config_id.clone(), node);
            }
        }
        for node_id in &scenario.additional_data_nodes {
            let node = ctx.data_nodes.store.get(node_id)?;
            nodes.insert(node.config_id.clone(), node);
        }
        Ok(nodes)
    }

    /// Hard-delete a scenario and everything it exclusively owns: its
    /// jobs, its unshared tasks and pipelines, the data nodes no task or
    /// scenario references anymore, and its cycle when it was the last
    /// member.
    pub fn hard_delete(&self, ctx: &CoreContext, id: &ScenarioId) -> Result<()> {
        let scenario = self.store.get(id)?;
        if scenario.primary {
            if let Some(cycle) = scenario.cycle {
                if self.get_all_by_cycle(cycle).len() > 1 {
                    return Err(Error::PrimaryScenario(scenario.id.to_string()));
                }
            }
        }

        // Collect owned data nodes before the owning tasks disappear.
        let mut data_nodes: HashSet<DataNodeId> =
            scenario.additional_data_nodes.iter().copied().collect();
        for task_id in &scenario.tasks {
            if let Some(task) = ctx.tasks.store.try_get(task_id) {
                data_nodes.extend(task.inputs.iter().copied());
                data_nodes.extend(task.outputs.iter().copied());
            }
        }

        for job in ctx.jobs.store.get_all() {
            if job.scenario_id == Some(*id) {
                let _ = ctx.jobs.store.delete(&job.id);
            }
        }

        let scenario_ref: EntityId = (*id).into();
        ctx.parents.unlink_parent(scenario_ref);

        for task_id in &scenario.tasks {
            let parents = ctx.parents.parents_of((*task_id).into());
            let shared = parents
                .get(&ParentKind::Scenarios)
                .map(|p| !p.is_empty())
                .unwrap_or(false);
            if shared {
                continue;
            }
            for job in ctx.jobs.store.get_all() {
                if job.task_id == *task_id {
                    let _ = ctx.jobs.store.delete(&job.id);
                }
            }
            ctx.parents.unlink_parent((*task_id).into());
            ctx.parents.remove_child((*task_id).into());
            let _ = ctx.tasks.delete(task_id);
        }

        for pipeline_id in &scenario.pipelines {
            let parents = ctx.parents.parents_of((*pipeline_id).into());
            let shared = parents
                .get(&ParentKind::Scenarios)
                .map(|p| !p.is_empty())
                .unwrap_or(false);
            if shared {
                continue;
            }
            ctx.parents.unlink_parent((*pipeline_id).into());
            ctx.parents.remove_child((*pipeline_id).into());
            let _ = ctx.pipelines.delete(pipeline_id);
        }

        for node_id in data_nodes {
            if ctx.parents.parents_of(node_id.into()).is_empty() {
                ctx.parents.remove_child(node_id.into());
                let _ = ctx.data_nodes.delete(&node_id);
            }
        }

        self.store.delete(id)?;
        ctx.parents.remove_child(scenario_ref);

        if let Some(cycle) = scenario.cycle {
            if self.get_all_by_cycle(cycle).is_empty() {
                let _ = ctx.cycles.delete(&cycle);
            }
        }

        debug!(id = %id.short(), "hard-deleted scenario");
        Ok(())
    }

    /// Register a callback, optionally filtered to one scenario.
    pub fn subscribe(
        &self,
        callback: ScenarioCallback,
        scenario: Option<ScenarioId>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .push(ScenarioSubscription {
                id,
                callback,
                scenario,
            });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Invoke matching subscribers with `(scenario, job)`. A panicking
    /// callback is isolated and reported; it never reaches the caller.
    pub fn notify(&self, scenario: &Scenario, job: &Job) {
        let callbacks: Vec<ScenarioCallback> = self
            .subscribers
            .read()
            .expect("subscriber lock poisoned")
            .iter()
            .filter(|s| s.scenario.is_none() || s.scenario == Some(scenario.id))
            .map(|s| s.callback.clone())
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(scenario, job))).is_err() {
                warn!(
                    scenario = %scenario.id.short(),
                    job = %job.id.short(),
                    "scenario subscriber panicked; ignoring"
                );
            }
        }
    }

    /// Remove every scenario (subscriptions survive).
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl std::fmt::Debug for ScenarioManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioManager")
            .field("scenarios", &self.store.len())
            .finish()
    }
}
