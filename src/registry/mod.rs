//! Entity directory: per-kind managers behind one orchestration context.
//!
//! `CoreContext` replaces process-global manager singletons: it owns one
//! manager per entity kind, the reverse-reference parent index, the
//! version manager and the config registry. Components receive it by
//! reference and tests construct a fresh context instead of resetting
//! global state.

pub mod cycle;
pub mod data;
pub mod job;
pub mod parents;
pub mod pipeline;
pub mod scenario;
pub mod store;
pub mod task;

pub use cycle::CycleManager;
pub use data::{DataManager, Owner};
pub use job::JobManager;
pub use parents::ParentIndex;
pub use pipeline::{PipelineCallback, PipelineManager};
pub use scenario::{
    DataNodeComparison, ScenarioCallback, ScenarioComparison, ScenarioManager,
};
pub use store::{EntityStore, Keyed};
pub use task::TaskManager;

use crate::config::{ConfigRegistry, CoreConfig};
use crate::core::entity::{Entity, EntityId, Parents};
use crate::error::{Error, Result};
use crate::version::VersionManager;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Handle identifying one subscription, returned by `subscribe` and
/// consumed by `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Create a new unique subscription identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-fatal conditions surfaced to the caller without failing the
/// operation that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A submission was recorded with no running Core service.
    ServiceNotRunning,
    /// A deprecated compatibility entry point was used.
    Deprecated,
}

/// One recorded warning.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreWarning {
    /// What happened.
    pub kind: WarningKind,
    /// Human-readable message.
    pub message: String,
}

/// The orchestration context: every directory, index and registry the
/// components share.
#[derive(Debug)]
pub struct CoreContext {
    core_config: RwLock<CoreConfig>,
    /// Declared entity configurations and their update guard.
    pub configs: ConfigRegistry,
    /// Configuration generations.
    pub versions: VersionManager,
    /// Data node directory.
    pub data_nodes: DataManager,
    /// Task directory.
    pub tasks: TaskManager,
    /// Pipeline directory.
    pub pipelines: PipelineManager,
    /// Scenario directory.
    pub scenarios: ScenarioManager,
    /// Cycle directory.
    pub cycles: CycleManager,
    /// Job directory.
    pub jobs: JobManager,
    /// Reverse-reference index backing `get_parents`.
    pub parents: ParentIndex,
    warnings: Mutex<Vec<CoreWarning>>,
}

impl CoreContext {
    /// Create a fresh context around the given core configuration.
    pub fn new(core_config: CoreConfig) -> Self {
        Self {
            core_config: RwLock::new(core_config),
            configs: ConfigRegistry::new(),
            versions: VersionManager::new(),
            data_nodes: DataManager::new(),
            tasks: TaskManager::new(),
            pipelines: PipelineManager::new(),
            scenarios: ScenarioManager::new(),
            cycles: CycleManager::new(),
            jobs: JobManager::new(),
            parents: ParentIndex::new(),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the core configuration.
    pub fn core_config(&self) -> CoreConfig {
        self.core_config
            .read()
            .expect("core config lock poisoned")
            .clone()
    }

    /// Mutate the core configuration. Refused while the config guard is
    /// blocked, like any other configuration update.
    pub fn update_core_config(&self, f: impl FnOnce(&mut CoreConfig)) -> Result<()> {
        self.configs.guard().check()?;
        f(&mut self.core_config.write().expect("core config lock poisoned"));
        Ok(())
    }

    /// Record a warning for the caller to drain.
    pub fn push_warning(&self, kind: WarningKind, message: &str) {
        self.warnings
            .lock()
            .expect("warning queue lock poisoned")
            .push(CoreWarning {
                kind,
                message: message.to_string(),
            });
    }

    /// Take every recorded warning, oldest first.
    pub fn drain_warnings(&self) -> Vec<CoreWarning> {
        std::mem::take(
            &mut *self
                .warnings
                .lock()
                .expect("warning queue lock poisoned"),
        )
    }

    /// Fetch any entity by its kind-tagged id.
    pub fn get(&self, id: EntityId) -> Result<Entity> {
        match id {
            EntityId::DataNode(id) => self.data_nodes.store.get(&id).map(Entity::DataNode),
            EntityId::Task(id) => self.tasks.store.get(&id).map(Entity::Task),
            EntityId::Pipeline(id) => self.pipelines.store.get(&id).map(Entity::Pipeline),
            EntityId::Scenario(id) => self.scenarios.store.get(&id).map(Entity::Scenario),
            EntityId::Cycle(id) => self.cycles.store.get(&id).map(Entity::Cycle),
            EntityId::Job(id) => self.jobs.store.get(&id).map(Entity::Job),
        }
    }

    /// Cheap existence probe for any entity kind.
    pub fn exists(&self, id: EntityId) -> bool {
        match id {
            EntityId::DataNode(id) => self.data_nodes.store.exists(&id),
            EntityId::Task(id) => self.tasks.store.exists(&id),
            EntityId::Pipeline(id) => self.pipelines.store.exists(&id),
            EntityId::Scenario(id) => self.scenarios.store.exists(&id),
            EntityId::Cycle(id) => self.cycles.store.exists(&id),
            EntityId::Job(id) => self.jobs.store.exists(&id),
        }
    }

    /// Hard-delete any entity, cascading per kind.
    ///
    /// Scenarios cascade to everything they exclusively own; cycles
    /// cascade to their scenarios; data nodes still referenced by a task
    /// or scenario are protected.
    pub fn delete(&self, id: EntityId) -> Result<()> {
        match id {
            EntityId::Scenario(id) => self.scenarios.hard_delete(self, &id),
            EntityId::Cycle(id) => self.hard_delete_cycle(&id),
            EntityId::Pipeline(id) => {
                self.pipelines.delete(&id)?;
                self.parents.unlink_parent(EntityId::Pipeline(id));
                self.parents.remove_child(EntityId::Pipeline(id));
                Ok(())
            }
            EntityId::Task(id) => {
                self.tasks.delete(&id)?;
                for job in self.jobs.store.get_all() {
                    if job.task_id == id {
                        let _ = self.jobs.store.delete(&job.id);
                    }
                }
                self.parents.unlink_parent(EntityId::Task(id));
                self.parents.remove_child(EntityId::Task(id));
                Ok(())
            }
            EntityId::DataNode(id) => {
                if !self.parents.parents_of(EntityId::DataNode(id)).is_empty() {
                    return Err(Error::DataNodeInUse(id.to_string()));
                }
                self.data_nodes.delete(&id)?;
                self.parents.remove_child(EntityId::DataNode(id));
                Ok(())
            }
            EntityId::Job(id) => self.jobs.delete(&id, false),
        }
    }

    fn hard_delete_cycle(&self, id: &crate::core::CycleId) -> Result<()> {
        // Existence check first so an unknown id still reports NotFound.
        self.cycles.store.get(id)?;
        for scenario in self.scenarios.get_all_by_cycle(*id) {
            // Primary protection does not apply when the whole cycle goes.
            let _ = self
                .scenarios
                .store
                .update(&scenario.id, |s| s.primary = false);
            self.scenarios.hard_delete(self, &scenario.id)?;
        }
        // The last scenario's deletion removes the cycle; tolerate both.
        if self.cycles.store.exists(id) {
            self.cycles.delete(id)?;
        }
        Ok(())
    }

    /// Direct referrers of an entity, grouped by kind and resolved to
    /// entities. Scenario, cycle and job entities have no modeled
    /// parents and yield an empty mapping.
    pub fn get_parents(&self, id: EntityId) -> Parents {
        let mut parents = Parents::new();
        for (kind, ids) in self.parents.parents_of(id) {
            let entities: Vec<Entity> = ids
                .into_iter()
                .filter_map(|parent| self.get(parent).ok())
                .collect();
            if !entities.is_empty() {
                parents.insert(kind, entities);
            }
        }
        parents
    }

    /// Wipe every entity of every version.
    ///
    /// Gated by `clean_entities_enabled`: when the flag is off this is a
    /// warning-level no-op returning `false`. When on, all stores, the
    /// parent index and all old versions are removed and a fresh
    /// generation is opened.
    pub fn clean_all_entities(&self) -> bool {
        if !self.core_config().clean_entities_enabled {
            warn!("clean_all_entities called but clean_entities_enabled is false; ignoring");
            return false;
        }

        self.jobs.delete_all();
        self.scenarios.clear();
        self.pipelines.clear();
        self.tasks.clear();
        self.data_nodes.clear();
        self.cycles.clear();
        self.parents.clear();
        self.versions.reset();
        info!("cleaned all entities across all versions");
        true
    }

    /// Wipe the entities of a single configuration generation.
    pub fn clean_entities_of_version(&self, version: crate::version::VersionId) -> bool {
        if !self.core_config().clean_entities_enabled {
            warn!("clean_entities_of_version called but clean_entities_enabled is false; ignoring");
            return false;
        }

        self.jobs.store.retain(|j| j.version != version);
        self.scenarios.store.retain(|s| s.version != version);
        self.pipelines.store.retain(|p| p.version != version);
        self.tasks.store.retain(|t| t.version != version);
        self.data_nodes.store.retain(|d| d.version != version);
        self.versions.remove(version);
        info!(version = %version.short(), "cleaned entities of one version");
        true
    }
}

impl Default for CoreContext {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}
