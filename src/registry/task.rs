//! Task manager: materialization from config with scope-based sharing.

use crate::config::{ConfigRegistry, TaskConfig};
use crate::core::{CycleId, DataNodeId, Scope, Task, TaskId};
use crate::error::Result;
use crate::registry::data::{DataManager, Owner};
use crate::registry::store::EntityStore;
use crate::version::VersionId;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Materializes and stores tasks.
#[derive(Debug, Default)]
pub struct TaskManager {
    /// The backing directory store.
    pub store: EntityStore<Task>,
    owners: RwLock<HashMap<(String, Owner), TaskId>>,
}

impl TaskManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize the task for `config`, reusing the instance already
    /// created for the resolved owner when there is one.
    ///
    /// The task's scope is the minimum (narrowest) scope among its data
    /// nodes, which is the broadest sharing compatible with all of them.
    /// Input and output nodes are materialized through `data` as a side
    /// effect.
    pub fn get_or_create(
        &self,
        config: &TaskConfig,
        configs: &ConfigRegistry,
        data: &DataManager,
        cycle: Option<CycleId>,
        fallback: Owner,
        version: VersionId,
    ) -> Result<Task> {
        let input_configs = config
            .inputs
            .iter()
            .map(|id| configs.data_node(id))
            .collect::<Result<Vec<_>>>()?;
        let output_configs = config
            .outputs
            .iter()
            .map(|id| configs.data_node(id))
            .collect::<Result<Vec<_>>>()?;

        let scope = input_configs
            .iter()
            .chain(output_configs.iter())
            .map(|cfg| cfg.scope)
            .min()
            .unwrap_or(Scope::Scenario);

        let owner = Owner::for_scope(scope, cycle, fallback);
        let key = (config.id.clone(), owner);
        if let Some(existing) = self
            .owners
            .read()
            .expect("owner map lock poisoned")
            .get(&key)
            .and_then(|id| self.store.try_get(id))
        {
            return Ok(existing);
        }

        let materialize = |cfgs: &[crate::config::DataNodeConfig]| -> Result<Vec<DataNodeId>> {
            cfgs.iter()
                .map(|cfg| {
                    let owner = Owner::for_scope(cfg.scope, cycle, fallback);
                    data.get_or_create(cfg, owner, version).map(|node| node.id)
                })
                .collect()
        };
        let inputs = materialize(&input_configs)?;
        let outputs = materialize(&output_configs)?;

        let skippable = config
            .skippable
            .unwrap_or(!output_configs.is_empty() && output_configs.iter().all(|c| c.cacheable));

        let task = Task::new(
            &config.id,
            config.function.clone(),
            inputs,
            outputs,
            scope,
            skippable,
            version,
        );
        debug!(config_id = %config.id, id = %task.id.short(), %scope, "materialized task");
        self.store.set(task.clone());
        self.owners
            .write()
            .expect("owner map lock poisoned")
            .insert(key, task.id);
        Ok(task)
    }

    /// Remove a task and its ownership record.
    pub fn delete(&self, id: &TaskId) -> Result<()> {
        self.store.delete(id)?;
        self.owners
            .write()
            .expect("owner map lock poisoned")
            .retain(|_, owned| owned != id);
        Ok(())
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.store.clear();
        self.owners.write().expect("owner map lock poisoned").clear();
    }
}
