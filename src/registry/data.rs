//! Data node manager: materialization with scope-based sharing.

use crate::config::DataNodeConfig;
use crate::core::{CycleId, DataNode, DataNodeId, PipelineId, ScenarioId, Scope};
use crate::error::Result;
use crate::registry::store::EntityStore;
use crate::version::VersionId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Which scope instance owns a materialized entity.
///
/// Sharing is keyed on `(config id, owner)`: a global entity exists once,
/// a cycle-scoped one once per cycle, a scenario-scoped one once per
/// scenario. `Pipeline` owners back the standalone pipeline-creation
/// path, which has no scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Global,
    Cycle(CycleId),
    Scenario(ScenarioId),
    Pipeline(PipelineId),
}

impl Owner {
    /// Resolve the owner for an entity of the given scope, falling back
    /// to `fallback` when the scope is narrower than the available
    /// grouping.
    pub fn for_scope(scope: Scope, cycle: Option<CycleId>, fallback: Owner) -> Owner {
        match scope {
            Scope::Global => Owner::Global,
            Scope::Cycle => cycle.map(Owner::Cycle).unwrap_or(fallback),
            Scope::Scenario => fallback,
        }
    }
}

/// Materializes and stores data nodes.
#[derive(Debug, Default)]
pub struct DataManager {
    /// The backing directory store.
    pub store: EntityStore<DataNode>,
    owners: RwLock<HashMap<(String, Owner), DataNodeId>>,
}

impl DataManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize the node for `config` under `owner`, reusing the
    /// existing instance when one was already created for that owner.
    pub fn get_or_create(
        &self,
        config: &DataNodeConfig,
        owner: Owner,
        version: VersionId,
    ) -> Result<DataNode> {
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

        let mut node = DataNode::new(&config.id, config.scope, config.storage, version);
        node.validity = config.validity;
        node.cacheable = config.cacheable;
        node.properties = config.properties.clone();
        if let Some(default) = &config.default_data {
            node.write(default.clone());
        }

        debug!(config_id = %config.id, id = %node.id.short(), "materialized data node");
        self.store.set(node.clone());
        self.owners
            .write()
            .expect("owner map lock poisoned")
            .insert(key, node.id);
        Ok(node)
    }

    /// Write a value through the directory, stamping the edit date.
    pub fn write(&self, id: &DataNodeId, value: Value) -> Result<DataNode> {
        self.store.update(id, |node| node.write(value))
    }

    /// Remove a node and its ownership record.
    pub fn delete(&self, id: &DataNodeId) -> Result<()> {
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
