//! Core configuration, the declarative config boundary and the update guard.
//!
//! `CoreConfig` is the orchestrator's own configuration (execution mode,
//! storage folder, cleanup gate) with a TOML round-trip. The
//! `*Config` structs are the boundary with the external authoring layer:
//! they describe data nodes, tasks, pipelines and scenarios before
//! materialization. `ConfigRegistry` stores declared configs by id and
//! refuses every mutation while `ConfigGuard` is blocked, which is the
//! case whenever a Core service is running.

use crate::core::cycle::Frequency;
use crate::core::data_node::StorageKind;
use crate::core::scope::Scope;
use crate::core::task::TaskFunction;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// How submissions are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum JobExecutionMode {
    /// Execute jobs inline on the submitting task, in dependency order.
    Development,
    /// Execute jobs concurrently on a bounded worker pool.
    Standalone {
        /// Maximum number of concurrently running jobs.
        max_workers: usize,
    },
}

impl Default for JobExecutionMode {
    fn default() -> Self {
        Self::Development
    }
}

fn default_storage_folder() -> PathBuf {
    PathBuf::from(".data")
}

/// Orchestrator-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Execution mode for dispatched jobs.
    #[serde(default)]
    pub mode: JobExecutionMode,
    /// Root folder owned by the core's storage; exports may not target it.
    #[serde(default = "default_storage_folder")]
    pub storage_folder: PathBuf,
    /// Whether `clean_all_entities` is allowed to wipe anything.
    #[serde(default)]
    pub clean_entities_enabled: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            mode: JobExecutionMode::Development,
            storage_folder: default_storage_folder(),
            clean_entities_enabled: false,
        }
    }
}

impl CoreConfig {
    /// Configuration for inline, single-threaded execution.
    pub fn development() -> Self {
        Self::default()
    }

    /// Configuration for concurrent execution with `max_workers` workers.
    pub fn standalone(max_workers: usize) -> Self {
        Self {
            mode: JobExecutionMode::Standalone {
                max_workers: max_workers.max(1),
            },
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file, falling back to defaults
    /// when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "CoreConfig::load");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        Ok(config)
    }

    /// Save configuration as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }
}

/// Blocks configuration mutation while an orchestrator service is live.
///
/// Unblocking is an explicit operation for tooling and tests, never
/// automatic.
#[derive(Debug, Default)]
pub struct ConfigGuard {
    blocked: AtomicBool,
}

impl ConfigGuard {
    /// Create an unblocked guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse further configuration updates.
    pub fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    /// Allow configuration updates again.
    pub fn unblock(&self) {
        self.blocked.store(false, Ordering::SeqCst);
    }

    /// Whether updates are currently refused.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Fail with `ConfigurationUpdateBlocked` when blocked.
    pub fn check(&self) -> Result<()> {
        if self.is_blocked() {
            return Err(Error::ConfigurationUpdateBlocked);
        }
        Ok(())
    }
}

/// Declarative description of a data node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataNodeConfig {
    /// Config id; materialized nodes reference it back.
    pub id: String,
    /// Storage backend descriptor.
    pub storage: StorageKind,
    /// Sharing scope of materialized nodes.
    pub scope: Scope,
    /// Value written to the node on materialization, if any.
    pub default_data: Option<Value>,
    /// Validity window of written values.
    pub validity: Option<Duration>,
    /// Whether a valid value allows skipping the producing task.
    pub cacheable: bool,
    /// Free-form properties copied onto materialized nodes.
    pub properties: HashMap<String, Value>,
}

impl DataNodeConfig {
    /// Describe a data node.
    pub fn new(id: &str, storage: StorageKind, scope: Scope) -> Self {
        Self {
            id: id.to_string(),
            storage,
            scope,
            default_data: None,
            validity: None,
            cacheable: false,
            properties: HashMap::new(),
        }
    }

    /// Write this value on materialization.
    pub fn with_default_data(mut self, value: Value) -> Self {
        self.default_data = Some(value);
        self
    }

    /// Limit how long written values stay valid.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = Some(validity);
        self
    }

    /// Mark values cacheable for the skip engine.
    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }
}

/// Declarative description of a task.
#[derive(Clone)]
pub struct TaskConfig {
    /// Config id; materialized tasks reference it back.
    pub id: String,
    /// The callable executed by jobs of this task.
    pub function: TaskFunction,
    /// Input data node config ids, in order.
    pub inputs: Vec<String>,
    /// Output data node config ids, in order.
    pub outputs: Vec<String>,
    /// Explicit skippable flag; `None` derives it from output
    /// cacheability.
    pub skippable: Option<bool>,
}

impl TaskConfig {
    /// Describe a task around its callable.
    pub fn new(id: &str, function: TaskFunction) -> Self {
        Self {
            id: id.to_string(),
            function,
            inputs: Vec::new(),
            outputs: Vec::new(),
            skippable: None,
        }
    }

    /// Declare the ordered inputs.
    pub fn with_inputs(mut self, inputs: &[&DataNodeConfig]) -> Self {
        self.inputs = inputs.iter().map(|cfg| cfg.id.clone()).collect();
        self
    }

    /// Declare the ordered outputs.
    pub fn with_outputs(mut self, outputs: &[&DataNodeConfig]) -> Self {
        self.outputs = outputs.iter().map(|cfg| cfg.id.clone()).collect();
        self
    }

    /// Force the skippable flag instead of deriving it.
    pub fn skippable(mut self, skippable: bool) -> Self {
        self.skippable = Some(skippable);
        self
    }
}

impl std::fmt::Debug for TaskConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskConfig")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("skippable", &self.skippable)
            .finish()
    }
}

/// Declarative description of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Config id; materialized pipelines reference it back.
    pub id: String,
    /// Task config ids, in declaration order.
    pub tasks: Vec<String>,
}

impl PipelineConfig {
    /// Describe a pipeline.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tasks: Vec::new(),
        }
    }

    /// Declare the ordered tasks.
    pub fn with_tasks(mut self, tasks: &[&TaskConfig]) -> Self {
        self.tasks = tasks.iter().map(|cfg| cfg.id.clone()).collect();
        self
    }
}

/// Declarative description of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Config id; materialized scenarios reference it back.
    pub id: String,
    /// Direct task config ids, in declaration order.
    pub tasks: Vec<String>,
    /// Pipeline config ids, in declaration order.
    pub pipelines: Vec<String>,
    /// Data node config ids owned by the scenario but unused by tasks.
    pub additional_data_nodes: Vec<String>,
    /// Recurrence; `None` keeps scenarios out of any cycle.
    pub frequency: Option<Frequency>,
}

impl ScenarioConfig {
    /// Describe a scenario.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tasks: Vec::new(),
            pipelines: Vec::new(),
            additional_data_nodes: Vec::new(),
            frequency: None,
        }
    }

    /// Declare the ordered direct tasks.
    pub fn with_tasks(mut self, tasks: &[&TaskConfig]) -> Self {
        self.tasks = tasks.iter().map(|cfg| cfg.id.clone()).collect();
        self
    }

    /// Declare the ordered pipelines.
    pub fn with_pipelines(mut self, pipelines: &[&PipelineConfig]) -> Self {
        self.pipelines = pipelines.iter().map(|cfg| cfg.id.clone()).collect();
        self
    }

    /// Declare additional data nodes.
    pub fn with_additional_data_nodes(mut self, nodes: &[&DataNodeConfig]) -> Self {
        self.additional_data_nodes = nodes.iter().map(|cfg| cfg.id.clone()).collect();
        self
    }

    /// Group instances into cycles of this frequency.
    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }
}

/// Declared configurations by id, guarded against mid-run mutation.
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    guard: ConfigGuard,
    data_nodes: RwLock<HashMap<String, DataNodeConfig>>,
    tasks: RwLock<HashMap<String, TaskConfig>>,
    pipelines: RwLock<HashMap<String, PipelineConfig>>,
    scenarios: RwLock<HashMap<String, ScenarioConfig>>,
}

impl ConfigRegistry {
    /// Create an empty, unblocked registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The guard protecting this registry.
    pub fn guard(&self) -> &ConfigGuard {
        &self.guard
    }

    /// Declare (or redeclare) a data node configuration.
    pub fn configure_data_node(&self, config: DataNodeConfig) -> Result<DataNodeConfig> {
        self.guard.check()?;
        self.data_nodes
            .write()
            .expect("config lock poisoned")
            .insert(config.id.clone(), config.clone());
        Ok(config)
    }

    /// Declare (or redeclare) a task configuration.
    pub fn configure_task(&self, config: TaskConfig) -> Result<TaskConfig> {
        self.guard.check()?;
        self.tasks
            .write()
            .expect("config lock poisoned")
            .insert(config.id.clone(), config.clone());
        Ok(config)
    }

    /// Declare (or redeclare) a pipeline configuration.
    pub fn configure_pipeline(&self, config: PipelineConfig) -> Result<PipelineConfig> {
        self.guard.check()?;
        self.pipelines
            .write()
            .expect("config lock poisoned")
            .insert(config.id.clone(), config.clone());
        Ok(config)
    }

    /// Declare (or redeclare) a scenario configuration.
    pub fn configure_scenario(&self, config: ScenarioConfig) -> Result<ScenarioConfig> {
        self.guard.check()?;
        self.scenarios
            .write()
            .expect("config lock poisoned")
            .insert(config.id.clone(), config.clone());
        Ok(config)
    }

    /// Look up a declared data node configuration.
    pub fn data_node(&self, id: &str) -> Result<DataNodeConfig> {
        self.data_nodes
            .read()
            .expect("config lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NonExistingConfig(id.to_string()))
    }

    /// Look up a declared task configuration.
    pub fn task(&self, id: &str) -> Result<TaskConfig> {
        self.tasks
            .read()
            .expect("config lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NonExistingConfig(id.to_string()))
    }

    /// Look up a declared pipeline configuration.
    pub fn pipeline(&self, id: &str) -> Result<PipelineConfig> {
        self.pipelines
            .read()
            .expect("config lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NonExistingConfig(id.to_string()))
    }

    /// Look up a declared scenario configuration.
    pub fn scenario(&self, id: &str) -> Result<ScenarioConfig> {
        self.scenarios
            .read()
            .expect("config lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NonExistingConfig(id.to_string()))
    }
}
