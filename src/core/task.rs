//! Task model: a unit of computation between data nodes.
//!
//! Tasks declare ordered input and output data nodes; those references
//! are the edges of the dependency graph. The executable itself is an
//! opaque capability: the core only invokes it with resolved input
//! values and captures outputs or failure.

use crate::core::data_node::DataNodeId;
use crate::core::scope::Scope;
use crate::version::VersionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The executable capability carried by a task.
///
/// Receives the resolved input values in declaration order and returns
/// one value per declared output. A `String` error becomes the job's
/// failure record; it is never raised to the submitter synchronously.
pub type TaskFunction =
    Arc<dyn Fn(&[Value]) -> std::result::Result<Vec<Value>, String> + Send + Sync>;

/// A no-op function used when deserializing exported tasks; the real
/// callable cannot round-trip through JSON.
fn inert_function() -> TaskFunction {
    Arc::new(|_inputs| Ok(Vec::new()))
}

/// A single unit of computation with declared input/output data nodes.
#[derive(Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Id of the configuration this task was materialized from.
    pub config_id: String,
    /// Broadest scope compatible with the task's data nodes.
    pub scope: Scope,
    /// Ordered input data node references.
    pub inputs: Vec<DataNodeId>,
    /// Ordered output data node references.
    pub outputs: Vec<DataNodeId>,
    /// The opaque callable; not serializable, replaced by an inert
    /// function on deserialization.
    #[serde(skip, default = "inert_function")]
    pub function: TaskFunction,
    /// Whether the task may be omitted when its outputs are still valid.
    pub skippable: bool,
    /// Configuration generation this task was created under.
    pub version: VersionId,
}

impl Task {
    /// Create a new task.
    pub fn new(
        config_id: &str,
        function: TaskFunction,
        inputs: Vec<DataNodeId>,
        outputs: Vec<DataNodeId>,
        scope: Scope,
        skippable: bool,
        version: VersionId,
    ) -> Self {
        Self {
            id: TaskId::new(),
            config_id: config_id.to_string(),
            scope,
            inputs,
            outputs,
            function,
            skippable,
            version,
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.config_id == other.config_id
            && self.scope == other.scope
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.skippable == other.skippable
            && self.version == other.version
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("config_id", &self.config_id)
            .field("scope", &self.scope)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("skippable", &self.skippable)
            .finish()
    }
}
