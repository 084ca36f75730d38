//! Data node model: typed, scoped data artifacts with a validity window.
//!
//! Data nodes are the vertices that task edges connect through. The core
//! treats the stored value as an opaque JSON payload; concrete storage
//! adapters live outside the orchestration core and only the validity
//! contract matters here.

use crate::core::scope::Scope;
use crate::version::VersionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a data node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataNodeId(pub Uuid);

impl DataNodeId {
    /// Create a new unique data node identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for DataNodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DataNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DataNodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Storage descriptor for a data node.
///
/// The core never touches real storage; the descriptor is carried so that
/// external adapters know which backend owns the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    InMemory,
    Json,
    Csv,
    Sql,
}

impl Default for StorageKind {
    fn default() -> Self {
        Self::InMemory
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::InMemory => write!(f, "in_memory"),
            StorageKind::Json => write!(f, "json"),
            StorageKind::Csv => write!(f, "csv"),
            StorageKind::Sql => write!(f, "sql"),
        }
    }
}

/// A scoped, versioned data artifact with an optional validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataNode {
    /// Unique identifier for this data node.
    pub id: DataNodeId,
    /// Id of the configuration this node was materialized from.
    pub config_id: String,
    /// How widely the node is shared between scenarios.
    pub scope: Scope,
    /// Which storage backend owns the payload.
    pub storage: StorageKind,
    /// Current payload, if the node has ever been written.
    pub data: Option<Value>,
    /// Timestamp of the most recent write.
    pub last_edit_date: Option<DateTime<Utc>>,
    /// How long a written value stays valid. `None` means forever.
    pub validity: Option<Duration>,
    /// Whether a still-valid value allows skipping the producing task.
    pub cacheable: bool,
    /// Free-form properties attached by the configuration.
    pub properties: HashMap<String, Value>,
    /// Configuration generation this node was created under.
    pub version: VersionId,
}

impl DataNode {
    /// Create a new, never-written data node.
    pub fn new(config_id: &str, scope: Scope, storage: StorageKind, version: VersionId) -> Self {
        Self {
            id: DataNodeId::new(),
            config_id: config_id.to_string(),
            scope,
            storage,
            data: None,
            last_edit_date: None,
            validity: None,
            cacheable: false,
            properties: HashMap::new(),
            version,
        }
    }

    /// Store a value and stamp the edit date.
    pub fn write(&mut self, value: Value) {
        self.data = Some(value);
        self.last_edit_date = Some(Utc::now());
    }

    /// Read the current payload, if any.
    pub fn read(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Whether the node has been written at least once.
    pub fn is_written(&self) -> bool {
        self.last_edit_date.is_some()
    }

    /// Whether the cached value is still usable.
    ///
    /// A node is valid iff it has been written and, when a validity window
    /// is set, the last edit is within that window. No window means the
    /// value is valid forever once written.
    pub fn is_valid(&self) -> bool {
        let Some(last_edit) = self.last_edit_date else {
            return false;
        };
        match self.validity {
            None => true,
            Some(window) => {
                let age = Utc::now().signed_duration_since(last_edit);
                match chrono::Duration::from_std(window) {
                    Ok(window) => age <= window,
                    Err(_) => true, // window too large to represent; treat as forever
                }
            }
        }
    }
}
