//! Configuration generations and version-scoped queries.
//!
//! Every entity is tagged with the version that was current when it was
//! created. Versions isolate experiments: queries and cleanup can be
//! scoped to one generation without disturbing the others.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

/// Identifier of one configuration generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub Uuid);

impl VersionId {
    /// Create a new unique version identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for VersionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One configuration generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Unique identifier for this generation.
    pub id: VersionId,
    /// When the generation was opened.
    pub creation_date: DateTime<Utc>,
}

impl Version {
    /// Open a new generation.
    pub fn new() -> Self {
        Self {
            id: VersionId::new(),
            creation_date: Utc::now(),
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new()
    }
}

/// Which generations a query or cleanup applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScope {
    /// The generation currently open.
    Current,
    /// Every generation.
    All,
    /// One explicit generation.
    Only(VersionId),
}

impl VersionScope {
    /// Whether an entity tagged `version` falls inside this scope.
    pub fn matches(&self, version: VersionId, current: VersionId) -> bool {
        match self {
            VersionScope::Current => version == current,
            VersionScope::All => true,
            VersionScope::Only(id) => version == *id,
        }
    }
}

/// Tracks all generations and the current one.
#[derive(Debug)]
pub struct VersionManager {
    inner: RwLock<VersionState>,
}

#[derive(Debug)]
struct VersionState {
    versions: Vec<Version>,
    current: VersionId,
}

impl VersionManager {
    /// Create a manager with one freshly opened generation.
    pub fn new() -> Self {
        let initial = Version::new();
        let current = initial.id;
        Self {
            inner: RwLock::new(VersionState {
                versions: vec![initial],
                current,
            }),
        }
    }

    /// The generation currently open.
    pub fn current(&self) -> VersionId {
        self.inner.read().expect("version lock poisoned").current
    }

    /// All known generations, oldest first.
    pub fn get_all(&self) -> Vec<Version> {
        self.inner
            .read()
            .expect("version lock poisoned")
            .versions
            .clone()
    }

    /// Open a new generation and make it current.
    pub fn open_new(&self) -> VersionId {
        let mut state = self.inner.write().expect("version lock poisoned");
        let version = Version::new();
        let id = version.id;
        state.versions.push(version);
        state.current = id;
        id
    }

    /// Drop one generation's record. The current generation cannot be
    /// removed.
    pub fn remove(&self, id: VersionId) -> bool {
        let mut state = self.inner.write().expect("version lock poisoned");
        if state.current == id {
            return false;
        }
        let before = state.versions.len();
        state.versions.retain(|v| v.id != id);
        state.versions.len() != before
    }

    /// Drop every generation and open a fresh one.
    pub fn reset(&self) -> VersionId {
        let mut state = self.inner.write().expect("version lock poisoned");
        let version = Version::new();
        let id = version.id;
        state.versions = vec![version];
        state.current = id;
        id
    }

    /// Number of known generations.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("version lock poisoned")
            .versions
            .len()
    }

    /// Whether no generation is recorded (never true in practice; a
    /// fresh one is opened on construction and on reset).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::new()
    }
}
