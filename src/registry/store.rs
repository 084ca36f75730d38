//! Generic in-memory entity store.
//!
//! One store per entity kind backs the directory. Writers are serialized
//! per kind behind the `RwLock`; reads are concurrent and always observe
//! the latest committed write.

use crate::error::{Error, Result};
use crate::version::VersionId;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

/// An entity with a stable identity and a version tag.
pub trait Keyed {
    type Key: Eq + Hash + Clone + std::fmt::Display + std::fmt::Debug;

    /// The entity's identity.
    fn key(&self) -> Self::Key;

    /// The configuration generation the entity was created under;
    /// `None` for kinds that are not versioned (cycles).
    fn version(&self) -> Option<VersionId>;
}

impl Keyed for crate::core::DataNode {
    type Key = crate::core::DataNodeId;

    fn key(&self) -> Self::Key {
        self.id
    }

    fn version(&self) -> Option<VersionId> {
        Some(self.version)
    }
}

impl Keyed for crate::core::Task {
    type Key = crate::core::TaskId;

    fn key(&self) -> Self::Key {
        self.id
    }

    fn version(&self) -> Option<VersionId> {
        Some(self.version)
    }
}

impl Keyed for crate::core::Pipeline {
    type Key = crate::core::PipelineId;

    fn key(&self) -> Self::Key {
        self.id
    }

    fn version(&self) -> Option<VersionId> {
        Some(self.version)
    }
}

impl Keyed for crate::core::Cycle {
    type Key = crate::core::CycleId;

    fn key(&self) -> Self::Key {
        self.id
    }

    fn version(&self) -> Option<VersionId> {
        None
    }
}

impl Keyed for crate::core::Scenario {
    type Key = crate::core::ScenarioId;

    fn key(&self) -> Self::Key {
        self.id
    }

    fn version(&self) -> Option<VersionId> {
        Some(self.version)
    }
}

impl Keyed for crate::core::Job {
    type Key = crate::core::JobId;

    fn key(&self) -> Self::Key {
        self.id
    }

    fn version(&self) -> Option<VersionId> {
        Some(self.version)
    }
}

/// In-memory store for one entity kind.
#[derive(Debug)]
pub struct EntityStore<E: Keyed> {
    inner: RwLock<HashMap<E::Key, E>>,
}

impl<E: Keyed + Clone> EntityStore<E> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace an entity by its identity.
    pub fn set(&self, entity: E) {
        self.inner
            .write()
            .expect("store lock poisoned")
            .insert(entity.key(), entity);
    }

    /// Fetch an entity, failing with `NotFound` when absent.
    pub fn get(&self, key: &E::Key) -> Result<E> {
        self.try_get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Fetch an entity if present.
    pub fn try_get(&self, key: &E::Key) -> Option<E> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .get(key)
            .cloned()
    }

    /// All live entities of this kind, in no particular order.
    pub fn get_all(&self) -> Vec<E> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Live entities whose version falls inside `scope`. Unversioned
    /// kinds (cycles) always match.
    pub fn get_all_by_version(
        &self,
        scope: crate::version::VersionScope,
        current: VersionId,
    ) -> Vec<E> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .values()
            .filter(|e| {
                e.version()
                    .map(|v| scope.matches(v, current))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Cheap existence probe.
    pub fn exists(&self, key: &E::Key) -> bool {
        self.inner
            .read()
            .expect("store lock poisoned")
            .contains_key(key)
    }

    /// Mutate an entity in place under the write lock and return the
    /// updated copy.
    pub fn update(&self, key: &E::Key, f: impl FnOnce(&mut E)) -> Result<E> {
        let mut map = self.inner.write().expect("store lock poisoned");
        let entity = map
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        f(entity);
        Ok(entity.clone())
    }

    /// Remove an entity, failing with `NotFound` when absent.
    pub fn delete(&self, key: &E::Key) -> Result<()> {
        self.inner
            .write()
            .expect("store lock poisoned")
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Remove every entity whose version is not retained by `keep`.
    pub fn retain(&self, keep: impl Fn(&E) -> bool) {
        self.inner
            .write()
            .expect("store lock poisoned")
            .retain(|_, e| keep(e));
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.inner.write().expect("store lock poisoned").clear();
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.inner.read().expect("store lock poisoned").len()
    }

    /// Whether the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Keyed + Clone> Default for EntityStore<E> {
    fn default() -> Self {
        Self::new()
    }
}
