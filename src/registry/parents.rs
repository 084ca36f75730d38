//! Reverse-reference index for parent traversal.
//!
//! `get_parents` must cost O(direct references), not O(all entities), so
//! the directory maintains this index on every materialization instead
//! of scanning stores at query time.

use crate::core::entity::{EntityId, ParentKind};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

type ParentMap = HashMap<ParentKind, HashSet<EntityId>>;

/// Child entity -> direct referrers, grouped by referrer kind.
#[derive(Debug, Default)]
pub struct ParentIndex {
    inner: RwLock<HashMap<EntityId, ParentMap>>,
}

impl ParentIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `parent` directly references `child`.
    pub fn link(&self, child: EntityId, kind: ParentKind, parent: EntityId) {
        self.inner
            .write()
            .expect("parent index lock poisoned")
            .entry(child)
            .or_default()
            .entry(kind)
            .or_default()
            .insert(parent);
    }

    /// Direct referrers of `child`, grouped by kind. Entities with no
    /// recorded referrers yield an empty map.
    pub fn parents_of(&self, child: EntityId) -> HashMap<ParentKind, Vec<EntityId>> {
        self.inner
            .read()
            .expect("parent index lock poisoned")
            .get(&child)
            .map(|groups| {
                groups
                    .iter()
                    .filter(|(_, parents)| !parents.is_empty())
                    .map(|(kind, parents)| (*kind, parents.iter().copied().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every reference made by `parent` (used when the parent is
    /// hard-deleted).
    pub fn unlink_parent(&self, parent: EntityId) {
        let mut index = self.inner.write().expect("parent index lock poisoned");
        for groups in index.values_mut() {
            for parents in groups.values_mut() {
                parents.remove(&parent);
            }
        }
        index.retain(|_, groups| {
            groups.retain(|_, parents| !parents.is_empty());
            !groups.is_empty()
        });
    }

    /// Drop the entry for a deleted child.
    pub fn remove_child(&self, child: EntityId) {
        self.inner
            .write()
            .expect("parent index lock poisoned")
            .remove(&child);
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.inner
            .write()
            .expect("parent index lock poisoned")
            .clear();
    }
}
