//! Cycle manager: deduplicated recurring periods.

use crate::core::{Cycle, CycleId, Frequency};
use crate::error::Result;
use crate::registry::store::EntityStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Stores cycles and deduplicates them by `(frequency, period_start)`.
#[derive(Debug, Default)]
pub struct CycleManager {
    /// The backing directory store.
    pub store: EntityStore<Cycle>,
    periods: RwLock<HashMap<(Frequency, DateTime<Utc>), CycleId>>,
}

impl CycleManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cycle covering the period containing `at`, created on first
    /// use and shared afterwards.
    pub fn get_or_create(&self, frequency: Frequency, at: DateTime<Utc>) -> Result<Cycle> {
        let key = (frequency, frequency.period_start(at));
        if let Some(existing) = self
            .periods
            .read()
            .expect("period map lock poisoned")
            .get(&key)
            .and_then(|id| self.store.try_get(id))
        {
            return Ok(existing);
        }

        let cycle = Cycle::new(frequency, at);
        debug!(name = %cycle.name, id = %cycle.id.short(), "created cycle");
        self.store.set(cycle.clone());
        self.periods
            .write()
            .expect("period map lock poisoned")
            .insert(key, cycle.id);
        Ok(cycle)
    }

    /// Remove a cycle and its period record.
    pub fn delete(&self, id: &CycleId) -> Result<()> {
        self.store.delete(id)?;
        self.periods
            .write()
            .expect("period map lock poisoned")
            .retain(|_, cycle| cycle != id);
        Ok(())
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.store.clear();
        self.periods
            .write()
            .expect("period map lock poisoned")
            .clear();
    }
}
