//! Pipeline manager: reusable sub-DAGs and their subscribers.

use crate::core::{Job, Pipeline, PipelineId, TaskId};
use crate::error::Result;
use crate::registry::store::EntityStore;
use crate::registry::SubscriptionId;
use crate::version::VersionId;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Callback invoked with `(pipeline, job)` on job state transitions.
pub type PipelineCallback = Arc<dyn Fn(&Pipeline, &Job) + Send + Sync>;

struct PipelineSubscription {
    id: SubscriptionId,
    callback: PipelineCallback,
    pipeline: Option<PipelineId>,
}

/// Materializes and stores pipelines.
#[derive(Default)]
pub struct PipelineManager {
    /// The backing directory store.
    pub store: EntityStore<Pipeline>,
    variants: RwLock<HashMap<(String, Vec<TaskId>), PipelineId>>,
    subscribers: RwLock<Vec<PipelineSubscription>>,
}

impl PipelineManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// The pipeline over exactly these tasks, created on first use. Two
    /// scenarios sharing the same materialized tasks share the pipeline.
    pub fn get_or_create(
        &self,
        config_id: &str,
        tasks: Vec<TaskId>,
        version: VersionId,
    ) -> Result<Pipeline> {
        let key = (config_id.to_string(), tasks.clone());
        if let Some(existing) = self
            .variants
            .read()
            .expect("variant map lock poisoned")
            .get(&key)
            .and_then(|id| self.store.try_get(id))
        {
            return Ok(existing);
        }

        let pipeline = Pipeline::new(config_id, tasks, version);
        debug!(config_id, id = %pipeline.id.short(), "materialized pipeline");
        self.store.set(pipeline.clone());
        self.variants
            .write()
            .expect("variant map lock poisoned")
            .insert(key, pipeline.id);
        Ok(pipeline)
    }

    /// Any pipeline materialized from the given configuration id.
    pub fn get_by_config_id(&self, config_id: &str) -> Option<Pipeline> {
        self.store
            .get_all()
            .into_iter()
            .find(|p| p.config_id == config_id)
    }

    /// Register a callback, optionally filtered to one pipeline.
    pub fn subscribe(
        &self,
        callback: PipelineCallback,
        pipeline: Option<PipelineId>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .push(PipelineSubscription {
                id,
                callback,
                pipeline,
            });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Invoke matching subscribers with `(pipeline, job)`. A panicking
    /// callback is isolated and reported; it never reaches the caller.
    pub fn notify(&self, pipeline: &Pipeline, job: &Job) {
        let callbacks: Vec<PipelineCallback> = self
            .subscribers
            .read()
            .expect("subscriber lock poisoned")
            .iter()
            .filter(|s| s.pipeline.is_none() || s.pipeline == Some(pipeline.id))
            .map(|s| s.callback.clone())
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(pipeline, job))).is_err() {
                warn!(
                    pipeline = %pipeline.id.short(),
                    job = %job.id.short(),
                    "pipeline subscriber panicked; ignoring"
                );
            }
        }
    }

    /// Remove a pipeline and its variant record.
    pub fn delete(&self, id: &PipelineId) -> Result<()> {
        self.store.delete(id)?;
        self.variants
            .write()
            .expect("variant map lock poisoned")
            .retain(|_, pipeline| pipeline != id);
        Ok(())
    }

    /// Remove every pipeline (subscriptions survive).
    pub fn clear(&self) {
        self.store.clear();
        self.variants
            .write()
            .expect("variant map lock poisoned")
            .clear();
    }
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineManager")
            .field("pipelines", &self.store.len())
            .finish()
    }
}
