//! Job manager: execution history bookkeeping.

use crate::core::{Job, JobId, ScenarioId, SubmitId, Task, TaskId};
use crate::error::{Error, Result};
use crate::registry::store::EntityStore;
use crate::version::VersionId;
use tracing::debug;

/// Stores jobs and answers history queries. State transitions are the
/// dispatcher's business; the manager only creates and deletes records.
#[derive(Debug, Default)]
pub struct JobManager {
    /// The backing directory store.
    pub store: EntityStore<Job>,
}

impl JobManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new job for one task of a submission.
    pub fn create(
        &self,
        task: &Task,
        submit_id: SubmitId,
        scenario_id: Option<ScenarioId>,
        version: VersionId,
    ) -> Job {
        let job = Job::new(task.id, submit_id, scenario_id, version);
        debug!(job = %job.id.short(), task = %task.config_id, "created job");
        self.store.set(job.clone());
        job
    }

    /// The most recently created job for a task, if any.
    pub fn get_latest(&self, task: &TaskId) -> Option<Job> {
        self.store
            .get_all()
            .into_iter()
            .filter(|job| job.task_id == *task)
            .max_by_key(|job| job.creation_date)
    }

    /// All jobs issued by one submission.
    pub fn get_by_submit_id(&self, submit_id: SubmitId) -> Vec<Job> {
        self.store
            .get_all()
            .into_iter()
            .filter(|job| job.submit_id == submit_id)
            .collect()
    }

    /// Delete a job record. Unfinished jobs are protected unless
    /// `force` is set.
    pub fn delete(&self, id: &JobId, force: bool) -> Result<()> {
        let job = self.store.get(id)?;
        if !job.is_finished() && !force {
            return Err(Error::JobNotFinished(job.id.to_string()));
        }
        self.store.delete(id)
    }

    /// Delete every job record, finished or not.
    pub fn delete_all(&self) {
        self.store.clear();
    }
}
