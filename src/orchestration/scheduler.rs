//! Submission plans: job-level dependency tracking for one submit call.
//!
//! A plan is built once, from the resolved task order, and consulted by
//! the dispatcher to decide which jobs are ready, which must be blocked
//! after an upstream failure, and when the submission has settled.

use crate::core::{Job, JobId, JobStatus, ScenarioId, SubmitId, Task};
use crate::registry::CoreContext;
use std::collections::HashMap;
use tracing::debug;

/// Job-level dependency graph of one submission.
#[derive(Debug, Clone)]
pub struct SubmissionPlan {
    /// The submission these jobs belong to.
    pub submit_id: SubmitId,
    /// Owning scenario, when the submittable was one.
    pub scenario_id: Option<ScenarioId>,
    /// Jobs in execution order.
    pub jobs: Vec<JobId>,
    deps: HashMap<JobId, Vec<JobId>>,
    dependents: HashMap<JobId, Vec<JobId>>,
}

impl SubmissionPlan {
    /// Build the plan from `(job, task)` pairs in resolved order. Edges
    /// are derived the same way resolution derives them: a job depends
    /// on the jobs producing its task's inputs within this submission.
    pub fn new(
        submit_id: SubmitId,
        scenario_id: Option<ScenarioId>,
        pairs: &[(Job, Task)],
    ) -> Self {
        let mut producers: HashMap<crate::core::DataNodeId, JobId> = HashMap::new();
        for (job, task) in pairs {
            for output in &task.outputs {
                producers.insert(*output, job.id);
            }
        }

        let mut deps: HashMap<JobId, Vec<JobId>> = HashMap::new();
        let mut dependents: HashMap<JobId, Vec<JobId>> = HashMap::new();
        for (job, task) in pairs {
            for input in &task.inputs {
                if let Some(&producer) = producers.get(input) {
                    if producer != job.id {
                        deps.entry(job.id).or_default().push(producer);
                        dependents.entry(producer).or_default().push(job.id);
                    }
                }
            }
        }

        Self {
            submit_id,
            scenario_id,
            jobs: pairs.iter().map(|(job, _)| job.id).collect(),
            deps,
            dependents,
        }
    }

    /// Whether the job belongs to this submission.
    pub fn contains(&self, job: &JobId) -> bool {
        self.jobs.contains(job)
    }

    /// Upstream jobs of `job` inside this submission.
    pub fn deps_of(&self, job: &JobId) -> &[JobId] {
        self.deps.get(job).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Downstream jobs of `job` inside this submission.
    pub fn dependents_of(&self, job: &JobId) -> &[JobId] {
        self.dependents.get(job).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether every upstream job of `job` is `Completed` or `Skipped`.
    pub fn deps_satisfied(&self, ctx: &CoreContext, job: &JobId) -> bool {
        self.deps_of(job).iter().all(|dep| {
            ctx.jobs
                .store
                .try_get(dep)
                .map(|j| j.status.satisfies_dependents())
                .unwrap_or(false)
        })
    }

    /// Jobs that are `Pending` with all dependencies satisfied, in plan
    /// order.
    pub fn ready_jobs(&self, ctx: &CoreContext) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|id| {
                ctx.jobs
                    .store
                    .try_get(id)
                    .map(|j| j.status == JobStatus::Pending)
                    .unwrap_or(false)
                    && self.deps_satisfied(ctx, id)
            })
            .copied()
            .collect()
    }

    /// Transitively mark every not-yet-started dependent of `job` with
    /// `status` (`Blocked` after an upstream failure, `Canceled` on
    /// explicit cancel). Returns the jobs that changed state.
    pub fn propagate_downstream(
        &self,
        ctx: &CoreContext,
        job: &JobId,
        status: JobStatus,
    ) -> Vec<Job> {
        debug_assert!(matches!(status, JobStatus::Blocked | JobStatus::Canceled));
        let mut changed = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let mut stack: Vec<JobId> = self.dependents_of(job).to_vec();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            stack.extend(self.dependents_of(&id));
            let mut touched = false;
            let updated = ctx.jobs.store.update(&id, |j| {
                if j.is_startable() {
                    match status {
                        JobStatus::Canceled => j.cancel(),
                        _ => j.block(),
                    }
                    touched = true;
                }
            });
            if let Ok(updated) = updated {
                if touched {
                    debug!(job = %id.short(), %status, "propagated upstream outcome downstream");
                    changed.push(updated);
                }
            }
        }
        changed
    }

    /// Whether no job of this submission can make further progress:
    /// every job is terminal or `Blocked`.
    pub fn is_settled(&self, ctx: &CoreContext) -> bool {
        self.jobs.iter().all(|id| {
            ctx.jobs
                .store
                .try_get(id)
                .map(|j| j.is_finished() || j.status == JobStatus::Blocked)
                .unwrap_or(true)
        })
    }

}
