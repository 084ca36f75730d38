//! Job dispatch: inline development mode and the standalone scheduler
//! loop over the bounded worker pool.
//!
//! Both modes conform to the same contract: jobs of a submission execute
//! in dependency order, upstream failures block not-yet-started
//! dependents, terminal transitions invoke subscribers inside the
//! dispatcher's control flow, and a `watch` tick lets waiters observe
//! progress without polling.

use crate::config::JobExecutionMode;
use crate::core::entity::{EntityId, ParentKind};
use crate::core::{Job, JobId, JobStatus, SubmitId};
use crate::orchestration::pool::{JobEvent, JobPool};
use crate::orchestration::scheduler::SubmissionPlan;
use crate::registry::CoreContext;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Submission plans shared between the facade and the scheduler loop.
pub type SharedPlans = Arc<Mutex<HashMap<SubmitId, SubmissionPlan>>>;

/// Events driving the standalone scheduler loop.
#[derive(Debug)]
enum ServiceEvent {
    /// A new submission's jobs are ready for dispatch.
    Submitted(SubmitId),
    /// Stop the loop; running jobs finish on their own.
    Shutdown,
}

/// A running dispatch service in one of the two execution modes.
#[derive(Debug)]
pub struct CoreService {
    mode: JobExecutionMode,
    event_tx: Option<mpsc::Sender<ServiceEvent>>,
    completion_tx: watch::Sender<u64>,
    completion_rx: watch::Receiver<u64>,
    tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
    loop_handle: Option<tokio::task::JoinHandle<()>>,
}

/// Cloneable view of a running service, safe to use without holding the
/// facade's service lock across awaits.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    /// The mode the service runs in.
    pub mode: JobExecutionMode,
    event_tx: Option<mpsc::Sender<ServiceEvent>>,
    completion_tx: watch::Sender<u64>,
    /// Observes job-completion ticks.
    pub completion_rx: watch::Receiver<u64>,
}

impl ServiceHandle {
    /// Enqueue a submission for the standalone scheduler loop.
    pub async fn send_submission(&self, submit_id: SubmitId) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ServiceEvent::Submitted(submit_id)).await;
        }
    }

    /// Tick the completion channel so waiters re-check their jobs.
    pub fn tick(&self) {
        self.completion_tx.send_modify(|tick| *tick += 1);
    }
}

impl CoreService {
    /// Start the dispatch service for the given mode.
    pub fn start(ctx: Arc<CoreContext>, plans: SharedPlans, mode: JobExecutionMode) -> Self {
        let (completion_tx, completion_rx) = watch::channel(0u64);
        let tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let (event_tx, loop_handle) = match mode {
            JobExecutionMode::Development => {
                info!("development dispatcher started");
                (None, None)
            }
            JobExecutionMode::Standalone { max_workers } => {
                let (tx, rx) = mpsc::channel(64);
                let handle = tokio::spawn(scheduler_loop(
                    Arc::clone(&ctx),
                    Arc::clone(&plans),
                    rx,
                    max_workers,
                    completion_tx.clone(),
                    Arc::clone(&tokens),
                ));
                (Some(tx), Some(handle))
            }
        };

        Self {
            mode,
            event_tx,
            completion_tx,
            completion_rx,
            tokens,
            loop_handle,
        }
    }

    /// The mode this service runs in.
    pub fn mode(&self) -> JobExecutionMode {
        self.mode
    }

    /// A cloneable view of this service for dispatch and waiting.
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            mode: self.mode,
            event_tx: self.event_tx.clone(),
            completion_tx: self.completion_tx.clone(),
            completion_rx: self.completion_rx.clone(),
        }
    }

    /// Signal the running job's cancellation token, if it has a worker.
    pub fn cancel_running(&self, job: &JobId) -> bool {
        self.tokens
            .lock()
            .expect("token map lock poisoned")
            .get(job)
            .map(|token| {
                token.cancel();
                true
            })
            .unwrap_or(false)
    }

    /// Stop the service. Running jobs finish; queued work stays pending.
    pub async fn stop(mut self) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ServiceEvent::Shutdown).await;
        }
        if let Some(handle) = self.loop_handle.take() {
            let _ = handle.await;
        }
        info!("dispatcher stopped");
    }
}

/// Standalone scheduler loop: event-driven, never polling. Reacts to new
/// submissions and worker completions, keeps at most `max_workers` jobs
/// running and ticks the completion channel after every change.
async fn scheduler_loop(
    ctx: Arc<CoreContext>,
    plans: SharedPlans,
    mut event_rx: mpsc::Receiver<ServiceEvent>,
    max_workers: usize,
    completion_tx: watch::Sender<u64>,
    tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
) {
    let (pool_tx, mut pool_rx) = mpsc::channel::<JobEvent>(64);
    let mut pool = JobPool::new(max_workers, pool_tx);
    info!(max_workers, "standalone dispatcher started");

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(ServiceEvent::Submitted(submit_id)) => {
                    debug!(submit_id = %submit_id, "submission queued");
                    dispatch_ready(&ctx, &plans, &mut pool, &tokens);
                }
                Some(ServiceEvent::Shutdown) | None => break,
            },
            Some(JobEvent::Finished { job_id }) = pool_rx.recv() => {
                pool.release(&job_id);
                tokens.lock().expect("token map lock poisoned").remove(&job_id);
                handle_finished(&ctx, &plans, job_id);
                dispatch_ready(&ctx, &plans, &mut pool, &tokens);
                completion_tx.send_modify(|tick| *tick += 1);
            }
        }
    }

    info!("standalone scheduler loop exiting");
}

/// Spawn every ready job across active plans while the pool has
/// capacity. Settled plans are dropped on the way.
fn dispatch_ready(
    ctx: &Arc<CoreContext>,
    plans: &SharedPlans,
    pool: &mut JobPool,
    tokens: &Arc<Mutex<HashMap<JobId, CancellationToken>>>,
) {
    let snapshot: Vec<SubmissionPlan> = {
        let mut guard = plans.lock().expect("plan map lock poisoned");
        guard.retain(|_, plan| !plan.is_settled(ctx));
        guard.values().cloned().collect()
    };

    for plan in snapshot {
        for job_id in plan.ready_jobs(ctx) {
            if pool.is_running(&job_id) {
                continue;
            }
            if !pool.has_capacity() {
                return;
            }
            debug!(job = %job_id.short(), "dispatching job to worker pool");
            let token = pool.spawn(Arc::clone(ctx), job_id);
            tokens
                .lock()
                .expect("token map lock poisoned")
                .insert(job_id, token);
        }
    }
}

/// React to a worker finishing: a failed job blocks its not-yet-started
/// dependents.
fn handle_finished(ctx: &Arc<CoreContext>, plans: &SharedPlans, job_id: JobId) {
    let Some(job) = ctx.jobs.store.try_get(&job_id) else {
        return;
    };
    if job.status != JobStatus::Failed {
        return;
    }

    let plan = plans
        .lock()
        .expect("plan map lock poisoned")
        .values()
        .find(|plan| plan.contains(&job_id))
        .cloned();
    if let Some(plan) = plan {
        let blocked = plan.propagate_downstream(ctx, &job_id, JobStatus::Blocked);
        if !blocked.is_empty() {
            warn!(
                job = %job_id.short(),
                blocked = blocked.len(),
                "upstream failure blocked downstream jobs"
            );
        }
    }
}

/// Execute a submission inline, in plan order, on the calling thread.
pub(crate) fn run_plan_inline(ctx: &CoreContext, plan: &SubmissionPlan) {
    for job_id in &plan.jobs {
        let Some(job) = ctx.jobs.store.try_get(job_id) else {
            continue;
        };
        if job.status != JobStatus::Pending {
            continue;
        }
        if plan.deps_satisfied(ctx, job_id) {
            let status = execute_job(ctx, job_id, None);
            if !status.satisfies_dependents() {
                plan.propagate_downstream(ctx, job_id, JobStatus::Blocked);
            }
        } else {
            // Upstream neither completed nor skipped; this job cannot
            // run in this submission anymore.
            let _ = ctx.jobs.store.update(job_id, |j| j.block());
        }
    }
}

/// Execute one job synchronously on the current thread.
///
/// Drives the full state machine for the job: `Running`, then
/// `Completed`, `Failed` or `Canceled`, writing outputs only on success
/// and never after a cancellation. Terminal transitions invoke the
/// scenario and pipeline subscribers.
pub(crate) fn execute_job(
    ctx: &CoreContext,
    job_id: &JobId,
    cancel: Option<&CancellationToken>,
) -> JobStatus {
    let is_cancelled = || cancel.map(CancellationToken::is_cancelled).unwrap_or(false);

    if is_cancelled() {
        if let Ok(job) = ctx.jobs.store.update(job_id, |j| j.cancel()) {
            notify_terminal(ctx, &job);
        }
        return JobStatus::Canceled;
    }

    let Some(job) = ctx.jobs.store.try_get(job_id) else {
        return JobStatus::Canceled;
    };
    let task = match ctx.tasks.store.try_get(&job.task_id) {
        Some(task) => task,
        None => {
            let failed = ctx
                .jobs
                .store
                .update(job_id, |j| j.fail("task no longer exists"));
            if let Ok(job) = failed {
                notify_terminal(ctx, &job);
            }
            return JobStatus::Failed;
        }
    };

    let _ = ctx.jobs.store.update(job_id, |j| j.run());
    debug!(job = %job_id.short(), task = %task.config_id, "job running");

    let inputs: Vec<Value> = task
        .inputs
        .iter()
        .map(|id| {
            ctx.data_nodes
                .store
                .try_get(id)
                .and_then(|node| node.data)
                .unwrap_or(Value::Null)
        })
        .collect();

    let result = (task.function)(&inputs);

    if is_cancelled() {
        // Cooperative stop: the function already ran to completion, but
        // its outputs must not be presented as valid.
        let canceled = ctx.jobs.store.update(job_id, |j| j.cancel());
        if let Ok(job) = canceled {
            notify_terminal(ctx, &job);
        }
        return JobStatus::Canceled;
    }

    let finished = match result {
        Ok(outputs) if outputs.len() == task.outputs.len() => {
            for (node_id, value) in task.outputs.iter().zip(outputs) {
                let _ = ctx.data_nodes.write(node_id, value);
            }
            ctx.jobs.store.update(job_id, |j| j.complete())
        }
        Ok(outputs) => ctx.jobs.store.update(job_id, |j| {
            j.fail(&format!(
                "task '{}' returned {} outputs, expected {}",
                task.config_id,
                outputs.len(),
                task.outputs.len()
            ))
        }),
        Err(stacktrace) => {
            warn!(job = %job_id.short(), task = %task.config_id, "task function failed");
            ctx.jobs.store.update(job_id, |j| j.fail(&stacktrace))
        }
    };

    match finished {
        Ok(job) => {
            debug!(job = %job_id.short(), status = %job.status, "job finished");
            notify_terminal(ctx, &job);
            job.status
        }
        Err(_) => JobStatus::Failed,
    }
}

/// Invoke scenario and pipeline subscribers for a job's terminal
/// transition, from inside the dispatcher's control flow.
pub(crate) fn notify_terminal(ctx: &CoreContext, job: &Job) {
    if let Some(scenario_id) = job.scenario_id {
        if let Ok(scenario) = ctx.scenarios.store.get(&scenario_id) {
            ctx.scenarios.notify(&scenario, job);
        }
    }

    let parents = ctx.parents.parents_of(job.task_id.into());
    if let Some(pipelines) = parents.get(&ParentKind::Pipelines) {
        for parent in pipelines {
            if let EntityId::Pipeline(pipeline_id) = parent {
                if let Ok(pipeline) = ctx.pipelines.store.get(pipeline_id) {
                    ctx.pipelines.notify(&pipeline, job);
                }
            }
        }
    }
}

/// Block the calling task until every listed job is terminal or
/// `Blocked`, or until `timeout` elapses. A timeout returns normally
/// without touching the jobs.
pub(crate) async fn wait_for_settled(
    ctx: &CoreContext,
    jobs: &[JobId],
    mut completion_rx: watch::Receiver<u64>,
    timeout: Option<Duration>,
) {
    let settled = |ctx: &CoreContext| {
        jobs.iter().all(|id| {
            ctx.jobs
                .store
                .try_get(id)
                .map(|job| job.is_finished() || job.status == JobStatus::Blocked)
                .unwrap_or(true)
        })
    };

    let wait = async {
        loop {
            if settled(ctx) {
                return;
            }
            if completion_rx.changed().await.is_err() {
                // Dispatcher gone; nothing further will change.
                return;
            }
        }
    };

    match timeout {
        Some(limit) => {
            if tokio::time::timeout(limit, wait).await.is_err() {
                debug!("wait timed out with jobs still in flight");
            }
        }
        None => wait.await,
    }
}
