//! Bounded worker pool for standalone execution.
//!
//! The pool enforces the configured parallelism limit: a job only spawns
//! while the active count is below `max_workers`, and completion events
//! release the slot. Task functions are opaque blocking code, so workers
//! run them on the blocking thread pool and check the cancellation token
//! around the call.

use crate::core::JobId;
use crate::orchestration::dispatcher::{execute_job, notify_terminal};
use crate::registry::CoreContext;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Events emitted by pool workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// The worker for this job finished; the job's terminal state is in
    /// the directory.
    Finished {
        /// The job the worker executed.
        job_id: JobId,
    },
}

/// Manages the concurrently running jobs of the standalone dispatcher.
#[derive(Debug)]
pub struct JobPool {
    running: HashMap<JobId, CancellationToken>,
    max_workers: usize,
    event_tx: mpsc::Sender<JobEvent>,
}

impl JobPool {
    /// Create a pool bounded to `max_workers` concurrent jobs.
    pub fn new(max_workers: usize, event_tx: mpsc::Sender<JobEvent>) -> Self {
        Self {
            running: HashMap::new(),
            max_workers: max_workers.max(1),
            event_tx,
        }
    }

    /// Whether another job may start right now.
    pub fn has_capacity(&self) -> bool {
        self.running.len() < self.max_workers
    }

    /// Number of jobs currently running.
    pub fn active_count(&self) -> usize {
        self.running.len()
    }

    /// The configured parallelism limit.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Whether this job currently occupies a worker.
    pub fn is_running(&self, job: &JobId) -> bool {
        self.running.contains_key(job)
    }

    /// Spawn a worker for the job and return its cancellation token.
    ///
    /// The worker executes the task function on the blocking pool and
    /// emits `JobEvent::Finished` when done, whatever the outcome.
    pub fn spawn(&mut self, ctx: Arc<CoreContext>, job_id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.running.insert(job_id, token.clone());

        let tx = self.event_tx.clone();
        let worker_token = token.clone();
        tokio::spawn(async move {
            let blocking_ctx = Arc::clone(&ctx);
            let blocking_token = worker_token.clone();
            let joined = tokio::task::spawn_blocking(move || {
                execute_job(&blocking_ctx, &job_id, Some(&blocking_token))
            })
            .await;

            if let Err(join_error) = joined {
                // A panicking task function is a failure, not a crash of
                // the dispatcher.
                error!(job = %job_id.short(), %join_error, "job worker panicked");
                let failed = ctx.jobs.store.update(&job_id, |j| {
                    j.fail(&format!("task function panicked: {join_error}"))
                });
                if let Ok(job) = failed {
                    notify_terminal(&ctx, &job);
                }
            }

            debug!(job = %job_id.short(), "worker finished");
            let _ = tx.send(JobEvent::Finished { job_id }).await;
        });

        token
    }

    /// Free the job's worker slot.
    pub fn release(&mut self, job: &JobId) {
        self.running.remove(job);
    }

    /// Request cooperative cancellation of a running job. Returns
    /// whether the job had a worker to signal.
    pub fn cancel(&mut self, job: &JobId) -> bool {
        match self.running.get(job) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(max_workers: usize) -> (JobPool, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (JobPool::new(max_workers, tx), rx)
    }

    #[test]
    fn test_capacity_accounting() {
        let (mut pool, _rx) = test_pool(2);
        assert!(pool.has_capacity());
        assert_eq!(pool.active_count(), 0);

        // Bookkeeping-only check: register jobs without real workers.
        let a = JobId::new();
        let b = JobId::new();
        pool.running.insert(a, CancellationToken::new());
        pool.running.insert(b, CancellationToken::new());

        assert!(!pool.has_capacity());
        assert!(pool.is_running(&a));

        pool.release(&a);
        assert!(pool.has_capacity());
        assert!(!pool.is_running(&a));
    }

    #[test]
    fn test_max_workers_clamped_to_one() {
        let (pool, _rx) = test_pool(0);
        assert_eq!(pool.max_workers(), 1);
    }

    #[test]
    fn test_cancel_unknown_job_is_false() {
        let (mut pool, _rx) = test_pool(1);
        assert!(!pool.cancel(&JobId::new()));
    }

    #[test]
    fn test_cancel_signals_token() {
        let (mut pool, _rx) = test_pool(1);
        let job = JobId::new();
        let token = CancellationToken::new();
        pool.running.insert(job, token.clone());

        assert!(pool.cancel(&job));
        assert!(token.is_cancelled());
    }
}
