//! Job model: one execution attempt of a task within a submission.
//!
//! A job is the unit of execution and of observable history. Only the
//! dispatcher drives its state machine:
//!
//! ```text
//! Submitted -> Pending -> Running -> { Completed | Failed }
//!                 |-> Blocked   (unsatisfied upstream)
//!                 |-> Canceled  (explicit or cascading)
//! ```
//!
//! `Completed`, `Failed`, `Canceled` and `Skipped` are terminal. A
//! dependent may start once every upstream job is `Completed` or
//! `Skipped`.

use crate::core::scenario::ScenarioId;
use crate::core::task::TaskId;
use crate::version::VersionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new unique job identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Groups the jobs issued by one `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmitId(pub Uuid);

impl SubmitId {
    /// Create a new unique submission identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubmitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created by a submission, not yet queued.
    Submitted,
    /// Queued, waiting on upstream jobs or worker capacity.
    Pending,
    /// Upstream job failed or was canceled; this job will not run.
    Blocked,
    /// Task function currently executing.
    Running,
    /// Explicitly or transitively canceled.
    Canceled,
    /// Task function returned an error.
    Failed,
    /// Task function returned successfully.
    Completed,
    /// Omitted because cached outputs were still valid.
    Skipped,
}

impl JobStatus {
    /// Whether this state is terminal.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled | JobStatus::Skipped
        )
    }

    /// Whether a dependent of a job in this state may start.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Skipped)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Submitted => write!(f, "submitted"),
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Blocked => write!(f, "blocked"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Canceled => write!(f, "canceled"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One execution attempt of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// The task this job executes.
    pub task_id: TaskId,
    /// The submission that issued this job.
    pub submit_id: SubmitId,
    /// Owning scenario, if the submission came from one.
    pub scenario_id: Option<ScenarioId>,
    /// When the job record was created.
    pub creation_date: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Failure records, oldest first.
    pub stacktraces: Vec<String>,
    /// Configuration generation this job was created under.
    pub version: VersionId,
}

impl Job {
    /// Create a new job in the `Submitted` state.
    pub fn new(
        task_id: TaskId,
        submit_id: SubmitId,
        scenario_id: Option<ScenarioId>,
        version: VersionId,
    ) -> Self {
        Self {
            id: JobId::new(),
            task_id,
            submit_id,
            scenario_id,
            creation_date: Utc::now(),
            status: JobStatus::Submitted,
            stacktraces: Vec::new(),
            version,
        }
    }

    /// Queue the job behind its dependencies.
    pub fn pending(&mut self) {
        self.status = JobStatus::Pending;
    }

    /// Mark the job unrunnable because of an upstream failure.
    pub fn block(&mut self) {
        self.status = JobStatus::Blocked;
    }

    /// Start executing the task function.
    pub fn run(&mut self) {
        self.status = JobStatus::Running;
    }

    /// Mark successful completion.
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
    }

    /// Record a failure and mark the job failed.
    pub fn fail(&mut self, stacktrace: &str) {
        self.stacktraces.push(stacktrace.to_string());
        self.status = JobStatus::Failed;
    }

    /// Cancel the job.
    pub fn cancel(&mut self) {
        self.status = JobStatus::Canceled;
    }

    /// Mark the job skipped.
    pub fn skip(&mut self) {
        self.status = JobStatus::Skipped;
    }

    /// Whether the job reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Whether the job may still be (re)queued: true until it has
    /// started running or reached a terminal state.
    pub fn is_startable(&self) -> bool {
        matches!(self.status, JobStatus::Submitted | JobStatus::Pending)
    }
}
