//! Orchestration layer: graph resolution, submission planning and job
//! dispatch.
//!
//! `resolver` turns a submittable entity into an ordered task set,
//! `scheduler` tracks job-level dependencies per submission, `pool`
//! bounds concurrent execution and `dispatcher` drives the job state
//! machine in either execution mode.

pub mod dispatcher;
pub mod pool;
pub mod resolver;
pub mod scheduler;

pub use dispatcher::{CoreService, ServiceHandle, SharedPlans};
pub use pool::{JobEvent, JobPool};
pub use resolver::{Resolution, Submittable};
pub use scheduler::SubmissionPlan;
