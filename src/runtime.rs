//! The `Core` facade: the stable surface other components call into.
//!
//! `Core` owns the orchestration context, the submission plans and the
//! optional running dispatch service. Entity lookups delegate to the
//! per-kind managers; submissions flow through the resolver, the job
//! directory and the dispatcher.

use crate::config::{CoreConfig, PipelineConfig, ScenarioConfig};
use crate::core::entity::{Entity, EntityId, Parents};
use crate::core::{
    Cycle, CycleId, DataNode, Job, JobId, JobStatus, Pipeline, Scenario, ScenarioId, SubmitId,
    Task, TaskId,
};
use crate::error::Result;
use crate::export;
use crate::orchestration::dispatcher::{
    notify_terminal, run_plan_inline, wait_for_settled, CoreService, ServiceHandle, SharedPlans,
};
use crate::orchestration::resolver::{self, Submittable};
use crate::orchestration::scheduler::SubmissionPlan;
use crate::registry::{
    CoreContext, Owner, PipelineCallback, ScenarioCallback, ScenarioComparison, SubscriptionId,
    WarningKind,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The orchestration core.
///
/// Construct one per process (or per test), declare configurations
/// through [`Core::configs`], call [`Core::run`] to start a dispatch
/// service, then create and submit scenarios.
#[derive(Debug)]
pub struct Core {
    ctx: Arc<CoreContext>,
    plans: SharedPlans,
    service: Mutex<Option<CoreService>>,
}

impl Core {
    /// Create a core around a fresh orchestration context.
    pub fn new(config: CoreConfig) -> Self {
        Self {
            ctx: Arc::new(CoreContext::new(config)),
            plans: Arc::new(Mutex::new(HashMap::new())),
            service: Mutex::new(None),
        }
    }

    /// The underlying orchestration context.
    pub fn context(&self) -> &CoreContext {
        &self.ctx
    }

    /// The configuration registry for declaring entity configs.
    pub fn configs(&self) -> &crate::config::ConfigRegistry {
        &self.ctx.configs
    }

    // ---- service lifecycle -------------------------------------------------

    /// Start the dispatch service in the configured mode and block any
    /// further configuration update.
    ///
    /// Standalone mode spawns the scheduler loop and therefore must be
    /// called from within a Tokio runtime. Calling `run` twice is a
    /// no-op.
    pub fn run(&self) -> Result<()> {
        let mut service = self.service.lock().expect("service lock poisoned");
        if service.is_some() {
            debug!("Core::run called while already running; ignoring");
            return Ok(());
        }
        self.ctx.configs.guard().block();
        let mode = self.ctx.core_config().mode;
        *service = Some(CoreService::start(
            Arc::clone(&self.ctx),
            Arc::clone(&self.plans),
            mode,
        ));
        info!(?mode, "Core service started");
        Ok(())
    }

    /// Stop the dispatch service. Running jobs finish; pending jobs stay
    /// pending. The configuration guard stays blocked; unblocking is an
    /// explicit operation for tooling.
    pub async fn stop(&self) {
        let service = self
            .service
            .lock()
            .expect("service lock poisoned")
            .take();
        if let Some(service) = service {
            service.stop().await;
        }
    }

    /// Whether a dispatch service is currently running.
    pub fn is_running(&self) -> bool {
        self.service
            .lock()
            .expect("service lock poisoned")
            .is_some()
    }

    fn service_handle(&self) -> Option<ServiceHandle> {
        self.service
            .lock()
            .expect("service lock poisoned")
            .as_ref()
            .map(|s| s.handle())
    }

    // ---- creation ----------------------------------------------------------

    /// Materialize a scenario instance from its configuration.
    pub fn create_scenario(
        &self,
        config: &ScenarioConfig,
        creation_date: Option<DateTime<Utc>>,
        name: Option<&str>,
    ) -> Result<Scenario> {
        self.ctx.scenarios.create(&self.ctx, config, creation_date, name)
    }

    /// Deprecated compatibility shim: materialize a pipeline outside any
    /// scenario. Forwards to the pipeline manager's `get_or_create` and
    /// records a deprecation warning.
    pub fn create_pipeline(&self, config: &PipelineConfig) -> Result<Pipeline> {
        warn!(config_id = %config.id, "create_pipeline is deprecated; declare pipelines on a scenario config");
        self.ctx.push_warning(
            WarningKind::Deprecated,
            "create_pipeline is deprecated; declare pipelines on a scenario config",
        );

        if let Some(existing) = self.ctx.pipelines.get_by_config_id(&config.id) {
            return Ok(existing);
        }

        let version = self.ctx.versions.current();
        let pipeline_id = crate::core::PipelineId::new();
        let mut task_ids = Vec::new();
        for task_cfg_id in &config.tasks {
            let task_cfg = self.ctx.configs.task(task_cfg_id)?;
            let task = self.ctx.tasks.get_or_create(
                &task_cfg,
                &self.ctx.configs,
                &self.ctx.data_nodes,
                None,
                Owner::Pipeline(pipeline_id),
                version,
            )?;
            task_ids.push(task.id);
        }
        let pipeline = self
            .ctx
            .pipelines
            .get_or_create(&config.id, task_ids.clone(), version)?;
        for task_id in &task_ids {
            self.ctx.parents.link(
                (*task_id).into(),
                crate::core::ParentKind::Pipelines,
                pipeline.id.into(),
            );
        }
        Ok(pipeline)
    }

    // ---- submission --------------------------------------------------------

    /// Whether the entity can be submitted: true only for existing
    /// scenarios, pipelines and tasks.
    pub fn is_submittable(&self, id: impl Into<EntityId>) -> bool {
        resolver::is_submittable(&self.ctx, id.into())
    }

    /// Resolve the entity's task graph, create one job per
    /// non-skippable task and hand them to the dispatcher.
    ///
    /// `force` bypasses the skip engine. `wait` blocks until every
    /// created job settles or `timeout` elapses; on timeout the call
    /// returns normally with jobs still in flight. With no service
    /// running the jobs are recorded pending and a single
    /// "The Core service is NOT running" warning is recorded.
    pub async fn submit(
        &self,
        entity: impl Into<Submittable>,
        force: bool,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<Job>> {
        let submittable = entity.into();
        let resolution = resolver::resolve(&self.ctx, &submittable)?;
        let submit_id = SubmitId::new();
        let version = self.ctx.versions.current();

        let mut pairs: Vec<(Job, Task)> = Vec::new();
        for task in resolution.tasks {
            if !force && resolver::is_skippable(&self.ctx, &task) {
                debug!(task = %task.config_id, "task skipped: cached outputs still valid");
                continue;
            }
            let job = self
                .ctx
                .jobs
                .create(&task, submit_id, resolution.scenario_id, version);
            let job = self.ctx.jobs.store.update(&job.id, |j| j.pending())?;
            pairs.push((job, task));
        }

        let plan = SubmissionPlan::new(submit_id, resolution.scenario_id, &pairs);
        let job_ids: Vec<JobId> = plan.jobs.clone();
        self.plans
            .lock()
            .expect("plan map lock poisoned")
            .insert(submit_id, plan.clone());

        let handle = self.service_handle();
        match &handle {
            None => {
                warn!("The Core service is NOT running");
                self.ctx
                    .push_warning(WarningKind::ServiceNotRunning, "The Core service is NOT running");
            }
            Some(handle) => match handle.mode {
                crate::config::JobExecutionMode::Development => {
                    run_plan_inline(&self.ctx, &plan);
                    handle.tick();
                }
                crate::config::JobExecutionMode::Standalone { .. } => {
                    handle.send_submission(submit_id).await;
                }
            },
        }

        if wait {
            if let Some(handle) = handle {
                wait_for_settled(&self.ctx, &job_ids, handle.completion_rx, timeout).await;
            }
        }

        job_ids
            .iter()
            .map(|id| self.ctx.jobs.store.get(id))
            .collect()
    }

    // ---- directory ---------------------------------------------------------

    /// Upsert any entity by value.
    pub fn set(&self, entity: Entity) {
        match entity {
            Entity::DataNode(e) => self.ctx.data_nodes.store.set(e),
            Entity::Task(e) => self.ctx.tasks.store.set(e),
            Entity::Pipeline(e) => self.ctx.pipelines.store.set(e),
            Entity::Scenario(e) => self.ctx.scenarios.store.set(e),
            Entity::Cycle(e) => self.ctx.cycles.store.set(e),
            Entity::Job(e) => self.ctx.jobs.store.set(e),
        }
    }

    /// Fetch any entity by id.
    pub fn get(&self, id: impl Into<EntityId>) -> Result<Entity> {
        self.ctx.get(id.into())
    }

    /// Cheap existence probe.
    pub fn exists(&self, id: impl Into<EntityId>) -> bool {
        self.ctx.exists(id.into())
    }

    /// Hard-delete any entity, cascading per kind.
    pub fn delete(&self, id: impl Into<EntityId>) -> Result<()> {
        self.ctx.delete(id.into())
    }

    /// Direct referrers of an entity, grouped by kind.
    pub fn get_parents(&self, id: impl Into<EntityId>) -> Parents {
        self.ctx.get_parents(id.into())
    }

    /// All data nodes.
    pub fn get_data_nodes(&self) -> Vec<DataNode> {
        self.ctx.data_nodes.store.get_all()
    }

    /// All tasks.
    pub fn get_tasks(&self) -> Vec<Task> {
        self.ctx.tasks.store.get_all()
    }

    /// All pipelines.
    pub fn get_pipelines(&self) -> Vec<Pipeline> {
        self.ctx.pipelines.store.get_all()
    }

    /// All scenarios.
    pub fn get_scenarios(&self) -> Vec<Scenario> {
        self.ctx.scenarios.store.get_all()
    }

    /// All cycles.
    pub fn get_cycles(&self) -> Vec<Cycle> {
        self.ctx.cycles.store.get_all()
    }

    /// All jobs.
    pub fn get_jobs(&self) -> Vec<Job> {
        self.ctx.jobs.store.get_all()
    }

    // ---- scenario queries and operations -----------------------------------

    /// Scenarios grouped under one cycle.
    pub fn get_scenarios_by_cycle(&self, cycle: CycleId) -> Vec<Scenario> {
        self.ctx.scenarios.get_all_by_cycle(cycle)
    }

    /// Scenarios carrying a tag.
    pub fn get_scenarios_by_tag(&self, tag: &str) -> Vec<Scenario> {
        self.ctx.scenarios.get_all_by_tag(tag)
    }

    /// Scenarios created from one configuration id.
    pub fn get_entities_by_config_id(&self, config_id: &str) -> Vec<Scenario> {
        self.ctx.scenarios.get_by_config_id(config_id)
    }

    /// Scenarios of one configuration generation.
    pub fn get_scenarios_by_version(&self, scope: crate::version::VersionScope) -> Vec<Scenario> {
        self.ctx
            .scenarios
            .store
            .get_all_by_version(scope, self.ctx.versions.current())
    }

    /// All scenarios grouped by owning cycle (`None` for cycle-less).
    pub fn get_cycles_scenarios(&self) -> HashMap<Option<CycleId>, Vec<Scenario>> {
        self.ctx.scenarios.get_cycles_scenarios()
    }

    /// The primary scenario of a cycle.
    pub fn get_primary(&self, cycle: CycleId) -> Option<Scenario> {
        self.ctx.scenarios.get_primary(cycle)
    }

    /// Every cycle's primary scenario.
    pub fn get_primary_scenarios(&self) -> Vec<Scenario> {
        self.ctx.scenarios.get_primary_scenarios()
    }

    /// Promote a scenario to primary, demoting the previous one.
    pub fn set_primary(&self, id: &ScenarioId) -> Result<Scenario> {
        self.ctx.scenarios.set_primary(id)
    }

    /// Attach a tag to a scenario.
    pub fn tag(&self, id: &ScenarioId, tag: &str) -> Result<Scenario> {
        self.ctx.scenarios.tag(id, tag)
    }

    /// Remove a tag from a scenario.
    pub fn untag(&self, id: &ScenarioId, tag: &str) -> Result<Scenario> {
        self.ctx.scenarios.untag(id, tag)
    }

    /// Whether hard delete would be accepted for the scenario.
    pub fn is_deletable(&self, id: &ScenarioId) -> bool {
        self.ctx.scenarios.is_deletable(id)
    }

    /// Whether the scenario can be promoted to primary.
    pub fn is_promotable(&self, id: &ScenarioId) -> bool {
        self.ctx.scenarios.is_promotable(id)
    }

    /// Compare two scenarios created from the same configuration.
    pub fn compare_scenarios(
        &self,
        left: &ScenarioId,
        right: &ScenarioId,
        data_node_config_id: Option<&str>,
    ) -> Result<ScenarioComparison> {
        self.ctx
            .scenarios
            .compare(&self.ctx, left, right, data_node_config_id)
    }

    // ---- jobs --------------------------------------------------------------

    /// The most recent job of a task.
    pub fn get_latest_job(&self, task: &TaskId) -> Option<Job> {
        self.ctx.jobs.get_latest(task)
    }

    /// Delete one job record; unfinished jobs require `force`.
    pub fn delete_job(&self, id: &JobId, force: bool) -> Result<()> {
        self.ctx.jobs.delete(id, force)
    }

    /// Delete every job record.
    pub fn delete_jobs(&self) {
        self.ctx.jobs.delete_all();
    }

    /// Cancel a job.
    ///
    /// Pending, blocked and freshly submitted jobs cancel immediately
    /// and the cancellation cascades to their not-yet-started
    /// dependents. A running job is signalled cooperatively and becomes
    /// `Canceled` once its task function yields control; its outputs
    /// are discarded. Finished jobs are left untouched.
    pub fn cancel_job(&self, id: &JobId) -> Result<()> {
        let job = self.ctx.jobs.store.get(id)?;
        match job.status {
            JobStatus::Running => {
                let signalled = self
                    .service
                    .lock()
                    .expect("service lock poisoned")
                    .as_ref()
                    .map(|s| s.cancel_running(id))
                    .unwrap_or(false);
                if !signalled {
                    // No worker to signal (e.g. the service stopped);
                    // mark the record directly.
                    let job = self.ctx.jobs.store.update(id, |j| j.cancel())?;
                    notify_terminal(&self.ctx, &job);
                }
                self.cascade_cancel(id);
            }
            status if !status.is_finished() => {
                let job = self.ctx.jobs.store.update(id, |j| j.cancel())?;
                info!(job = %job.id.short(), "job canceled");
                notify_terminal(&self.ctx, &job);
                self.cascade_cancel(id);
            }
            _ => {
                debug!(job = %job.id.short(), "cancel of a finished job ignored");
            }
        }
        Ok(())
    }

    fn cascade_cancel(&self, id: &JobId) {
        let plan = self
            .plans
            .lock()
            .expect("plan map lock poisoned")
            .values()
            .find(|plan| plan.contains(id))
            .cloned();
        if let Some(plan) = plan {
            for job in plan.propagate_downstream(&self.ctx, id, JobStatus::Canceled) {
                notify_terminal(&self.ctx, &job);
            }
        }
        // Wake any waiter observing the canceled jobs.
        if let Some(handle) = self.service_handle() {
            handle.tick();
        }
    }

    // ---- subscriptions -----------------------------------------------------

    /// Register a scenario callback, optionally filtered to one
    /// scenario. Returns the handle used to unsubscribe.
    pub fn subscribe_scenario(
        &self,
        callback: ScenarioCallback,
        scenario: Option<ScenarioId>,
    ) -> SubscriptionId {
        self.ctx.scenarios.subscribe(callback, scenario)
    }

    /// Remove a scenario subscription.
    pub fn unsubscribe_scenario(&self, id: SubscriptionId) -> bool {
        self.ctx.scenarios.unsubscribe(id)
    }

    /// Register a pipeline callback, optionally filtered to one
    /// pipeline. Returns the handle used to unsubscribe.
    pub fn subscribe_pipeline(
        &self,
        callback: PipelineCallback,
        pipeline: Option<crate::core::PipelineId>,
    ) -> SubscriptionId {
        self.ctx.pipelines.subscribe(callback, pipeline)
    }

    /// Remove a pipeline subscription.
    pub fn unsubscribe_pipeline(&self, id: SubscriptionId) -> bool {
        self.ctx.pipelines.unsubscribe(id)
    }

    // ---- maintenance -------------------------------------------------------

    /// Export a scenario's reachable entities as JSON files.
    pub fn export_scenario(&self, id: &ScenarioId, target: &Path) -> Result<()> {
        export::export_scenario(&self.ctx, id, target)
    }

    /// Wipe every entity of every version. Gated by
    /// `clean_entities_enabled`; returns whether anything was cleaned.
    pub fn clean_all_entities(&self) -> bool {
        self.ctx.clean_all_entities()
    }

    /// Take every warning recorded since the last drain.
    pub fn drain_warnings(&self) -> Vec<crate::registry::CoreWarning> {
        self.ctx.drain_warnings()
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}
