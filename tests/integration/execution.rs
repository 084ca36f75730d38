//! Submission and execution in both dispatch modes.

use crate::fixtures::{chain_core, node_value, task_by_config};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempo::{
    Core, CoreConfig, DataNodeConfig, JobStatus, ScenarioConfig, Scope, StorageKind, TaskConfig,
    WarningKind,
};

async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_development_mode_runs_chain_inline() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();

    let jobs = core.submit(&scenario, false, false, None).await.unwrap();

    // Development mode completes before submit returns, wait or not.
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
    assert_eq!(node_value(&core, "mid"), Some(json!(2)));
    assert_eq!(node_value(&core, "dst"), Some(json!(3)));
}

#[tokio::test]
async fn test_standalone_mode_runs_chain() {
    let (core, scenario_cfg) = chain_core(CoreConfig::standalone(2));
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();

    let jobs = core.submit(&scenario, false, true, None).await.unwrap();

    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
    assert_eq!(node_value(&core, "dst"), Some(json!(3)));
    core.stop().await;
}

#[tokio::test]
async fn test_submission_without_service_records_pending_jobs_and_one_warning() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();

    let jobs = core.submit(&scenario, false, false, None).await.unwrap();

    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));

    let warnings = core.drain_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::ServiceNotRunning);
    assert_eq!(warnings[0].message, "The Core service is NOT running");
}

#[tokio::test]
async fn test_skippable_task_produces_no_job_and_force_reruns() {
    let core = Core::new(CoreConfig::development());
    let configs = core.configs();
    let src = configs
        .configure_data_node(
            DataNodeConfig::new("src", StorageKind::InMemory, Scope::Scenario)
                .with_default_data(json!(5)),
        )
        .unwrap();
    let out = configs
        .configure_data_node(
            DataNodeConfig::new("out", StorageKind::InMemory, Scope::Scenario).cacheable(),
        )
        .unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let task = configs
        .configure_task(
            TaskConfig::new(
                "count_runs",
                Arc::new(move |_: &[Value]| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![json!("done")])
                }),
            )
            .with_inputs(&[&src])
            .with_outputs(&[&out]),
        )
        .unwrap();
    let scenario_cfg = configs
        .configure_scenario(ScenarioConfig::new("s").with_tasks(&[&task]))
        .unwrap();

    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();

    let first = core.submit(&scenario, false, true, None).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Output is cacheable and valid: the task resolves to no job at all.
    let second = core.submit(&scenario, false, true, None).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(core.get_jobs().len(), 1, "no skipped job record exists");

    // Force bypasses the skip engine.
    let third = core.submit(&scenario, true, true, None).await.unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failure_blocks_downstream() {
    let core = Core::new(CoreConfig::development());
    let configs = core.configs();
    let mid = configs
        .configure_data_node(DataNodeConfig::new(
            "mid",
            StorageKind::InMemory,
            Scope::Scenario,
        ))
        .unwrap();
    let dst = configs
        .configure_data_node(DataNodeConfig::new(
            "dst",
            StorageKind::InMemory,
            Scope::Scenario,
        ))
        .unwrap();
    let broken = configs
        .configure_task(
            TaskConfig::new("broken", crate::fixtures::failing()).with_outputs(&[&mid]),
        )
        .unwrap();
    let dependent = configs
        .configure_task(
            TaskConfig::new("dependent", crate::fixtures::increment())
                .with_inputs(&[&mid])
                .with_outputs(&[&dst]),
        )
        .unwrap();
    let scenario_cfg = configs
        .configure_scenario(ScenarioConfig::new("s").with_tasks(&[&broken, &dependent]))
        .unwrap();

    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();

    let jobs = core.submit(&scenario, false, true, None).await.unwrap();

    let broken_job = jobs
        .iter()
        .find(|j| j.task_id == task_by_config(&core, "broken").id)
        .unwrap();
    let dependent_job = jobs
        .iter()
        .find(|j| j.task_id == task_by_config(&core, "dependent").id)
        .unwrap();

    assert_eq!(broken_job.status, JobStatus::Failed);
    assert_eq!(broken_job.stacktraces, vec!["deliberate failure".to_string()]);
    assert_eq!(dependent_job.status, JobStatus::Blocked);
    assert_eq!(node_value(&core, "dst"), None, "blocked task never wrote");
}

#[tokio::test]
async fn test_standalone_respects_worker_limit() {
    let core = Core::new(CoreConfig::standalone(2));
    let configs = core.configs();

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut task_cfgs = Vec::new();
    for i in 0..5 {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        let cfg = configs
            .configure_task(TaskConfig::new(
                &format!("busy_{i}"),
                Arc::new(move |_: &[Value]| {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(80));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(Vec::new())
                }),
            ))
            .unwrap();
        task_cfgs.push(cfg);
    }
    let refs: Vec<&TaskConfig> = task_cfgs.iter().collect();
    let scenario_cfg = configs
        .configure_scenario(ScenarioConfig::new("busy").with_tasks(&refs))
        .unwrap();

    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();

    let jobs = core.submit(&scenario, false, true, None).await.unwrap();

    assert_eq!(jobs.len(), 5);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
    assert!(
        peak.load(Ordering::SeqCst) <= 2,
        "never more than max_workers running, saw {}",
        peak.load(Ordering::SeqCst)
    );
    core.stop().await;
}

#[tokio::test]
async fn test_wait_timeout_returns_without_canceling() {
    let core = Core::new(CoreConfig::standalone(1));
    let configs = core.configs();
    let slow = configs
        .configure_task(TaskConfig::new(
            "slow",
            Arc::new(|_: &[Value]| {
                std::thread::sleep(Duration::from_millis(400));
                Ok(Vec::new())
            }),
        ))
        .unwrap();
    let scenario_cfg = configs
        .configure_scenario(ScenarioConfig::new("slow").with_tasks(&[&slow]))
        .unwrap();
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();

    let started = std::time::Instant::now();
    let jobs = core
        .submit(&scenario, false, true, Some(Duration::from_millis(50)))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(350), "timeout honored");
    assert_eq!(jobs.len(), 1);
    assert!(
        !jobs[0].status.is_finished(),
        "timeout must not cancel the in-flight job"
    );

    // The job keeps running and eventually completes.
    let job_id = jobs[0].id;
    wait_until(
        || {
            matches!(
                core.get(job_id),
                Ok(tempo::Entity::Job(j)) if j.status == JobStatus::Completed
            )
        },
        "slow job completion",
    )
    .await;
    core.stop().await;
}

#[tokio::test]
async fn test_cancel_pending_job_cascades() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();

    // No service: jobs stay pending and can be canceled immediately.
    let jobs = core.submit(&scenario, false, false, None).await.unwrap();
    core.drain_warnings();

    core.cancel_job(&jobs[0].id).unwrap();

    let statuses: Vec<JobStatus> = jobs
        .iter()
        .map(|j| match core.get(j.id).unwrap() {
            tempo::Entity::Job(j) => j.status,
            other => panic!("expected job, got {other:?}"),
        })
        .collect();
    assert_eq!(statuses, vec![JobStatus::Canceled, JobStatus::Canceled]);
}

#[tokio::test]
async fn test_cancel_running_job_is_cooperative() {
    let core = Core::new(CoreConfig::standalone(1));
    let configs = core.configs();
    let out = configs
        .configure_data_node(DataNodeConfig::new(
            "out",
            StorageKind::InMemory,
            Scope::Scenario,
        ))
        .unwrap();
    let slow = configs
        .configure_task(
            TaskConfig::new(
                "slow",
                Arc::new(|_: &[Value]| {
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(vec![json!("partial")])
                }),
            )
            .with_outputs(&[&out]),
        )
        .unwrap();
    let scenario_cfg = configs
        .configure_scenario(ScenarioConfig::new("slow").with_tasks(&[&slow]))
        .unwrap();
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();

    let jobs = core.submit(&scenario, false, false, None).await.unwrap();
    let job_id = jobs[0].id;

    wait_until(
        || {
            matches!(
                core.get(job_id),
                Ok(tempo::Entity::Job(j)) if j.status == JobStatus::Running
            )
        },
        "job to start running",
    )
    .await;

    core.cancel_job(&job_id).unwrap();

    wait_until(
        || {
            matches!(
                core.get(job_id),
                Ok(tempo::Entity::Job(j)) if j.status.is_finished()
            )
        },
        "job to yield",
    )
    .await;

    match core.get(job_id).unwrap() {
        tempo::Entity::Job(job) => assert_eq!(job.status, JobStatus::Canceled),
        other => panic!("expected job, got {other:?}"),
    }
    assert_eq!(
        node_value(&core, "out"),
        None,
        "canceled job must not present outputs as valid"
    );
    core.stop().await;
}

#[tokio::test]
async fn test_scenario_subscribers_fire_on_terminal_states() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let subscription = core.subscribe_scenario(
        Arc::new(move |_, job| {
            if job.status.is_finished() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }),
        Some(scenario.id),
    );

    core.submit(&scenario, false, true, None).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2, "one callback per terminal job");

    assert!(core.unsubscribe_scenario(subscription));
    core.submit(&scenario, true, true, None).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2, "unsubscribed callback stays quiet");
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_break_dispatch() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();

    core.subscribe_scenario(Arc::new(|_, _| panic!("bad callback")), None);

    let jobs = core.submit(&scenario, false, true, None).await.unwrap();
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
}
