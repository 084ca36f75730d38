//! Scenario export through the facade.

use crate::fixtures::chain_core;
use std::fs;
use std::path::Path;
use tempo::{CoreConfig, Error};

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_export_scenario_layout() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();
    let jobs = core.submit(&scenario, false, true, None).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("exp_scenario");
    core.export_scenario(&scenario.id, &target).unwrap();

    assert_eq!(
        listing(&target.join("scenarios")),
        vec![format!("{}.json", scenario.id)]
    );
    let mut expected_tasks: Vec<String> = scenario
        .tasks
        .iter()
        .map(|id| format!("{id}.json"))
        .collect();
    expected_tasks.sort();
    assert_eq!(listing(&target.join("tasks")), expected_tasks);
    let mut expected_jobs: Vec<String> =
        jobs.iter().map(|job| format!("{}.json", job.id)).collect();
    expected_jobs.sort();
    assert_eq!(listing(&target.join("jobs")), expected_jobs);
    assert_eq!(
        listing(&target.join("cycles")),
        vec![format!("{}.json", scenario.cycle.unwrap())]
    );
    assert_eq!(listing(&target.join("data_nodes")).len(), 3);

    // Every file parses back as JSON.
    for kind in ["scenarios", "tasks", "jobs", "cycles", "data_nodes"] {
        for name in listing(&target.join(kind)) {
            let raw = fs::read_to_string(target.join(kind).join(name)).unwrap();
            serde_json::from_str::<serde_json::Value>(&raw).unwrap();
        }
    }
}

#[tokio::test]
async fn test_export_second_scenario_replaces_first() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let now = chrono::Utc::now();
    let first = core.create_scenario(&scenario_cfg, Some(now), None).unwrap();
    let second = core
        .create_scenario(&scenario_cfg, Some(now + chrono::Duration::days(3)), None)
        .unwrap();
    core.run().unwrap();
    core.submit(&first, false, true, None).await.unwrap();
    let second_jobs = core.submit(&second, false, true, None).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("exp");
    core.export_scenario(&first.id, &target).unwrap();
    core.export_scenario(&second.id, &target).unwrap();

    assert_eq!(
        listing(&target.join("scenarios")),
        vec![format!("{}.json", second.id)]
    );
    let mut expected_tasks: Vec<String> =
        second.tasks.iter().map(|id| format!("{id}.json")).collect();
    expected_tasks.sort();
    assert_eq!(listing(&target.join("tasks")), expected_tasks);
    let mut expected_jobs: Vec<String> = second_jobs
        .iter()
        .map(|job| format!("{}.json", job.id))
        .collect();
    expected_jobs.sort();
    assert_eq!(listing(&target.join("jobs")), expected_jobs);
    assert_eq!(
        listing(&target.join("cycles")),
        vec![format!("{}.json", second.cycle.unwrap())]
    );
    // data_nodes merges by id: both scenarios' nodes remain.
    assert_eq!(listing(&target.join("data_nodes")).len(), 6);
}

#[tokio::test]
async fn test_export_into_storage_folder_fails() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    let storage = core.context().core_config().storage_folder;

    assert!(matches!(
        core.export_scenario(&scenario.id, &storage),
        Err(Error::InvalidExportPath(_))
    ));
}
