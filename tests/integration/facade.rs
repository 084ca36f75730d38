//! Directory operations, scenario queries and job bookkeeping through
//! the `Core` facade.

use crate::fixtures::{chain_core, node_by_config, task_by_config};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tempo::{
    Core, CoreConfig, Entity, EntityId, Frequency, ParentKind, PipelineConfig, ScenarioConfig,
    TaskConfig, WarningKind,
};

#[tokio::test]
async fn test_set_then_get_round_trips_every_kind() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();
    let jobs = core.submit(&scenario, false, true, None).await.unwrap();

    let ids: Vec<EntityId> = vec![
        scenario.id.into(),
        scenario.tasks[0].into(),
        scenario.cycle.unwrap().into(),
        task_by_config(&core, "double").inputs[0].into(),
        jobs[0].id.into(),
    ];

    for id in ids {
        assert!(core.exists(id), "{id} should exist");
        let entity = core.get(id).unwrap();
        assert_eq!(entity.id(), id);
        // Upserting the fetched entity is a no-op round trip.
        core.set(entity.clone());
        assert_eq!(core.get(id).unwrap(), entity);
    }
}

#[tokio::test]
async fn test_exists_false_after_hard_delete() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();

    assert!(core.exists(scenario.id));
    core.delete(scenario.id).unwrap();
    assert!(!core.exists(scenario.id));
}

#[tokio::test]
async fn test_is_submittable_by_kind_only() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();
    let jobs = core.submit(&scenario, false, true, None).await.unwrap();

    assert!(core.is_submittable(scenario.id));
    assert!(core.is_submittable(scenario.tasks[0]));
    assert!(!core.is_submittable(scenario.cycle.unwrap()));
    assert!(!core.is_submittable(jobs[0].id));
    assert!(!core.is_submittable(task_by_config(&core, "double").inputs[0]));
}

#[tokio::test]
async fn test_get_parents_shapes_through_facade() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();

    // `mid` sits between the two tasks.
    let mid = node_by_config(&core, "mid");
    let parents = core.get_parents(mid.id);
    assert_eq!(parents[&ParentKind::Tasks].len(), 2);
    assert_eq!(parents[&ParentKind::Scenarios].len(), 1);
    assert!(matches!(
        &parents[&ParentKind::Scenarios][0],
        Entity::Scenario(s) if s.id == scenario.id
    ));

    assert!(core.get_parents(scenario.id).is_empty());
    assert!(core.get_parents(scenario.cycle.unwrap()).is_empty());
}

#[tokio::test]
async fn test_cycles_scenarios_grouping() {
    let core = Core::new(CoreConfig::development());
    let configs = core.configs();
    let daily = configs
        .configure_scenario(ScenarioConfig::new("daily").with_frequency(Frequency::Daily))
        .unwrap();
    let weekly = configs
        .configure_scenario(ScenarioConfig::new("weekly").with_frequency(Frequency::Weekly))
        .unwrap();
    let free = configs.configure_scenario(ScenarioConfig::new("free")).unwrap();

    let now = Utc.with_ymd_and_hms(2023, 5, 17, 9, 0, 0).unwrap();
    let d1 = core.create_scenario(&daily, Some(now), None).unwrap();
    let d2 = core
        .create_scenario(&daily, Some(now + Duration::hours(2)), None)
        .unwrap();
    let d3 = core
        .create_scenario(&daily, Some(now + Duration::days(1)), None)
        .unwrap();
    let d4 = core
        .create_scenario(&daily, Some(now + Duration::days(8)), None)
        .unwrap();
    let w1 = core.create_scenario(&weekly, Some(now), None).unwrap();
    let f1 = core.create_scenario(&free, None, None).unwrap();
    let f2 = core.create_scenario(&free, None, None).unwrap();

    assert_eq!(d1.cycle, d2.cycle, "same day shares one cycle");
    assert_ne!(d1.cycle, d3.cycle);
    assert_ne!(d3.cycle, d4.cycle);
    assert_ne!(d1.cycle, w1.cycle, "frequencies never share cycles");
    assert!(f1.cycle.is_none() && f2.cycle.is_none());

    let groups = core.get_cycles_scenarios();
    // Four cycles plus the None group.
    assert_eq!(groups.len(), 5);
    assert_eq!(groups[&d1.cycle].len(), 2);
    assert_eq!(groups[&None].len(), 2);
}

#[tokio::test]
async fn test_get_entities_by_config_id() {
    let core = Core::new(CoreConfig::development());
    let configs = core.configs();
    let a = configs.configure_scenario(ScenarioConfig::new("a")).unwrap();
    let b = configs.configure_scenario(ScenarioConfig::new("b")).unwrap();

    let a1 = core.create_scenario(&a, None, None).unwrap();
    let a2 = core.create_scenario(&a, None, None).unwrap();
    let a3 = core.create_scenario(&a, None, None).unwrap();
    let b1 = core.create_scenario(&b, None, None).unwrap();
    let b2 = core.create_scenario(&b, None, None).unwrap();
    assert_eq!(core.get_scenarios().len(), 5);

    let mut from_a: Vec<_> = core
        .get_entities_by_config_id("a")
        .iter()
        .map(|s| s.id)
        .collect();
    from_a.sort_by_key(|id| id.to_string());
    let mut expected = vec![a1.id, a2.id, a3.id];
    expected.sort_by_key(|id| id.to_string());
    assert_eq!(from_a, expected);

    let from_b = core.get_entities_by_config_id("b");
    assert_eq!(from_b.len(), 2);
    assert!(from_b.iter().all(|s| s.id == b1.id || s.id == b2.id));
}

#[tokio::test]
async fn test_tagging_and_tag_queries() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();

    core.tag(&scenario.id, "fav").unwrap();
    assert_eq!(core.get_scenarios_by_tag("fav").len(), 1);
    assert!(core.get_scenarios_by_tag("other").is_empty());

    core.untag(&scenario.id, "fav").unwrap();
    assert!(core.get_scenarios_by_tag("fav").is_empty());
}

#[tokio::test]
async fn test_primary_lifecycle() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let now = Utc.with_ymd_and_hms(2023, 5, 17, 9, 0, 0).unwrap();
    let first = core.create_scenario(&scenario_cfg, Some(now), None).unwrap();
    let second = core.create_scenario(&scenario_cfg, Some(now), None).unwrap();
    let cycle = first.cycle.unwrap();

    assert!(first.primary);
    assert_eq!(core.get_primary(cycle).unwrap().id, first.id);
    assert!(core.is_promotable(&second.id));
    assert!(!core.is_deletable(&first.id), "primary with a sibling");
    assert!(core.is_deletable(&second.id));

    core.set_primary(&second.id).unwrap();
    assert_eq!(core.get_primary(cycle).unwrap().id, second.id);
    assert_eq!(core.get_primary_scenarios().len(), 1);
    assert!(core.is_promotable(&first.id));
}

#[tokio::test]
async fn test_job_bookkeeping() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.run().unwrap();

    let first = core.submit(&scenario, false, true, None).await.unwrap();
    let second = core.submit(&scenario, true, true, None).await.unwrap();
    assert_eq!(core.get_jobs().len(), 4);

    let double = task_by_config(&core, "double");
    let latest = core.get_latest_job(&double.id).unwrap();
    assert!(second.iter().any(|j| j.id == latest.id));
    assert!(!first.iter().any(|j| j.id == latest.id));

    core.delete_job(&first[0].id, false).unwrap();
    assert_eq!(core.get_jobs().len(), 3);

    core.delete_jobs();
    assert!(core.get_jobs().is_empty());
}

#[tokio::test]
async fn test_create_pipeline_deprecated_shim() {
    let core = Core::new(CoreConfig::development());
    let configs = core.configs();
    let task = configs
        .configure_task(TaskConfig::new("t", Arc::new(|_| Ok(Vec::new()))))
        .unwrap();
    let pipeline_cfg = configs
        .configure_pipeline(PipelineConfig::new("p").with_tasks(&[&task]))
        .unwrap();

    let first = core.create_pipeline(&pipeline_cfg).unwrap();
    let warnings = core.drain_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::Deprecated);

    // Forwarding to get_or_create: the same pipeline comes back.
    let second = core.create_pipeline(&pipeline_cfg).unwrap();
    assert_eq!(first.id, second.id);
    assert!(core.is_submittable(first.id));
}
