//! Configuration guard and entity cleanup through the facade.

use crate::fixtures::chain_core;
use serde_json::json;
use std::sync::Arc;
use tempo::{CoreConfig, DataNodeConfig, Error, ScenarioConfig, Scope, StorageKind, TaskConfig};

#[tokio::test]
async fn test_config_blocked_after_run_in_development_mode() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    core.run().unwrap();
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.submit(&scenario, false, false, None).await.unwrap();

    let result = core
        .configs()
        .configure_scenario(ScenarioConfig::new("late"));
    assert!(matches!(result, Err(Error::ConfigurationUpdateBlocked)));

    let result = core.configs().configure_data_node(DataNodeConfig::new(
        "late",
        StorageKind::InMemory,
        Scope::Scenario,
    ));
    assert!(matches!(result, Err(Error::ConfigurationUpdateBlocked)));

    let result = core
        .configs()
        .configure_task(TaskConfig::new("late", Arc::new(|_| Ok(Vec::new()))));
    assert!(matches!(result, Err(Error::ConfigurationUpdateBlocked)));
}

#[tokio::test]
async fn test_config_blocked_after_run_in_standalone_mode() {
    let (core, scenario_cfg) = chain_core(CoreConfig::standalone(2));
    core.run().unwrap();
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.submit(&scenario, false, true, None).await.unwrap();

    let result = core
        .configs()
        .configure_scenario(ScenarioConfig::new("late"));
    assert!(matches!(result, Err(Error::ConfigurationUpdateBlocked)));
    core.stop().await;
}

#[tokio::test]
async fn test_unblock_is_explicit_and_restores_updates() {
    let (core, _) = chain_core(CoreConfig::development());
    core.run().unwrap();
    assert!(core
        .configs()
        .configure_scenario(ScenarioConfig::new("late"))
        .is_err());

    // Privileged escape hatch for tooling and tests.
    core.configs().guard().unblock();
    assert!(core
        .configs()
        .configure_scenario(ScenarioConfig::new("late"))
        .is_ok());
}

#[tokio::test]
async fn test_core_config_update_also_guarded() {
    let (core, _) = chain_core(CoreConfig::development());
    core.run().unwrap();

    let result = core
        .context()
        .update_core_config(|c| c.clean_entities_enabled = true);
    assert!(matches!(result, Err(Error::ConfigurationUpdateBlocked)));
}

#[tokio::test]
async fn test_clean_all_entities_end_to_end() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    core.run().unwrap();
    let scenario = core.create_scenario(&scenario_cfg, None, None).unwrap();
    core.submit(&scenario, false, true, None).await.unwrap();

    assert_eq!(core.get_data_nodes().len(), 3);
    assert_eq!(core.get_tasks().len(), 2);
    assert_eq!(core.get_scenarios().len(), 1);
    assert_eq!(core.get_cycles().len(), 1);
    assert_eq!(core.get_jobs().len(), 2);

    // Disabled by default: nothing happens.
    assert!(!core.clean_all_entities());
    assert_eq!(core.get_scenarios().len(), 1);

    // Flip the flag (config updates require the explicit unblock first).
    core.configs().guard().unblock();
    core.context()
        .update_core_config(|c| c.clean_entities_enabled = true)
        .unwrap();

    let old_versions: Vec<_> = core
        .context()
        .versions
        .get_all()
        .iter()
        .map(|v| v.id)
        .collect();

    assert!(core.clean_all_entities());
    assert!(core.get_data_nodes().is_empty());
    assert!(core.get_tasks().is_empty());
    assert!(core.get_scenarios().is_empty());
    assert!(core.get_cycles().is_empty());
    assert!(core.get_jobs().is_empty());
    assert!(core
        .context()
        .versions
        .get_all()
        .iter()
        .all(|v| !old_versions.contains(&v.id)));
}

#[tokio::test]
async fn test_clean_survivors_can_be_recreated() {
    let (core, scenario_cfg) = chain_core(CoreConfig::development());
    core.context()
        .update_core_config(|c| c.clean_entities_enabled = true)
        .unwrap();
    core.create_scenario(&scenario_cfg, None, None).unwrap();

    assert!(core.clean_all_entities());
    assert!(core.get_scenarios().is_empty());

    // The config registry survives cleaning; materialization works again.
    let again = core.create_scenario(&scenario_cfg, None, None).unwrap();
    assert_eq!(again.config_id, "chain");
    assert_eq!(core.get_data_nodes().len(), 3);
    let src = crate::fixtures::node_by_config(&core, "src");
    assert_eq!(src.data, Some(json!(1)));
}
