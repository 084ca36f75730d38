//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Declaring a small two-task scenario configuration
//! - Task functions over JSON payloads
//! - Looking entities up by config id

use serde_json::{json, Value};
use std::sync::Arc;
use tempo::{
    Core, CoreConfig, DataNode, DataNodeConfig, Frequency, ScenarioConfig, Scope, StorageKind,
    Task, TaskConfig, TaskFunction,
};

/// Install the test tracing subscriber once, so core logs show up in
/// captured test output when debugging.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// A function doubling its single integer input.
pub fn double() -> TaskFunction {
    Arc::new(|inputs: &[Value]| {
        let n = inputs
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| "missing integer input".to_string())?;
        Ok(vec![json!(n * 2)])
    })
}

/// A function incrementing its single integer input.
pub fn increment() -> TaskFunction {
    Arc::new(|inputs: &[Value]| {
        let n = inputs
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| "missing integer input".to_string())?;
        Ok(vec![json!(n + 1)])
    })
}

/// A function that always fails.
pub fn failing() -> TaskFunction {
    Arc::new(|_: &[Value]| Err("deliberate failure".to_string()))
}

/// Declare the chain `src -> double -> mid -> increment -> dst` on a
/// fresh core and return the scenario configuration.
///
/// `src` is seeded with 1, so a full run leaves 2 in `mid` and 3 in
/// `dst`.
pub fn chain_core(config: CoreConfig) -> (Core, ScenarioConfig) {
    init_tracing();
    let core = Core::new(config);
    let configs = core.configs();

    let src = configs
        .configure_data_node(
            DataNodeConfig::new("src", StorageKind::InMemory, Scope::Scenario)
                .with_default_data(json!(1)),
        )
        .unwrap();
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

    let double_cfg = configs
        .configure_task(
            TaskConfig::new("double", double())
                .with_inputs(&[&src])
                .with_outputs(&[&mid]),
        )
        .unwrap();
    let increment_cfg = configs
        .configure_task(
            TaskConfig::new("increment", increment())
                .with_inputs(&[&mid])
                .with_outputs(&[&dst]),
        )
        .unwrap();

    let scenario_cfg = configs
        .configure_scenario(
            ScenarioConfig::new("chain")
                .with_tasks(&[&double_cfg, &increment_cfg])
                .with_frequency(Frequency::Daily),
        )
        .unwrap();

    (core, scenario_cfg)
}

/// The materialized data node declared under `config_id`.
pub fn node_by_config(core: &Core, config_id: &str) -> DataNode {
    core.get_data_nodes()
        .into_iter()
        .find(|n| n.config_id == config_id)
        .expect("data node materialized")
}

/// The materialized task declared under `config_id`.
pub fn task_by_config(core: &Core, config_id: &str) -> Task {
    core.get_tasks()
        .into_iter()
        .find(|t| t.config_id == config_id)
        .expect("task materialized")
}

/// Current payload of the data node declared under `config_id`.
pub fn node_value(core: &Core, config_id: &str) -> Option<Value> {
    node_by_config(core, config_id).data
}
