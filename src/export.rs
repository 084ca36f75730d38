//! Scenario export: reproducible JSON snapshots.
//!
//! The target directory receives one subdirectory per entity kind, each
//! holding one `<entity_id>.json` file, limited to the transitive set
//! reachable from the exported scenario. The `scenarios/`, `tasks/`,
//! `jobs/` and `cycles/` folders describe exactly one scenario and are
//! replaced on re-export; `data_nodes/` merges by id so unrelated files
//! written earlier survive. Exporting into the core's own storage root
//! is refused.

use crate::core::{DataNodeId, ScenarioId};
use crate::error::{Error, Result};
use crate::registry::CoreContext;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// Export a scenario and everything reachable from it into `target`.
pub fn export_scenario(ctx: &CoreContext, id: &ScenarioId, target: &Path) -> Result<()> {
    let scenario = ctx.scenarios.store.get(id)?;

    let storage = ctx.core_config().storage_folder;
    if normalize(target).starts_with(normalize(&storage)) {
        return Err(Error::InvalidExportPath(target.to_path_buf()));
    }

    // The single-scenario folders are replaced wholesale.
    for kind in ["scenarios", "tasks", "jobs", "cycles"] {
        let dir = target.join(kind);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
    }
    fs::create_dir_all(target.join("data_nodes"))?;

    write_entity(&target.join("scenarios"), &scenario.id.to_string(), &scenario)?;

    let mut data_nodes: HashSet<DataNodeId> =
        scenario.additional_data_nodes.iter().copied().collect();
    for task_id in &scenario.tasks {
        let task = ctx.tasks.store.get(task_id)?;
        data_nodes.extend(task.inputs.iter().copied());
        data_nodes.extend(task.outputs.iter().copied());
        write_entity(&target.join("tasks"), &task.id.to_string(), &task)?;
    }

    for node_id in data_nodes {
        let node = ctx.data_nodes.store.get(&node_id)?;
        write_entity(&target.join("data_nodes"), &node.id.to_string(), &node)?;
    }

    for job in ctx.jobs.store.get_all() {
        if job.scenario_id == Some(scenario.id) {
            write_entity(&target.join("jobs"), &job.id.to_string(), &job)?;
        }
    }

    if let Some(cycle_id) = scenario.cycle {
        let cycle = ctx.cycles.store.get(&cycle_id)?;
        write_entity(&target.join("cycles"), &cycle.id.to_string(), &cycle)?;
    }

    info!(scenario = %scenario.id.short(), target = %target.display(), "exported scenario");
    Ok(())
}

fn write_entity<T: serde::Serialize>(dir: &Path, id: &str, entity: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(entity)?;
    fs::write(dir.join(format!("{id}.json")), json)?;
    Ok(())
}

/// Lexically absolutize and normalize a path so prefix comparison works
/// without requiring either side to exist.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
