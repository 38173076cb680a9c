use std::sync::{Arc, Mutex};

use uuid::Uuid;

use flowgrid_core::config::SchedulingConfig;
use flowgrid_core::knowledge::KnowledgeBase;
use flowgrid_core::types::{shared_task_map, SharedTaskMap, TaskDescriptor, TaskId};

use crate::dfs::SimulatedDfs;
use crate::quincy::QuincyCostModel;

/// Build a shared task map holding one task per binary name; ids are the
/// slice indices.
pub fn make_maps_with_tasks(binaries: &[&str]) -> (SharedTaskMap, Vec<TaskId>) {
    let task_map = shared_task_map();
    let job = Uuid::new_v4();
    let mut ids = Vec::new();
    {
        let mut map = task_map.write().unwrap();
        for (i, binary) in binaries.iter().enumerate() {
            let id = i as TaskId;
            map.insert(id, TaskDescriptor::new(id, job, *binary));
            ids.push(id);
        }
    }
    (task_map, ids)
}

pub fn make_config(machines_per_rack: usize, num_pref_arcs: usize) -> SchedulingConfig {
    SchedulingConfig {
        machines_per_rack,
        num_pref_arcs_task_to_res: num_pref_arcs,
        ..SchedulingConfig::default()
    }
}

pub fn make_quincy(task_map: SharedTaskMap, config: SchedulingConfig) -> QuincyCostModel {
    let knowledge = KnowledgeBase::shared();
    let dfs = Arc::new(Mutex::new(SimulatedDfs::new(config.cost_model_seed)));
    QuincyCostModel::new(task_map, knowledge, dfs, &config)
}
