use flowgrid_core::types::{EquivClass, JobId, ResourceId, SharedTaskMap, TaskId};
use tracing::warn;

use crate::{Cost, CostModel};

const UNSCHEDULED_COST: Cost = 5;
const CLUSTER_AGG_COST: Cost = 2;

/// Constant-cost model used to verify solver correctness and scheduler
/// plumbing independent of any locality logic.
pub struct TrivialCostModel {
    task_map: SharedTaskMap,
}

impl TrivialCostModel {
    pub fn new(task_map: SharedTaskMap) -> Self {
        Self { task_map }
    }
}

impl CostModel for TrivialCostModel {
    fn task_to_unscheduled_agg_cost(&mut self, _task_id: TaskId) -> Cost {
        UNSCHEDULED_COST
    }

    fn unscheduled_agg_to_sink_cost(&mut self, _job_id: JobId) -> Cost {
        0
    }

    fn task_to_cluster_agg_cost(&mut self, _task_id: TaskId) -> Cost {
        CLUSTER_AGG_COST
    }

    fn task_to_resource_node_cost(&mut self, _task_id: TaskId, _resource_id: ResourceId) -> Cost {
        0
    }

    fn resource_node_to_resource_node_cost(
        &mut self,
        _source: ResourceId,
        _destination: ResourceId,
    ) -> Cost {
        0
    }

    fn leaf_resource_node_to_sink_cost(&mut self, _resource_id: ResourceId) -> Cost {
        0
    }

    fn task_continuation_cost(&mut self, _task_id: TaskId) -> Cost {
        0
    }

    fn task_preemption_cost(&mut self, _task_id: TaskId) -> Cost {
        0
    }

    fn task_to_equiv_class_aggregator(&mut self, _task_id: TaskId, _tec: EquivClass) -> Cost {
        0
    }

    fn equiv_class_to_resource_node(&mut self, _tec: EquivClass, _resource_id: ResourceId) -> Cost {
        0
    }

    fn equiv_class_to_equiv_class(&mut self, _tec1: EquivClass, _tec2: EquivClass) -> Cost {
        0
    }

    fn task_equiv_classes(&self, task_id: TaskId) -> Vec<EquivClass> {
        let task_map = self.task_map.read().unwrap();
        match task_map.get(&task_id) {
            Some(td) => vec![td.level0_equiv_class()],
            None => {
                warn!("Equivalence-class query for unknown task {}", task_id);
                Vec::new()
            }
        }
    }

    fn resource_equiv_classes(&self, _resource_id: ResourceId) -> Vec<EquivClass> {
        Vec::new()
    }

    fn outgoing_equiv_class_pref_arcs(&mut self, _tec: EquivClass) -> Vec<ResourceId> {
        Vec::new()
    }

    fn task_preference_arcs(&mut self, _task_id: TaskId) -> Vec<ResourceId> {
        Vec::new()
    }

    fn equiv_class_to_equiv_classes_arcs(
        &self,
        _tec: EquivClass,
    ) -> (Vec<EquivClass>, Vec<EquivClass>) {
        (Vec::new(), Vec::new())
    }

    fn add_machine(&mut self, _resource_id: ResourceId) {}
    fn remove_machine(&mut self, _resource_id: ResourceId) {}
    fn add_task(&mut self, _task_id: TaskId) {}
    fn remove_task(&mut self, _task_id: TaskId) {}

    fn name(&self) -> &str {
        "trivial"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_common::*;
    use uuid::Uuid;

    #[test]
    fn constants_keep_scheduling_attractive() {
        let (task_map, _) = make_maps_with_tasks(&["wordcount"]);
        let mut model = TrivialCostModel::new(task_map);

        let unscheduled = model.task_to_unscheduled_agg_cost(0);
        let placed = model.task_to_cluster_agg_cost(0)
            + model.task_to_resource_node_cost(0, Uuid::new_v4());
        assert!(unscheduled > placed);
    }

    #[test]
    fn level0_class_comes_from_binary() {
        let (task_map, ids) = make_maps_with_tasks(&["sort", "sort", "grep"]);
        let model = TrivialCostModel::new(task_map);

        let a = model.task_equiv_classes(ids[0]);
        let b = model.task_equiv_classes(ids[1]);
        let c = model.task_equiv_classes(ids[2]);
        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn unknown_task_has_no_classes() {
        let (task_map, _) = make_maps_with_tasks(&[]);
        let model = TrivialCostModel::new(task_map);
        assert!(model.task_equiv_classes(999).is_empty());
    }
}
