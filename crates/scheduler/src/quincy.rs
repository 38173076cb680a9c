use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use flowgrid_core::config::SchedulingConfig;
use flowgrid_core::knowledge::SharedKnowledgeBase;
use flowgrid_core::types::{
    EquivClass, JobId, ResourceId, SharedTaskMap, TaskId, CLUSTER_AGGREGATOR_ID,
};

use crate::dfs::{FileId, SimulatedDfs};
use crate::distributions::{BlockDistribution, RuntimeDistribution};
use crate::{Cost, CostModel};

/// Data-locality-aware cost model in the Quincy style. Machines are binned
/// into racks (the rack index is the resource's equivalence class), and each
/// task carries a sampled input file set sized from its expected runtime.
///
/// The per-arc costs are still randomized placeholders for the paper's
/// data-transfer formulas; the scheduling signal they carry is the ordering
/// between unscheduled, cluster-aggregator, and direct-placement arcs. All
/// randomness comes from one seeded PRNG, so rounds replay under a fixed
/// seed.
pub struct QuincyCostModel {
    task_map: SharedTaskMap,
    knowledge: SharedKnowledgeBase,
    filesystem: Arc<Mutex<SimulatedDfs>>,
    /// Rack buckets in fill order. Buckets never shrink; removed machines
    /// stay as tombstones so already-issued rack indices remain valid.
    racks: Vec<Vec<ResourceId>>,
    machine_to_rack: HashMap<ResourceId, EquivClass>,
    tombstones: HashSet<ResourceId>,
    /// Live leaves, in registration order; the pool for preference arcs.
    leaves: Vec<ResourceId>,
    file_map: HashMap<TaskId, HashSet<FileId>>,
    runtime_dist: RuntimeDistribution,
    block_dist: BlockDistribution,
    machines_per_rack: usize,
    flow_max_arc_cost: i64,
    num_pref_arcs: usize,
    percent_tolerance: u32,
    rng: StdRng,
}

impl QuincyCostModel {
    pub fn new(
        task_map: SharedTaskMap,
        knowledge: SharedKnowledgeBase,
        filesystem: Arc<Mutex<SimulatedDfs>>,
        config: &SchedulingConfig,
    ) -> Self {
        Self {
            task_map,
            knowledge,
            filesystem,
            // Start with a single, empty rack.
            racks: vec![Vec::new()],
            machine_to_rack: HashMap::new(),
            tombstones: HashSet::new(),
            leaves: Vec::new(),
            file_map: HashMap::new(),
            runtime_dist: RuntimeDistribution::google(),
            block_dist: BlockDistribution::google(),
            machines_per_rack: config.machines_per_rack,
            flow_max_arc_cost: config.flow_max_arc_cost,
            num_pref_arcs: config.num_pref_arcs_task_to_res,
            percent_tolerance: config.percent_tolerance,
            rng: StdRng::seed_from_u64(config.cost_model_seed),
        }
    }

    pub fn num_racks(&self) -> usize {
        self.racks.len()
    }

    pub fn rack_sizes(&self) -> Vec<usize> {
        self.racks.iter().map(|r| r.len()).collect()
    }

    pub fn is_tombstoned(&self, resource_id: ResourceId) -> bool {
        self.tombstones.contains(&resource_id)
    }

    pub fn input_files(&self, task_id: TaskId) -> Option<&HashSet<FileId>> {
        self.file_map.get(&task_id)
    }

    fn level0_class(&self, task_id: TaskId) -> Option<EquivClass> {
        self.task_map
            .read()
            .unwrap()
            .get(&task_id)
            .map(|td| td.level0_equiv_class())
    }

    fn avg_runtime(&self, tec: EquivClass) -> u64 {
        self.knowledge.read().unwrap().avg_runtime_for_tec(tec)
    }

    /// Uniform cost in `[1, flow_max_arc_cost / divisor]`.
    fn bounded_cost(&mut self, divisor: i64) -> Cost {
        let upper = (self.flow_max_arc_cost / divisor).max(1);
        self.rng.random_range(1..=upper)
    }
}

impl CostModel for QuincyCostModel {
    fn task_to_unscheduled_agg_cost(&mut self, _task_id: TaskId) -> Cost {
        // Always above half the arc-cost ceiling, so any plausible
        // placement undercuts it.
        let half = (self.flow_max_arc_cost / 2).max(1);
        half + self.rng.random_range(0..half)
    }

    fn unscheduled_agg_to_sink_cost(&mut self, _job_id: JobId) -> Cost {
        // Non-zero here would penalize every unscheduled task of the job;
        // the per-task arc above is the right lever.
        0
    }

    fn task_to_cluster_agg_cost(&mut self, task_id: TaskId) -> Cost {
        let classes = self.task_equiv_classes(task_id);
        debug_assert!(!classes.is_empty(), "task {task_id} has no equivalence classes");
        let Some(tec) = classes.first() else {
            return 0;
        };
        // Knowledge-base runtime is in milliseconds.
        self.avg_runtime(*tec) as Cost * 100
    }

    fn task_to_resource_node_cost(&mut self, _task_id: TaskId, _resource_id: ResourceId) -> Cost {
        self.bounded_cost(3)
    }

    fn resource_node_to_resource_node_cost(
        &mut self,
        _source: ResourceId,
        _destination: ResourceId,
    ) -> Cost {
        self.bounded_cost(4)
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
        self.bounded_cost(2)
    }

    fn equiv_class_to_resource_node(&mut self, _tec: EquivClass, _resource_id: ResourceId) -> Cost {
        // Aggregator-to-leaf arcs are free; costs live on task-to-aggregator.
        0
    }

    fn equiv_class_to_equiv_class(&mut self, tec1: EquivClass, tec2: EquivClass) -> Cost {
        debug_assert_eq!(
            tec1, CLUSTER_AGGREGATOR_ID,
            "source of an aggregator-to-aggregator arc must be the cluster aggregator"
        );
        debug_assert!(
            (tec2 as usize) < self.racks.len(),
            "destination {tec2} is not a known rack"
        );
        0
    }

    fn task_equiv_classes(&self, task_id: TaskId) -> Vec<EquivClass> {
        match self.level0_class(task_id) {
            Some(tec) => vec![tec],
            None => {
                warn!("Equivalence-class query for unknown task {}", task_id);
                Vec::new()
            }
        }
    }

    fn resource_equiv_classes(&self, resource_id: ResourceId) -> Vec<EquivClass> {
        match self.machine_to_rack.get(&resource_id) {
            Some(rack) => vec![*rack],
            None => Vec::new(),
        }
    }

    fn outgoing_equiv_class_pref_arcs(&mut self, _tec: EquivClass) -> Vec<ResourceId> {
        debug_assert!(
            self.leaves.len() >= self.num_pref_arcs,
            "leaf set ({}) smaller than num_pref_arcs_task_to_res ({})",
            self.leaves.len(),
            self.num_pref_arcs
        );
        self.leaves
            .choose_multiple(&mut self.rng, self.num_pref_arcs)
            .copied()
            .collect()
    }

    fn task_preference_arcs(&mut self, _task_id: TaskId) -> Vec<ResourceId> {
        // Per-task preferences would come from FileMap replica locations;
        // the class-level arcs carry the preferences for now.
        Vec::new()
    }

    fn equiv_class_to_equiv_classes_arcs(
        &self,
        tec: EquivClass,
    ) -> (Vec<EquivClass>, Vec<EquivClass>) {
        if tec == CLUSTER_AGGREGATOR_ID {
            let outgoing = (0..self.racks.len() as EquivClass).collect();
            (Vec::new(), outgoing)
        } else {
            (Vec::new(), Vec::new())
        }
    }

    fn add_machine(&mut self, resource_id: ResourceId) {
        // 'Replicate' blocks onto the newcomer first.
        self.filesystem.lock().unwrap().add_machine(resource_id);

        let mut current_rack = self.racks.len() - 1;
        if self.racks[current_rack].len() >= self.machines_per_rack {
            self.racks.push(Vec::new());
            current_rack += 1;
        }
        self.racks[current_rack].push(resource_id);
        self.machine_to_rack
            .insert(resource_id, current_rack as EquivClass);
        self.leaves.push(resource_id);
        self.tombstones.remove(&resource_id);

        debug!(
            "Machine {} binned into rack {} ({} racks total)",
            resource_id,
            current_rack,
            self.racks.len()
        );
    }

    fn remove_machine(&mut self, resource_id: ResourceId) {
        self.filesystem.lock().unwrap().remove_machine(resource_id);
        // The rack bucket keeps the entry as a tombstone: racks never
        // shrink, which keeps already-issued rack indices stable.
        self.machine_to_rack.remove(&resource_id);
        self.leaves.retain(|r| *r != resource_id);
        self.tombstones.insert(resource_id);
        debug!("Machine {} removed (tombstoned in its rack)", resource_id);
    }

    fn add_task(&mut self, task_id: TaskId) {
        let Some(tec) = self.level0_class(task_id) else {
            warn!("AddTask for unknown task {}", task_id);
            return;
        };
        // Expected runtime -> cumulative probability -> input block count.
        let avg_runtime = self.avg_runtime(tec);
        let cumulative = self.runtime_dist.cumulative(avg_runtime);
        let num_blocks = self.block_dist.inverse(cumulative);

        let files = self
            .filesystem
            .lock()
            .unwrap()
            .sample_files(num_blocks, self.percent_tolerance);
        debug!(
            "Task {}: ~{} input blocks across {} sampled files",
            task_id,
            num_blocks,
            files.len()
        );
        self.file_map.insert(task_id, files);
    }

    fn remove_task(&mut self, task_id: TaskId) {
        self.file_map.remove(&task_id);
    }

    fn name(&self) -> &str {
        "quincy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_common::*;
    use uuid::Uuid;

    #[test]
    fn machines_fill_racks_in_order() {
        let (task_map, _) = make_maps_with_tasks(&[]);
        let mut model = make_quincy(task_map, make_config(2, 3));

        let machines: Vec<ResourceId> = (0..5).map(|_| Uuid::new_v4()).collect();
        for m in &machines {
            model.add_machine(*m);
        }

        assert_eq!(model.rack_sizes(), vec![2, 2, 1]);
        let racks: Vec<EquivClass> = machines
            .iter()
            .map(|m| model.resource_equiv_classes(*m)[0])
            .collect();
        assert_eq!(racks, vec![0, 0, 1, 1, 2]);
    }

    #[test]
    fn removal_tombstones_but_keeps_rack_shape() {
        let (task_map, _) = make_maps_with_tasks(&[]);
        let mut model = make_quincy(task_map, make_config(2, 1));

        let machines: Vec<ResourceId> = (0..4).map(|_| Uuid::new_v4()).collect();
        for m in &machines {
            model.add_machine(*m);
        }

        model.remove_machine(machines[1]);
        assert!(model.is_tombstoned(machines[1]));
        assert!(model.resource_equiv_classes(machines[1]).is_empty());
        // Bucket shape and surviving rack indices are untouched.
        assert_eq!(model.rack_sizes(), vec![2, 2]);
        assert_eq!(model.resource_equiv_classes(machines[3]), vec![1]);
    }

    #[test]
    fn preference_arcs_sample_distinct_leaves() {
        let (task_map, _) = make_maps_with_tasks(&[]);
        let mut model = make_quincy(task_map, make_config(40, 3));

        let machines: Vec<ResourceId> = (0..10).map(|_| Uuid::new_v4()).collect();
        for m in &machines {
            model.add_machine(*m);
        }

        let arcs = model.outgoing_equiv_class_pref_arcs(0);
        assert_eq!(arcs.len(), 3);
        let distinct: std::collections::HashSet<_> = arcs.iter().collect();
        assert_eq!(distinct.len(), 3);
        for arc in &arcs {
            assert!(machines.contains(arc));
        }
    }

    #[test]
    fn cluster_aggregator_fans_out_to_all_racks() {
        let (task_map, _) = make_maps_with_tasks(&[]);
        let mut model = make_quincy(task_map, make_config(2, 1));

        for _ in 0..5 {
            model.add_machine(Uuid::new_v4());
        }

        let (incoming, outgoing) = model.equiv_class_to_equiv_classes_arcs(CLUSTER_AGGREGATOR_ID);
        assert!(incoming.is_empty());
        assert_eq!(outgoing, vec![0, 1, 2]);

        // Any other class has no aggregator-to-aggregator arcs.
        let (incoming, outgoing) = model.equiv_class_to_equiv_classes_arcs(0);
        assert!(incoming.is_empty());
        assert!(outgoing.is_empty());
    }

    #[test]
    fn unscheduled_cost_dominates_expected_placement() {
        let (task_map, ids) = make_maps_with_tasks(&["wordcount"]);
        let mut model = make_quincy(task_map, make_config(40, 3));
        let machine = Uuid::new_v4();
        model.add_machine(machine);

        // In expectation over many draws; single draws may cross.
        let rounds = 200;
        let mut unscheduled_total: i64 = 0;
        let mut placed_total: i64 = 0;
        for _ in 0..rounds {
            unscheduled_total += model.task_to_unscheduled_agg_cost(ids[0]);
            placed_total += model.task_to_cluster_agg_cost(ids[0])
                + model.task_to_resource_node_cost(ids[0], machine);
        }
        assert!(
            unscheduled_total > placed_total,
            "unscheduled {unscheduled_total} vs placed {placed_total}"
        );
    }

    #[test]
    fn add_task_samples_an_input_file_set() {
        let (task_map, ids) = make_maps_with_tasks(&["wordcount"]);
        let mut model = make_quincy(task_map, make_config(40, 3));
        for _ in 0..3 {
            model.add_machine(Uuid::new_v4());
        }

        model.add_task(ids[0]);
        assert!(model.input_files(ids[0]).is_some());
        assert!(!model.input_files(ids[0]).unwrap().is_empty());

        model.remove_task(ids[0]);
        assert!(model.input_files(ids[0]).is_none());
    }

    #[test]
    fn costs_replay_under_a_fixed_seed() {
        let (task_map_a, ids_a) = make_maps_with_tasks(&["sort"]);
        let (task_map_b, ids_b) = make_maps_with_tasks(&["sort"]);
        let mut a = make_quincy(task_map_a, make_config(40, 3));
        let mut b = make_quincy(task_map_b, make_config(40, 3));

        let machine = Uuid::new_v4();
        a.add_machine(machine);
        b.add_machine(machine);

        for _ in 0..10 {
            assert_eq!(
                a.task_to_unscheduled_agg_cost(ids_a[0]),
                b.task_to_unscheduled_agg_cost(ids_b[0])
            );
            assert_eq!(
                a.task_to_resource_node_cost(ids_a[0], machine),
                b.task_to_resource_node_cost(ids_b[0], machine)
            );
        }
    }

    #[test]
    fn bounded_costs_stay_in_range() {
        let (task_map, ids) = make_maps_with_tasks(&["grep"]);
        let config = make_config(40, 3);
        let max = config.flow_max_arc_cost;
        let mut model = make_quincy(task_map, config);
        let machine = Uuid::new_v4();
        model.add_machine(machine);

        for _ in 0..100 {
            let c = model.task_to_resource_node_cost(ids[0], machine);
            assert!((1..=max / 3).contains(&c));
            let c = model.resource_node_to_resource_node_cost(machine, machine);
            assert!((1..=max / 4).contains(&c));
            let c = model.task_to_equiv_class_aggregator(ids[0], 0);
            assert!((1..=max / 2).contains(&c));
        }
    }
}
