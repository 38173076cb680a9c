pub mod dfs;
pub mod distributions;
pub mod quincy;
pub mod trivial;

#[cfg(test)]
pub(crate) mod tests_common;

use flowgrid_core::types::{EquivClass, JobId, ResourceId, TaskId};

/// Arc cost in the flow network; the solver treats lower as better.
pub type Cost = i64;

/// Pluggable supplier of arc costs and graph-shape hints for the
/// min-cost-flow solver. The solver holds one implementation for the
/// lifetime of a scheduling round.
///
/// Cost queries may mutate model-internal state (the PRNG) but never the
/// shared task/resource maps; those are read-only snapshots during a round.
pub trait CostModel: Send {
    /// Cost of leaving the task unscheduled this round. Must exceed the
    /// task's best expected placement cost, or the solver never schedules.
    fn task_to_unscheduled_agg_cost(&mut self, task_id: TaskId) -> Cost;

    /// Cost from the job's unscheduled aggregator to the sink. Non-zero
    /// values penalize every unscheduled task of the job at once.
    fn unscheduled_agg_to_sink_cost(&mut self, job_id: JobId) -> Cost;

    /// Cost of running the task anywhere in the cluster.
    fn task_to_cluster_agg_cost(&mut self, task_id: TaskId) -> Cost;

    /// Direct task-to-leaf placement preference.
    fn task_to_resource_node_cost(&mut self, task_id: TaskId, resource_id: ResourceId) -> Cost;

    /// Topology-internal arcs.
    fn resource_node_to_resource_node_cost(
        &mut self,
        source: ResourceId,
        destination: ResourceId,
    ) -> Cost;

    /// Capacity/throttle hook on the leaf-to-sink arc.
    fn leaf_resource_node_to_sink_cost(&mut self, resource_id: ResourceId) -> Cost;

    // Preemption hooks. Both are 0 in the shipped models; a future policy
    // is expected to keep continuation cheaper than preemption.
    fn task_continuation_cost(&mut self, task_id: TaskId) -> Cost;
    fn task_preemption_cost(&mut self, task_id: TaskId) -> Cost;

    /// Cost of routing the task through an equivalence-class aggregator.
    fn task_to_equiv_class_aggregator(&mut self, task_id: TaskId, tec: EquivClass) -> Cost;

    /// Aggregator-to-leaf arcs; 0 by convention, the scheduling signal
    /// lives on the task-to-aggregator arcs.
    fn equiv_class_to_resource_node(&mut self, tec: EquivClass, resource_id: ResourceId) -> Cost;

    /// Aggregator-to-aggregator arcs. Only defined when the source is the
    /// cluster aggregator and the destination a known rack.
    fn equiv_class_to_equiv_class(&mut self, tec1: EquivClass, tec2: EquivClass) -> Cost;

    /// Equivalence classes of a task; never empty, the first entry is the
    /// level-0 class derived from the task binary name.
    fn task_equiv_classes(&self, task_id: TaskId) -> Vec<EquivClass>;

    /// Equivalence classes of a resource (its rack).
    fn resource_equiv_classes(&self, resource_id: ResourceId) -> Vec<EquivClass>;

    /// Preferred leaves reachable from this class.
    fn outgoing_equiv_class_pref_arcs(&mut self, tec: EquivClass) -> Vec<ResourceId>;

    /// Direct per-task preference arcs (possibly empty).
    fn task_preference_arcs(&mut self, task_id: TaskId) -> Vec<ResourceId>;

    /// (incoming, outgoing) aggregator arcs for a class. For the cluster
    /// aggregator, outgoing lists every known rack.
    fn equiv_class_to_equiv_classes_arcs(
        &self,
        tec: EquivClass,
    ) -> (Vec<EquivClass>, Vec<EquivClass>);

    // Lifecycle notifications used to maintain internal indices.
    fn add_machine(&mut self, resource_id: ResourceId);
    fn remove_machine(&mut self, resource_id: ResourceId);
    fn add_task(&mut self, task_id: TaskId);
    fn remove_task(&mut self, task_id: TaskId);

    /// Name of the cost model.
    fn name(&self) -> &str;
}

pub use quincy::QuincyCostModel;
pub use trivial::TrivialCostModel;
