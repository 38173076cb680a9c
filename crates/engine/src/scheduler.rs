use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use flowgrid_core::config::EngineConfig;
use flowgrid_core::error::FlowgridError;
use flowgrid_core::knowledge::SharedKnowledgeBase;
use flowgrid_core::store::ObjectStore;
use flowgrid_core::types::{
    DataObjectId, JobDescriptor, ResourceDescriptor, ResourceId, ResourceState, SharedResourceMap,
    SharedTaskMap, TaskDescriptor, TaskId, TaskState,
};

use crate::event::{event_channel, CompletionStatus, EngineEvent, EventReceiver, EventSender};
use crate::executor::{Executor, LocalExecutor, MessagingAdapter, RemoteExecutor};

/// Event-driven scheduler core: computes the runnable set by lazy graph
/// reduction, manages task-to-resource bindings, and hands work to
/// executors. All mutations of the task map, resource map, runnable set,
/// and bindings happen on the caller's timeline; executors report back
/// through the event channel, drained between rounds.
pub struct EventDrivenScheduler {
    task_map: SharedTaskMap,
    resource_map: SharedResourceMap,
    object_store: Arc<dyn ObjectStore>,
    knowledge: SharedKnowledgeBase,
    config: EngineConfig,
    runnable: HashSet<TaskId>,
    bindings: HashMap<TaskId, ResourceId>,
    executors: HashMap<ResourceId, Box<dyn Executor>>,
    messaging_adapter: Option<Arc<dyn MessagingAdapter>>,
    event_tx: EventSender,
    event_rx: EventReceiver,
}

impl EventDrivenScheduler {
    pub fn new(
        task_map: SharedTaskMap,
        resource_map: SharedResourceMap,
        object_store: Arc<dyn ObjectStore>,
        knowledge: SharedKnowledgeBase,
        config: EngineConfig,
    ) -> Self {
        let (event_tx, event_rx) = event_channel();
        Self {
            task_map,
            resource_map,
            object_store,
            knowledge,
            config,
            runnable: HashSet::new(),
            bindings: HashMap::new(),
            executors: HashMap::new(),
            messaging_adapter: None,
            event_tx,
            event_rx,
        }
    }

    /// Transport for remote executors; required before registering a
    /// non-local resource.
    pub fn set_messaging_adapter(&mut self, adapter: Arc<dyn MessagingAdapter>) {
        self.messaging_adapter = Some(adapter);
    }

    /// Sender half of the engine's event channel, for executors created
    /// out-of-band (e.g. a peer coordinator's completion relay).
    pub fn event_sender(&self) -> EventSender {
        self.event_tx.clone()
    }

    pub fn runnable_tasks(&self) -> &HashSet<TaskId> {
        &self.runnable
    }

    pub fn bound_resource_for_task(&self, task_id: TaskId) -> Option<ResourceId> {
        self.bindings.get(&task_id).copied()
    }

    // --- Resource lifecycle ---

    /// Register a resource and construct its executor. Exactly one executor
    /// exists per registration; duplicates are rejected.
    pub fn register_resource(
        &mut self,
        descriptor: ResourceDescriptor,
        local: bool,
    ) -> Result<(), FlowgridError> {
        let resource_id = descriptor.uuid;
        if self.executors.contains_key(&resource_id) {
            return Err(FlowgridError::DuplicateExecutor(resource_id));
        }

        let executor: Box<dyn Executor> = if local {
            debug!("Adding executor for local resource {}", resource_id);
            Box::new(LocalExecutor::new(
                resource_id,
                self.event_tx.clone(),
                self.config.clone(),
            ))
        } else {
            debug!("Adding executor for remote resource {}", resource_id);
            let adapter = self.messaging_adapter.clone().ok_or_else(|| {
                FlowgridError::Config(format!(
                    "no messaging adapter for remote resource {resource_id}"
                ))
            })?;
            Box::new(RemoteExecutor::new(
                resource_id,
                adapter,
                self.event_tx.clone(),
            ))
        };

        self.resource_map
            .write()
            .unwrap()
            .insert(resource_id, descriptor);
        self.executors.insert(resource_id, executor);
        info!("Registered {} resource {}", if local { "local" } else { "remote" }, resource_id);
        Ok(())
    }

    /// Deregister a resource: terminate anything still bound to it, drive
    /// the completion handlers, then drop the executor and the descriptor.
    pub fn deregister_resource(&mut self, resource_id: ResourceId) -> Result<(), FlowgridError> {
        if !self.executors.contains_key(&resource_id) {
            return Err(FlowgridError::ExecutorMissing(resource_id));
        }

        let bound: Vec<TaskId> = self
            .bindings
            .iter()
            .filter(|(_, r)| **r == resource_id)
            .map(|(t, _)| *t)
            .collect();
        for task_id in bound {
            warn!(
                "Resource {} deregistering with task {} still bound; terminating",
                resource_id, task_id
            );
            if let Some(executor) = self.executors.get_mut(&resource_id) {
                executor.terminate_task(task_id);
            }
            let _ = self.handle_task_failure(task_id);
        }

        self.executors.remove(&resource_id);
        self.resource_map.write().unwrap().remove(&resource_id);
        info!("Deregistered resource {}", resource_id);
        Ok(())
    }

    // --- Job intake & lazy graph reduction ---

    /// Make a job's tasks known to the scheduler. References for their
    /// outputs are expected to be registered with the object store by the
    /// submitter.
    pub fn submit_job(&mut self, job: &JobDescriptor, tasks: Vec<TaskDescriptor>) {
        let mut task_map = self.task_map.write().unwrap();
        for task in tasks {
            debug!("Job {}: task {} ({}) submitted", job.uid, task.uid, task.binary);
            task_map.insert(task.uid, task);
        }
    }

    /// Runnable set for a job: demand-driven reduction from its desired
    /// outputs plus its root task.
    pub fn runnable_tasks_for_job(&mut self, job: &JobDescriptor) -> &HashSet<TaskId> {
        let outputs = job.output_ids.clone();
        self.lazy_graph_reduction(&outputs, job.root_task)
    }

    /// Demand-driven traversal from the desired outputs toward producers,
    /// marking the minimal set of tasks needed to satisfy those outputs as
    /// runnable. Idempotent: with no external changes a re-run yields the
    /// same runnable set and no state change.
    pub fn lazy_graph_reduction(
        &mut self,
        output_ids: &[DataObjectId],
        root_task: TaskId,
    ) -> &HashSet<TaskId> {
        debug!("Performing lazy graph reduction over {} outputs", output_ids.len());
        let store = Arc::clone(&self.object_store);
        let mut queue: VecDeque<TaskId> = VecDeque::new();
        // Per-round dedup; task states alone cannot tell "already queued
        // this round" from "left blocking by an earlier round".
        let mut enqueued: HashSet<TaskId> = HashSet::new();
        let mut tasks = self.task_map.write().unwrap();

        for &output_id in output_ids {
            let reference = store.get_reference(output_id);
            if reference.as_ref().is_some_and(|r| r.consumable()) {
                continue;
            }
            let Some(producer) = reference.and_then(|r| r.producing_task) else {
                error!(
                    "No producing task for output {}; the job blocks until it is produced",
                    output_id
                );
                continue;
            };
            match tasks.get_mut(&producer) {
                Some(td) if producer_reducible(td.state) => {
                    td.state = TaskState::Blocking;
                    if enqueued.insert(producer) {
                        queue.push_back(producer);
                    }
                }
                Some(_) => {}
                None => error!(
                    "Producing task {} for output {} is not in the task map",
                    producer, output_id
                ),
            }
        }

        // A completed root is not re-entered: re-materialization is only
        // demanded through a non-consumable reference, never for its own sake.
        match tasks.get(&root_task).map(|t| t.state) {
            Some(state) if matches!(state, TaskState::Created | TaskState::Blocking) => {
                if enqueued.insert(root_task) {
                    queue.push_back(root_task);
                }
            }
            Some(_) => {}
            None => error!("Root task {} is not in the task map", root_task),
        }

        while let Some(task_id) = queue.pop_front() {
            let dependencies = tasks
                .get(&task_id)
                .map(|t| t.dependencies.clone())
                .unwrap_or_default();
            let mut will_block = false;

            for dep in dependencies {
                let reference = store.get_reference(dep);
                if reference.as_ref().is_some_and(|r| r.consumable()) {
                    continue;
                }
                will_block = true;
                let Some(producer) = reference.and_then(|r| r.producing_task) else {
                    error!(
                        "No producer for reference {}; task {} blocks until it appears",
                        dep, task_id
                    );
                    continue;
                };
                match tasks.get_mut(&producer) {
                    // Completed-but-not-consumable means the producer's
                    // output must be re-materialized.
                    Some(p) if producer_reducible(p.state) => {
                        p.state = TaskState::Blocking;
                        if enqueued.insert(producer) {
                            queue.push_back(producer);
                        }
                    }
                    Some(_) => {}
                    None => error!(
                        "Producer {} of reference {} is not in the task map",
                        producer, dep
                    ),
                }
            }

            if let Some(td) = tasks.get_mut(&task_id) {
                if will_block {
                    debug!("Task {} is blocking on unfulfilled dependencies", task_id);
                    td.state = TaskState::Blocking;
                } else {
                    debug!("Adding task {} to the runnable set", task_id);
                    td.state = TaskState::Runnable;
                    self.runnable.insert(task_id);
                }
            }
        }

        drop(tasks);
        debug!("Runnable set now contains {} tasks", self.runnable.len());
        &self.runnable
    }

    // --- Binding & dispatch ---

    /// Bind a runnable task to an idle resource and kick off its executor.
    /// The executor call is asynchronous; this returns once the task is
    /// scheduled for launch.
    pub fn bind_task_to_resource(
        &mut self,
        task_id: TaskId,
        resource_id: ResourceId,
    ) -> Result<(), FlowgridError> {
        let task_snapshot = {
            let mut resources = self.resource_map.write().unwrap();
            let resource = resources
                .get_mut(&resource_id)
                .ok_or(FlowgridError::UnknownResource(resource_id))?;
            if resource.state != ResourceState::Idle {
                return Err(FlowgridError::ResourceNotIdle {
                    resource_id,
                    state: resource.state.to_string(),
                });
            }

            let mut tasks = self.task_map.write().unwrap();
            let task = tasks
                .get_mut(&task_id)
                .ok_or(FlowgridError::UnknownTask(task_id))?;
            if task.state != TaskState::Runnable || !self.runnable.contains(&task_id) {
                return Err(FlowgridError::TaskNotRunnable(task_id));
            }
            if self.bindings.contains_key(&task_id) {
                return Err(FlowgridError::AlreadyBound(task_id));
            }
            if !self.executors.contains_key(&resource_id) {
                return Err(FlowgridError::ExecutorMissing(resource_id));
            }

            // All preconditions hold; apply the transition atomically.
            resource.state = ResourceState::Busy;
            task.state = TaskState::Running;
            task.clone()
        };

        self.bindings.insert(task_id, resource_id);
        self.runnable.remove(&task_id);

        info!("Binding task {} to resource {}", task_id, resource_id);
        let executor = self
            .executors
            .get_mut(&resource_id)
            .expect("executor checked above");
        executor.run_task(&task_snapshot, true);
        Ok(())
    }

    /// Apply a solver round's assignments. Pairs whose preconditions no
    /// longer hold are skipped with a warning; returns the number bound.
    pub fn apply_assignments(&mut self, assignments: &[(TaskId, ResourceId)]) -> usize {
        let mut bound = 0;
        for &(task_id, resource_id) in assignments {
            match self.bind_task_to_resource(task_id, resource_id) {
                Ok(()) => bound += 1,
                Err(e) => warn!(
                    "Skipping assignment of task {} to {}: {}",
                    task_id, resource_id, e
                ),
            }
        }
        bound
    }

    /// Release the resource a finished task was bound to. The task's own
    /// state is updated by the executor's completion signal before this
    /// runs; this is strictly about resource release.
    pub fn handle_task_completion(&mut self, task_id: TaskId) -> Result<(), FlowgridError> {
        let resource_id = self
            .bindings
            .remove(&task_id)
            .ok_or(FlowgridError::NotBound(task_id))?;

        match self.resource_map.write().unwrap().get_mut(&resource_id) {
            Some(resource) => resource.state = ResourceState::Idle,
            None => warn!(
                "Task {} was bound to resource {}, which no longer exists",
                task_id, resource_id
            ),
        }
        info!("Task {} finished; resource {} freed", task_id, resource_id);
        // TODO: job-level accounting: mark the owning job completed once
        // its last outstanding task finishes.
        Ok(())
    }

    /// Failure path: mark the task failed, then release its resource. A
    /// later reduction round may re-enter the task into the runnable set.
    pub fn handle_task_failure(&mut self, task_id: TaskId) -> Result<(), FlowgridError> {
        if let Some(task) = self.task_map.write().unwrap().get_mut(&task_id) {
            task.state = TaskState::Failed;
        }
        self.handle_task_completion(task_id)
    }

    /// Host a task on behalf of a peer coordinator. Boundary function:
    /// precondition failures return false with a warning instead of an
    /// error, since the caller is outside this process.
    pub fn place_delegated_task(
        &mut self,
        mut task: TaskDescriptor,
        target_resource: ResourceId,
    ) -> bool {
        {
            let resources = self.resource_map.read().unwrap();
            match resources.get(&target_resource) {
                None => {
                    warn!(
                        "Attempted to place delegated task {} on resource {}, which is unknown",
                        task.uid, target_resource
                    );
                    return false;
                }
                Some(rd) if rd.state != ResourceState::Idle => {
                    warn!(
                        "Attempted to place delegated task {} on resource {}, which is not idle",
                        task.uid, target_resource
                    );
                    return false;
                }
                Some(_) => {}
            }
        }

        let task_id = task.uid;
        task.state = TaskState::Runnable;
        self.task_map.write().unwrap().insert(task_id, task);
        self.runnable.insert(task_id);

        if let Err(e) = self.bind_task_to_resource(task_id, target_resource) {
            warn!("Failed to bind delegated task {}: {}", task_id, e);
            self.runnable.remove(&task_id);
            self.task_map.write().unwrap().remove(&task_id);
            return false;
        }

        // The delegator owns the task's lifecycle; override RUNNING.
        if let Some(td) = self.task_map.write().unwrap().get_mut(&task_id) {
            td.state = TaskState::Delegated;
        }
        true
    }

    // --- Event drain ---

    /// Drain and handle all pending executor events. Handlers run
    /// serialized on the caller's thread; call between scheduling rounds.
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.process_event(event);
            handled += 1;
        }
        handled
    }

    fn process_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::TaskCompleted {
                task_id,
                status,
                runtime_ms,
            } => {
                if !self.bindings.contains_key(&task_id) {
                    debug!(
                        "Completion of task {} ({}) with no binding; already released",
                        task_id, status
                    );
                    return;
                }
                if status == CompletionStatus::Completed {
                    let tec = {
                        let mut tasks = self.task_map.write().unwrap();
                        match tasks.get_mut(&task_id) {
                            Some(task) => {
                                task.state = TaskState::Completed;
                                for &output in &task.outputs {
                                    self.object_store.mark_concrete(output);
                                }
                                Some(task.level0_equiv_class())
                            }
                            None => {
                                warn!("Completion for task {} missing from task map", task_id);
                                None
                            }
                        }
                    };
                    if let Some(tec) = tec {
                        self.knowledge
                            .write()
                            .unwrap()
                            .add_runtime_sample(tec, runtime_ms);
                    }
                    let _ = self.handle_task_completion(task_id);
                } else {
                    let _ = self.handle_task_failure(task_id);
                }
            }
            EngineEvent::ResourceLost { resource_id } => {
                warn!("Resource {} lost", resource_id);
                let bound: Vec<TaskId> = self
                    .bindings
                    .iter()
                    .filter(|(_, r)| **r == resource_id)
                    .map(|(t, _)| *t)
                    .collect();
                for task_id in bound {
                    if let Some(task) = self.task_map.write().unwrap().get_mut(&task_id) {
                        task.state = TaskState::Failed;
                    }
                    self.bindings.remove(&task_id);
                }
                if let Some(resource) =
                    self.resource_map.write().unwrap().get_mut(&resource_id)
                {
                    resource.state = ResourceState::Lost;
                }
            }
        }
    }
}

/// Whether a producer may (re-)enter the reduction queue. `Blocking` covers
/// tasks left over from an earlier round whose inputs have since appeared;
/// `Completed` covers producers whose output needs re-materialization.
fn producer_reducible(state: TaskState) -> bool {
    matches!(
        state,
        TaskState::Created | TaskState::Blocking | TaskState::Completed
    )
}
