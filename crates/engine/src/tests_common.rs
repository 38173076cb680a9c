use std::sync::Arc;

use uuid::Uuid;

use flowgrid_core::config::EngineConfig;
use flowgrid_core::knowledge::{KnowledgeBase, SharedKnowledgeBase};
use flowgrid_core::store::InMemoryObjectStore;
use flowgrid_core::types::{
    shared_resource_map, shared_task_map, DataObjectId, JobDescriptor, ResourceDescriptor,
    ResourceId, ResourceKind, ResourceState, SharedResourceMap, SharedTaskMap, TaskId, TaskState,
};

use crate::scheduler::EventDrivenScheduler;

pub struct TestEnv {
    pub scheduler: EventDrivenScheduler,
    pub task_map: SharedTaskMap,
    pub resource_map: SharedResourceMap,
    pub store: Arc<InMemoryObjectStore>,
    pub knowledge: SharedKnowledgeBase,
}

pub fn make_env() -> TestEnv {
    let task_map = shared_task_map();
    let resource_map = shared_resource_map();
    let store = Arc::new(InMemoryObjectStore::new());
    let knowledge = KnowledgeBase::shared();
    let scheduler = EventDrivenScheduler::new(
        task_map.clone(),
        resource_map.clone(),
        store.clone(),
        knowledge.clone(),
        EngineConfig {
            simulated_runtime_ms: 5,
            ..EngineConfig::default()
        },
    );
    TestEnv {
        scheduler,
        task_map,
        resource_map,
        store,
        knowledge,
    }
}

pub fn make_machine() -> ResourceDescriptor {
    ResourceDescriptor::new(Uuid::new_v4(), ResourceKind::Machine)
}

pub fn make_job(root: TaskId, outputs: &[DataObjectId]) -> JobDescriptor {
    JobDescriptor {
        uid: Uuid::new_v4(),
        name: "test-job".into(),
        root_task: root,
        output_ids: outputs.to_vec(),
    }
}

pub fn task_state(task_map: &SharedTaskMap, id: TaskId) -> TaskState {
    task_map.read().unwrap().get(&id).unwrap().state
}

pub fn resource_state(resource_map: &SharedResourceMap, id: ResourceId) -> ResourceState {
    resource_map.read().unwrap().get(&id).unwrap().state
}
