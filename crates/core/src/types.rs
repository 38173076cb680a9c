use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tasks are named by a 64-bit id assigned at job submission.
pub type TaskId = u64;
pub type JobId = Uuid;
/// Content name of a data object, as recorded in the object store.
pub type DataObjectId = u64;
pub type ResourceId = Uuid;
/// Equivalence class of tasks or resources in the flow network.
pub type EquivClass = u64;

/// Sentinel class for the single cluster-wide aggregator node.
pub const CLUSTER_AGGREGATOR_ID: EquivClass = u64::MAX;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskState {
    Created,
    Blocking,
    Runnable,
    Running,
    /// Placed on behalf of a peer coordinator; lifecycle owned by the delegator.
    Delegated,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResourceKind {
    Machine,
    Core,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResourceState {
    Idle,
    Busy,
    Lost,
}

/// A task as the scheduler sees it: inputs are object ids resolved through
/// the object store, outputs are the ids this task will materialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub uid: TaskId,
    pub job: JobId,
    /// Binary name; also the source of the task's level-0 equivalence class.
    pub binary: String,
    pub state: TaskState,
    pub dependencies: Vec<DataObjectId>,
    pub outputs: Vec<DataObjectId>,
}

impl TaskDescriptor {
    pub fn new(uid: TaskId, job: JobId, binary: impl Into<String>) -> Self {
        Self {
            uid,
            job,
            binary: binary.into(),
            state: TaskState::Created,
            dependencies: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// The level-0 equivalence class: all tasks running the same binary
    /// hash to the same class.
    pub fn level0_equiv_class(&self) -> EquivClass {
        binary_equiv_class(&self.binary)
    }
}

/// Hash a binary name into a level-0 task equivalence class.
pub fn binary_equiv_class(binary: &str) -> EquivClass {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    binary.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uuid: ResourceId,
    pub kind: ResourceKind,
    pub state: ResourceState,
}

impl ResourceDescriptor {
    pub fn new(uuid: ResourceId, kind: ResourceKind) -> Self {
        Self {
            uuid,
            kind,
            state: ResourceState::Idle,
        }
    }

    /// Whether this resource can directly host tasks.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, ResourceKind::Machine | ResourceKind::Core)
    }
}

/// A job: a root task plus the output objects the submitter wants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub uid: JobId,
    pub name: String,
    pub root_task: TaskId,
    pub output_ids: Vec<DataObjectId>,
}

pub type TaskMap = HashMap<TaskId, TaskDescriptor>;
pub type ResourceMap = HashMap<ResourceId, ResourceDescriptor>;

/// Shared read/mutate by the scheduler; cost models take read guards only.
pub type SharedTaskMap = Arc<RwLock<TaskMap>>;
pub type SharedResourceMap = Arc<RwLock<ResourceMap>>;

pub fn shared_task_map() -> SharedTaskMap {
    Arc::new(RwLock::new(TaskMap::new()))
}

pub fn shared_resource_map() -> SharedResourceMap {
    Arc::new(RwLock::new(ResourceMap::new()))
}

// --- Display implementations ---

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Created => write!(f, "created"),
            TaskState::Blocking => write!(f, "blocking"),
            TaskState::Runnable => write!(f, "runnable"),
            TaskState::Running => write!(f, "running"),
            TaskState::Delegated => write!(f, "delegated"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceState::Idle => write!(f, "idle"),
            ResourceState::Busy => write!(f, "busy"),
            ResourceState::Lost => write!(f, "lost"),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Machine => write!(f, "machine"),
            ResourceKind::Core => write!(f, "core"),
            ResourceKind::Other => write!(f, "other"),
        }
    }
}
