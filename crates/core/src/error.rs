use thiserror::Error;

use crate::types::{ResourceId, TaskId};

#[derive(Error, Debug)]
pub enum FlowgridError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),

    #[error("resource {resource_id} is not idle ({state})")]
    ResourceNotIdle { resource_id: ResourceId, state: String },

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("task {0} is not in the runnable set")]
    TaskNotRunnable(TaskId),

    #[error("task {0} is already bound to a resource")]
    AlreadyBound(TaskId),

    #[error("no resource binding for task {0}")]
    NotBound(TaskId),

    #[error("executor already registered for resource {0}")]
    DuplicateExecutor(ResourceId),

    #[error("no executor for resource {0}")]
    ExecutorMissing(ResourceId),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("configuration error: {0}")]
    Config(String),
}
