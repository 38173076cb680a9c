use tokio::sync::mpsc;

use flowgrid_core::types::{ResourceId, TaskId};

/// Terminal status an executor reports for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed,
    Failed,
    /// Terminated on request (cancellation or resource teardown).
    Aborted,
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionStatus::Completed => write!(f, "completed"),
            CompletionStatus::Failed => write!(f, "failed"),
            CompletionStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Events fed back into the scheduler timeline. Executors run on their own
/// tasks/threads; everything they observe arrives here and is drained in
/// order between scheduling rounds.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TaskCompleted {
        task_id: TaskId,
        status: CompletionStatus,
        runtime_ms: u64,
    },
    ResourceLost {
        resource_id: ResourceId,
    },
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
