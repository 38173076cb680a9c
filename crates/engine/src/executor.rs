use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use flowgrid_core::config::EngineConfig;
use flowgrid_core::error::FlowgridError;
use flowgrid_core::types::{ResourceId, TaskDescriptor, TaskId};

use crate::event::{CompletionStatus, EngineEvent, EventSender};

/// A task launcher bound to one registered resource. `run_task` is
/// asynchronous: it returns as soon as the task is scheduled for launch;
/// the outcome arrives later as an `EngineEvent::TaskCompleted`.
pub trait Executor: Send {
    fn run_task(&mut self, task: &TaskDescriptor, managed: bool);

    fn terminate_task(&mut self, task_id: TaskId);
}

/// Runs tasks as child processes under this coordinator.
pub struct LocalExecutor {
    resource_id: ResourceId,
    event_tx: EventSender,
    running: HashMap<TaskId, JoinHandle<()>>,
    config: EngineConfig,
}

impl LocalExecutor {
    pub fn new(resource_id: ResourceId, event_tx: EventSender, config: EngineConfig) -> Self {
        Self {
            resource_id,
            event_tx,
            running: HashMap::new(),
            config,
        }
    }

    pub fn active_count(&self) -> usize {
        self.running.len()
    }
}

impl Executor for LocalExecutor {
    fn run_task(&mut self, task: &TaskDescriptor, managed: bool) {
        self.running.retain(|_, handle| !handle.is_finished());

        let task = task.clone();
        let task_id = task.uid;
        let event_tx = self.event_tx.clone();
        let config = self.config.clone();

        info!(
            "Executor for {}: launching task {} ({}managed)",
            self.resource_id,
            task_id,
            if managed { "" } else { "un" }
        );

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            // Panic-safe: a panicking worker still produces a completion.
            let run = std::panic::AssertUnwindSafe(run_binary(&task, &config));
            let status = match futures::FutureExt::catch_unwind(run).await {
                Ok(status) => status,
                Err(_) => {
                    warn!("Task {} panicked during execution", task_id);
                    CompletionStatus::Failed
                }
            };
            let runtime_ms = started.elapsed().as_millis() as u64;
            let _ = event_tx.send(EngineEvent::TaskCompleted {
                task_id,
                status,
                runtime_ms,
            });
        });
        self.running.insert(task_id, handle);
    }

    fn terminate_task(&mut self, task_id: TaskId) {
        if let Some(handle) = self.running.remove(&task_id) {
            info!("Terminating local task {}", task_id);
            handle.abort();
            // The aborted worker cannot report; surface the completion here
            // so the handler path runs as for any other outcome.
            let _ = self.event_tx.send(EngineEvent::TaskCompleted {
                task_id,
                status: CompletionStatus::Aborted,
                runtime_ms: 0,
            });
        }
    }
}

async fn run_binary(task: &TaskDescriptor, config: &EngineConfig) -> CompletionStatus {
    match tokio::process::Command::new(&task.binary).spawn() {
        Ok(mut child) => {
            if config.local_task_timeout_ms > 0 {
                let timeout = Duration::from_millis(config.local_task_timeout_ms);
                match tokio::time::timeout(timeout, child.wait()).await {
                    Ok(Ok(status)) if status.success() => CompletionStatus::Completed,
                    Ok(Ok(status)) => {
                        warn!("Task {} exited with {}", task.uid, status);
                        CompletionStatus::Failed
                    }
                    Ok(Err(e)) => {
                        warn!("Task {} wait failed: {}", task.uid, e);
                        CompletionStatus::Failed
                    }
                    Err(_) => {
                        warn!(
                            "Task {} exceeded {}ms, killing",
                            task.uid, config.local_task_timeout_ms
                        );
                        let _ = child.kill().await;
                        CompletionStatus::Failed
                    }
                }
            } else {
                match child.wait().await {
                    Ok(status) if status.success() => CompletionStatus::Completed,
                    _ => CompletionStatus::Failed,
                }
            }
        }
        Err(e) => {
            if config.simulate_missing_binaries {
                debug!(
                    "Binary '{}' for task {} not spawnable ({}); simulating",
                    task.binary, task.uid, e
                );
                tokio::time::sleep(Duration::from_millis(config.simulated_runtime_ms)).await;
                CompletionStatus::Completed
            } else {
                warn!("Failed to spawn '{}' for task {}: {}", task.binary, task.uid, e);
                CompletionStatus::Failed
            }
        }
    }
}

/// Transport seam for dispatching work to a peer coordinator. RPC timeouts
/// and transport errors surface as task failures.
pub trait MessagingAdapter: Send + Sync {
    fn dispatch_task(
        &self,
        resource_id: ResourceId,
        task: &TaskDescriptor,
        managed: bool,
    ) -> Result<(), FlowgridError>;

    fn terminate_task(&self, resource_id: ResourceId, task_id: TaskId)
        -> Result<(), FlowgridError>;
}

/// Dispatches tasks to a remote resource over the messaging adapter.
pub struct RemoteExecutor {
    resource_id: ResourceId,
    adapter: Arc<dyn MessagingAdapter>,
    event_tx: EventSender,
}

impl RemoteExecutor {
    pub fn new(
        resource_id: ResourceId,
        adapter: Arc<dyn MessagingAdapter>,
        event_tx: EventSender,
    ) -> Self {
        Self {
            resource_id,
            adapter,
            event_tx,
        }
    }
}

impl Executor for RemoteExecutor {
    fn run_task(&mut self, task: &TaskDescriptor, managed: bool) {
        debug!(
            "Dispatching task {} to remote resource {}",
            task.uid, self.resource_id
        );
        if let Err(e) = self.adapter.dispatch_task(self.resource_id, task, managed) {
            warn!(
                "Dispatch of task {} to {} failed: {}",
                task.uid, self.resource_id, e
            );
            let _ = self.event_tx.send(EngineEvent::TaskCompleted {
                task_id: task.uid,
                status: CompletionStatus::Failed,
                runtime_ms: 0,
            });
        }
    }

    fn terminate_task(&mut self, task_id: TaskId) {
        if let Err(e) = self.adapter.terminate_task(self.resource_id, task_id) {
            warn!(
                "Terminate of task {} on {} failed: {}",
                task_id, self.resource_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_channel;
    use flowgrid_core::types::TaskDescriptor;
    use uuid::Uuid;

    fn sim_config() -> EngineConfig {
        EngineConfig {
            simulate_missing_binaries: true,
            simulated_runtime_ms: 5,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn local_executor_reports_completion() {
        let (tx, mut rx) = event_channel();
        let mut exec = LocalExecutor::new(Uuid::new_v4(), tx, sim_config());
        let task = TaskDescriptor::new(1, Uuid::new_v4(), "no-such-binary-anywhere");

        exec.run_task(&task, true);
        let event = rx.recv().await.unwrap();
        match event {
            EngineEvent::TaskCompleted { task_id, status, .. } => {
                assert_eq!(task_id, 1);
                assert_eq!(status, CompletionStatus::Completed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_executor_fails_without_simulation() {
        let (tx, mut rx) = event_channel();
        let config = EngineConfig {
            simulate_missing_binaries: false,
            ..EngineConfig::default()
        };
        let mut exec = LocalExecutor::new(Uuid::new_v4(), tx, config);
        let task = TaskDescriptor::new(2, Uuid::new_v4(), "no-such-binary-anywhere");

        exec.run_task(&task, true);
        match rx.recv().await.unwrap() {
            EngineEvent::TaskCompleted { status, .. } => {
                assert_eq!(status, CompletionStatus::Failed)
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminate_surfaces_an_aborted_completion() {
        let (tx, mut rx) = event_channel();
        let config = EngineConfig {
            simulated_runtime_ms: 60_000,
            ..sim_config()
        };
        let mut exec = LocalExecutor::new(Uuid::new_v4(), tx, config);
        let task = TaskDescriptor::new(3, Uuid::new_v4(), "no-such-binary-anywhere");

        exec.run_task(&task, true);
        exec.terminate_task(3);
        match rx.recv().await.unwrap() {
            EngineEvent::TaskCompleted { task_id, status, .. } => {
                assert_eq!(task_id, 3);
                assert_eq!(status, CompletionStatus::Aborted);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(exec.active_count(), 0);
    }

    struct FailingAdapter;

    impl MessagingAdapter for FailingAdapter {
        fn dispatch_task(
            &self,
            _resource_id: ResourceId,
            _task: &TaskDescriptor,
            _managed: bool,
        ) -> Result<(), FlowgridError> {
            Err(FlowgridError::Executor("link down".into()))
        }

        fn terminate_task(
            &self,
            _resource_id: ResourceId,
            _task_id: TaskId,
        ) -> Result<(), FlowgridError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn remote_dispatch_failure_becomes_task_failure() {
        let (tx, mut rx) = event_channel();
        let mut exec = RemoteExecutor::new(Uuid::new_v4(), Arc::new(FailingAdapter), tx);
        let task = TaskDescriptor::new(4, Uuid::new_v4(), "sort");

        exec.run_task(&task, true);
        match rx.recv().await.unwrap() {
            EngineEvent::TaskCompleted { task_id, status, .. } => {
                assert_eq!(task_id, 4);
                assert_eq!(status, CompletionStatus::Failed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
