//! 任务存储
//!
//! The single owner of task lifetime. Every mutation (queue order, status,
//! outcomes, metrics) happens under one lock, so readers always observe a
//! task either fully before or fully after an update.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{CoordinatorError, FailureReason};

use super::context::TaskContext;
use super::outcome::{Classification, StepOutcome, TaskResult};
use super::queue::PendingQueue;
use super::transitions::StateTransition;
use super::types::{Task, TaskId, TaskStatus};

/// Running totals since the store was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerformanceMetrics {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub partial: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub evicted: u64,
    /// Finished tasks that reached an agent; only these feed the average.
    pub measured: u64,
    pub total_task_ms: u64,
}

impl PerformanceMetrics {
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }

    pub fn average_task_ms(&self) -> Option<u64> {
        (self.measured > 0).then(|| self.total_task_ms / self.measured)
    }
}

/// What the caller learns when a task is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Queued tasks that will be dispatched before this one.
    pub ahead: usize,
    pub average_task_ms: Option<u64>,
}

/// Outcome of a cancellation attempt against the store.
#[derive(Debug)]
pub enum CancelOutcome {
    /// The task was still queued and is now failed.
    Dequeued(Task),
    /// The task is running; the executor must be told to stop.
    Executing,
    AlreadyTerminal,
}

/// Consistent counts taken under a single read lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCounts {
    pub queued: usize,
    pub executing: usize,
    pub retained: usize,
    pub metrics: PerformanceMetrics,
}

#[derive(Default)]
struct StoreState {
    tasks: HashMap<TaskId, Task>,
    queue: PendingQueue,
    metrics: PerformanceMetrics,
}

#[derive(Default)]
pub struct TaskStore {
    state: RwLock<StoreState>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending task and place it in the priority queue.
    pub async fn enqueue(&self, task: Task) -> Admission {
        let mut state = self.state.write().await;
        let ahead = state.queue.push(task.id.clone(), task.priority);
        state.tasks.insert(task.id.clone(), task);
        state.metrics.submitted += 1;
        Admission {
            ahead,
            average_task_ms: state.metrics.average_task_ms(),
        }
    }

    pub async fn record_rejection(&self) {
        self.state.write().await.metrics.rejected += 1;
    }

    /// Pop the next queued task and mark it executing.
    pub async fn pop_next(&self) -> Option<Task> {
        let mut state = self.state.write().await;
        while let Some(id) = state.queue.pop() {
            let Some(task) = state.tasks.get_mut(&id) else {
                continue;
            };
            if StateTransition::validate(task.status, TaskStatus::Executing).is_err() {
                continue;
            }
            task.status = TaskStatus::Executing;
            task.started_at = Some(Utc::now());
            return Some(task.clone());
        }
        None
    }

    /// Append a step outcome and the context as it stands after that step.
    pub async fn record_step(
        &self,
        id: &TaskId,
        outcome: StepOutcome,
        context: &TaskContext,
    ) -> Result<(), CoordinatorError> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::TaskNotFound(id.clone()))?;
        task.outcomes.push(outcome);
        task.context = context.clone();
        Ok(())
    }

    /// Move a task into its terminal state. Fails if it is already terminal,
    /// so completion is recorded at most once per task.
    pub async fn finish(&self, id: &TaskId, result: TaskResult) -> Result<Task, CoordinatorError> {
        let mut state = self.state.write().await;
        let StoreState { tasks, metrics, .. } = &mut *state;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::TaskNotFound(id.clone()))?;

        let status = result.terminal_status();
        StateTransition::validate(task.status, status)?;

        match status {
            TaskStatus::Completed => metrics.completed += 1,
            _ => metrics.failed += 1,
        }
        if result.classification == Classification::Partial {
            metrics.partial += 1;
        }
        if result.error == Some(FailureReason::Cancelled) {
            metrics.cancelled += 1;
        }
        if task.started_at.is_some() {
            metrics.measured += 1;
            metrics.total_task_ms += result.elapsed_ms;
        }

        task.status = status;
        task.completed_at = Some(Utc::now());
        task.outcomes = result.outcomes.clone();
        task.result = Some(result);
        Ok(task.clone())
    }

    pub async fn cancel(&self, id: &TaskId) -> Result<CancelOutcome, CoordinatorError> {
        let current = {
            let state = self.state.read().await;
            state
                .tasks
                .get(id)
                .map(|t| t.status)
                .ok_or_else(|| CoordinatorError::TaskNotFound(id.clone()))?
        };

        match current {
            TaskStatus::Executing => Ok(CancelOutcome::Executing),
            TaskStatus::Completed | TaskStatus::Failed => Ok(CancelOutcome::AlreadyTerminal),
            TaskStatus::Pending => {
                // Re-checked under the write lock: the dispatcher may have
                // popped the task in between.
                {
                    let mut state = self.state.write().await;
                    if !state.queue.remove(id) {
                        return Ok(match state.tasks.get(id).map(|t| t.status) {
                            Some(TaskStatus::Executing) => CancelOutcome::Executing,
                            _ => CancelOutcome::AlreadyTerminal,
                        });
                    }
                }
                let task = self
                    .finish(id, TaskResult::aborted(FailureReason::Cancelled))
                    .await?;
                Ok(CancelOutcome::Dequeued(task))
            }
        }
    }

    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.state.read().await.tasks.get(id).cloned()
    }

    /// Remove terminal tasks whose completion is older than `window`.
    /// Pending and executing tasks are never touched.
    pub async fn evict_expired(&self, now: DateTime<Utc>, window: chrono::Duration) -> Vec<TaskId> {
        let mut state = self.state.write().await;

        let expired: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|t| t.is_terminal())
            .filter(|t| t.completed_at.is_some_and(|at| now - at > window))
            .map(|t| t.id.clone())
            .collect();

        for id in &expired {
            state.tasks.remove(id);
        }
        state.metrics.evicted += expired.len() as u64;
        expired
    }

    pub async fn counts(&self) -> StoreCounts {
        let state = self.state.read().await;
        let mut counts = StoreCounts {
            queued: 0,
            executing: 0,
            retained: 0,
            metrics: state.metrics.clone(),
        };
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.queued += 1,
                TaskStatus::Executing => counts.executing += 1,
                TaskStatus::Completed | TaskStatus::Failed => counts.retained += 1,
            }
        }
        counts
    }

}
