//! 协调器事件
//!
//! Lifecycle notifications broadcast to external listeners (UI, CLI progress
//! display, orchestration layers). Slow subscribers lag rather than block
//! the coordinator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::FailureReason;
use crate::security::ConfirmationRequest;
use crate::task::{Priority, TaskId, TaskResult, TaskStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    TaskQueued {
        task_id: TaskId,
        priority: Priority,
        ahead: usize,
        timestamp: DateTime<Utc>,
    },
    TaskStarted {
        task_id: TaskId,
        timestamp: DateTime<Utc>,
    },
    TaskProgress {
        task_id: TaskId,
        completed_steps: usize,
        total_steps: usize,
        progress: f32,
        timestamp: DateTime<Utc>,
    },
    ConfirmationRequested {
        request: ConfirmationRequest,
        timestamp: DateTime<Utc>,
    },
    ConfirmationResolved {
        request: ConfirmationRequest,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        result: TaskResult,
        timestamp: DateTime<Utc>,
    },
    TaskFailed {
        task_id: TaskId,
        reason: FailureReason,
        result: TaskResult,
        timestamp: DateTime<Utc>,
    },
    TasksEvicted {
        task_ids: Vec<TaskId>,
        timestamp: DateTime<Utc>,
    },
}

impl CoordinatorEvent {
    /// The task this event concerns, if it concerns exactly one.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::TaskQueued { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskProgress { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. } => Some(task_id),
            Self::ConfirmationRequested { request, .. }
            | Self::ConfirmationResolved { request, .. } => Some(&request.task_id),
            Self::TasksEvicted { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TaskCompleted { .. } | Self::TaskFailed { .. })
    }

    /// Terminal result carried by completion and failure events.
    pub fn result(&self) -> Option<&TaskResult> {
        match self {
            Self::TaskCompleted { result, .. } | Self::TaskFailed { result, .. } => Some(result),
            _ => None,
        }
    }
}

/// Broadcast fan-out for [`CoordinatorEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoordinatorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }

    pub fn task_queued(&self, task_id: &TaskId, priority: Priority, ahead: usize) {
        self.emit(CoordinatorEvent::TaskQueued {
            task_id: task_id.clone(),
            priority,
            ahead,
            timestamp: Utc::now(),
        });
    }

    pub fn task_started(&self, task_id: &TaskId) {
        self.emit(CoordinatorEvent::TaskStarted {
            task_id: task_id.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn task_progress(&self, task_id: &TaskId, completed_steps: usize, total_steps: usize) {
        let progress = if total_steps == 0 {
            1.0
        } else {
            completed_steps as f32 / total_steps as f32
        };
        self.emit(CoordinatorEvent::TaskProgress {
            task_id: task_id.clone(),
            completed_steps,
            total_steps,
            progress,
            timestamp: Utc::now(),
        });
    }

    pub fn confirmation_requested(&self, request: &ConfirmationRequest) {
        self.emit(CoordinatorEvent::ConfirmationRequested {
            request: request.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn confirmation_resolved(&self, request: ConfirmationRequest) {
        self.emit(CoordinatorEvent::ConfirmationResolved {
            request,
            timestamp: Utc::now(),
        });
    }

    /// Emit the terminal event for a finished task.
    pub fn task_finished(&self, task_id: &TaskId, result: TaskResult) {
        let timestamp = Utc::now();
        let event = match result.terminal_status() {
            TaskStatus::Failed => {
                let reason = result
                    .error
                    .clone()
                    .or_else(|| result.outcomes.iter().find_map(|o| o.error.clone()))
                    .unwrap_or(FailureReason::EmptyPlan);
                CoordinatorEvent::TaskFailed {
                    task_id: task_id.clone(),
                    reason,
                    result,
                    timestamp,
                }
            }
            _ => CoordinatorEvent::TaskCompleted {
                task_id: task_id.clone(),
                result,
                timestamp,
            },
        };
        self.emit(event);
    }

    pub fn tasks_evicted(&self, task_ids: Vec<TaskId>) {
        self.emit(CoordinatorEvent::TasksEvicted {
            task_ids,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Classification, Step, StepOutcome};
    use serde_json::json;

    fn result(classification: Classification, error: Option<FailureReason>) -> TaskResult {
        let step = Step::new("speech", "say");
        let outcome = match classification {
            Classification::Failure => {
                StepOutcome::failed(0, &step, FailureReason::AgentFailed("mic".into()), 3)
            }
            _ => StepOutcome::succeeded(0, &step, json!("hi"), 3),
        };
        TaskResult {
            classification,
            outcomes: vec![outcome],
            response: json!("hi"),
            error,
            elapsed_ms: 3,
        }
    }

    #[tokio::test]
    async fn test_terminal_event_kind_follows_result() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let id = TaskId::new();

        bus.task_finished(&id, result(Classification::Success, None));
        bus.task_finished(&id, result(Classification::Failure, None));
        bus.task_finished(
            &id,
            result(Classification::Partial, Some(FailureReason::TaskTimeout { timeout_ms: 5 })),
        );

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, CoordinatorEvent::TaskCompleted { .. }));
        assert!(first.is_terminal());

        match rx.recv().await.unwrap() {
            CoordinatorEvent::TaskFailed { reason, .. } => {
                assert_eq!(reason, FailureReason::AgentFailed("mic".into()))
            }
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().await.unwrap() {
            CoordinatorEvent::TaskFailed { reason, .. } => {
                assert_eq!(reason, FailureReason::TaskTimeout { timeout_ms: 5 })
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let id = TaskId::from("t-1");
        let event = CoordinatorEvent::TaskStarted {
            task_id: id.clone(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "task_started");
        assert_eq!(value["task_id"], "t-1");
        assert_eq!(event.task_id(), Some(&id));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(1);
        bus.task_progress(&TaskId::new(), 1, 2);
    }
}
