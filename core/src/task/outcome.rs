use serde::Serialize;
use serde_json::Value;

use crate::error::FailureReason;

use super::types::{Step, TaskStatus};

/// Result of invoking one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub step_index: usize,
    pub agent_kind: String,
    pub action: String,
    pub success: bool,
    pub value: Option<Value>,
    pub error: Option<FailureReason>,
    pub elapsed_ms: u64,
}

impl StepOutcome {
    pub fn succeeded(step_index: usize, step: &Step, value: Value, elapsed_ms: u64) -> Self {
        Self {
            step_index,
            agent_kind: step.agent_kind.clone(),
            action: step.action.clone(),
            success: true,
            value: Some(value),
            error: None,
            elapsed_ms,
        }
    }

    pub fn failed(step_index: usize, step: &Step, reason: FailureReason, elapsed_ms: u64) -> Self {
        Self {
            step_index,
            agent_kind: step.agent_kind.clone(),
            action: step.action.clone(),
            success: false,
            value: None,
            error: Some(reason),
            elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Every step succeeded.
    Success,
    /// At least one step succeeded.
    Partial,
    Failure,
}

/// Aggregate outcome of a finished task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub classification: Classification,
    pub outcomes: Vec<StepOutcome>,
    /// Last successful value, or the first failure's reason as a string.
    pub response: Value,
    /// Terminal reason for failed tasks.
    pub error: Option<FailureReason>,
    pub elapsed_ms: u64,
}

impl TaskResult {
    /// A result that never ran a step, e.g. a task cancelled while queued.
    pub fn aborted(reason: FailureReason) -> Self {
        Self {
            classification: Classification::Failure,
            outcomes: Vec::new(),
            response: Value::String(reason.to_string()),
            error: Some(reason),
            elapsed_ms: 0,
        }
    }

    pub fn terminal_status(&self) -> TaskStatus {
        if self.error.is_some() || self.classification == Classification::Failure {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        }
    }

    pub fn succeeded_steps(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }
}
