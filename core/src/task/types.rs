use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::Parameters;

use super::context::TaskContext;
use super::outcome::{StepOutcome, TaskResult};

/// Opaque task identifier, assigned once at creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lower value is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Emergency and security work.
    pub const EMERGENCY: Self = Self(0);
    pub const USER: Self = Self(1);
    pub const MAINTENANCE: Self = Self(2);
    pub const BACKGROUND: Self = Self(3);
}

impl Default for Priority {
    fn default() -> Self {
        Self::USER
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// One instruction of a plan, routed to a single agent kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub agent_kind: String,
    pub action: String,

    #[serde(default)]
    pub parameters: Parameters,

    /// A failing critical step ends the task.
    #[serde(default)]
    pub critical: bool,
}

impl Step {
    pub fn new(agent_kind: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            agent_kind: agent_kind.into(),
            action: action.into(),
            parameters: Parameters::new(),
            critical: false,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Caller-supplied description of a task, before it gets an id.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub priority: Priority,
    pub plan: Vec<Step>,
    pub context: TaskContext,
    pub input: Option<String>,
}

impl NewTask {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            ..Default::default()
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.plan.push(step);
        self
    }

    pub fn context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub priority: Priority,
    pub plan: Vec<Step>,
    pub status: TaskStatus,
    pub context: TaskContext,
    pub input: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Outcomes recorded so far, in plan order.
    pub outcomes: Vec<StepOutcome>,
    /// Set only once the task is completed or failed.
    pub result: Option<TaskResult>,
}

impl Task {
    pub fn new(spec: NewTask) -> Self {
        Self {
            id: TaskId::new(),
            priority: spec.priority,
            plan: spec.plan,
            status: TaskStatus::Pending,
            context: spec.context,
            input: spec.input,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            outcomes: Vec::new(),
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fraction of the plan that has produced an outcome.
    pub fn progress(&self) -> f32 {
        if self.plan.is_empty() {
            return 1.0;
        }
        self.outcomes.len() as f32 / self.plan.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::EMERGENCY < Priority::USER);
        assert!(Priority::MAINTENANCE < Priority::BACKGROUND);
        assert_eq!(Priority::default(), Priority::USER);
    }

    #[test]
    fn test_new_task_starts_pending() {
        let task = Task::new(
            NewTask::new(Priority::BACKGROUND)
                .step(Step::new("speech", "say").with_param("text", "hi"))
                .step(Step::new("device", "lock").critical()),
        );
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
        assert!(task.result.is_none());
        assert_eq!(task.plan[0].parameters["text"], "hi");
        assert!(task.plan[1].critical);
        assert_eq!(task.progress(), 0.0);
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn test_step_deserializes_with_defaults() {
        let step: Step =
            serde_json::from_str(r#"{"agent_kind":"vision","action":"scan"}"#).unwrap();
        assert!(!step.critical);
        assert!(step.parameters.is_empty());
    }
}
