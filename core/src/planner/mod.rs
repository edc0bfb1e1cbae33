//! Decomposition of a free-form request into an ordered plan.

use async_trait::async_trait;
use thiserror::Error;

use crate::task::{Priority, Step, TaskContext};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub priority: Priority,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("no planner configured")]
    NotConfigured,
    #[error("planning failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Planner: Send + Sync {
    fn name(&self) -> &str;
    async fn plan(&self, input: &str, context: &TaskContext) -> Result<Plan, PlanError>;
}
