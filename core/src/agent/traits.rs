use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::task::TaskContext;

/// Step parameters, opaque to the coordinator.
pub type Parameters = Map<String, Value>;

/// Errors an agent reports back for a single invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("{0}")]
    Failed(String),

    /// The agent refused on authorization grounds; treated as a security
    /// failure by the coordinator.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// A capability provider invoked by kind, action and parameters.
///
/// Implementations must tolerate up to `max_concurrent_steps` concurrent
/// calls. When the coordinator stops waiting (timeout, cancellation) the
/// returned future is dropped; any side effects already started are the
/// agent's to clean up.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        action: &str,
        parameters: &Parameters,
        context: &TaskContext,
    ) -> Result<Value, AgentError>;
}
