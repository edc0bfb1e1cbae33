use std::time::Duration;

use async_trait::async_trait;
use conductor_core::agent::{Agent, AgentError, Parameters};
use conductor_core::task::TaskContext;
use serde_json::{json, Value};

/// Sleeps before answering. The `delay_ms` parameter overrides the
/// configured default per step.
pub struct DelayAgent {
    name: String,
    default_delay: Duration,
}

impl DelayAgent {
    pub fn new(name: impl Into<String>, default_delay: Duration) -> Self {
        Self {
            name: name.into(),
            default_delay,
        }
    }
}

#[async_trait]
impl Agent for DelayAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        action: &str,
        parameters: &Parameters,
        _context: &TaskContext,
    ) -> Result<Value, AgentError> {
        let delay = match parameters.get("delay_ms") {
            None => self.default_delay,
            Some(v) => v.as_u64().map(Duration::from_millis).ok_or_else(|| {
                AgentError::InvalidInput("'delay_ms' must be a non-negative integer".into())
            })?,
        };
        tokio::time::sleep(delay).await;
        Ok(json!({
            "agent": self.name,
            "action": action,
            "waited_ms": delay.as_millis() as u64,
        }))
    }
}
