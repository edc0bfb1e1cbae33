use async_trait::async_trait;
use conductor_core::agent::{Agent, AgentError, Parameters};
use conductor_core::task::TaskContext;
use serde_json::{json, Value};

/// Returns its action and parameters unchanged.
pub struct EchoAgent {
    name: String,
}

impl EchoAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        action: &str,
        parameters: &Parameters,
        _context: &TaskContext,
    ) -> Result<Value, AgentError> {
        Ok(json!({
            "agent": self.name,
            "action": action,
            "parameters": parameters,
        }))
    }
}
