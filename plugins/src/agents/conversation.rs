use async_trait::async_trait;
use conductor_core::agent::{Agent, AgentError, Parameters};
use conductor_core::task::TaskContext;
use serde_json::{json, Value};

use super::required_str;

const DEFAULT_TITLE: &str = "Sir";

/// Canned conversational replies for when no language model is attached.
///
/// Actions: `respond` (parameter `text`) and `greet` (optional `user`).
/// The caller's `emotion` hint from the task context is echoed back so a
/// speech layer can pick a tone.
pub struct ConversationAgent {
    name: String,
    title: String,
}

impl ConversationAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: DEFAULT_TITLE.to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    fn reply_to(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        if lowered.contains("hello") {
            format!("Greetings, {}.", self.title)
        } else if lowered.contains("status") {
            "All systems operational.".to_string()
        } else {
            "I heard you, but I have no answer for that yet.".to_string()
        }
    }
}

#[async_trait]
impl Agent for ConversationAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        action: &str,
        parameters: &Parameters,
        context: &TaskContext,
    ) -> Result<Value, AgentError> {
        let reply = match action {
            "respond" => {
                let text = required_str(parameters, "text")?.trim();
                if text.is_empty() {
                    return Err(AgentError::InvalidInput("nothing to respond to".into()));
                }
                self.reply_to(text)
            }
            "greet" => {
                let user = parameters
                    .get("user")
                    .and_then(Value::as_str)
                    .unwrap_or(self.title.as_str());
                format!("Welcome back, {user}.")
            }
            other => {
                return Err(AgentError::InvalidInput(format!(
                    "unknown conversation action '{other}'"
                )))
            }
        };
        let emotion = context
            .get("emotion")
            .and_then(Value::as_str)
            .unwrap_or("neutral");
        Ok(json!({ "text": reply, "emotion": emotion }))
    }
}
