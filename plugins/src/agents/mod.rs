//! Built-in agents. Each is deterministic so a coordinator can be exercised
//! end to end without real devices or models behind it.

mod conversation;
mod delay;
mod device;
mod echo;

pub use conversation::ConversationAgent;
pub use delay::DelayAgent;
pub use device::DeviceAgent;
pub use echo::EchoAgent;

use conductor_core::agent::{AgentError, Parameters};

pub(crate) fn required_str<'a>(parameters: &'a Parameters, key: &str) -> Result<&'a str, AgentError> {
    parameters
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::InvalidInput(format!("missing string parameter '{key}'")))
}
